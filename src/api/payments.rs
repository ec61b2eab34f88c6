//! Payment service endpoints.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use super::{health, ApiError};
use crate::domain::{positive_amount, Account};
use crate::storage::AccountLedger;

/// Shared state of the payment router.
#[derive(Clone)]
pub struct PaymentsState {
    ledger: Arc<dyn AccountLedger>,
}

impl PaymentsState {
    pub fn new(ledger: Arc<dyn AccountLedger>) -> Self {
        Self { ledger }
    }
}

pub fn router(state: PaymentsState) -> Router {
    Router::new()
        .route("/api/payments/create_account", post(create_account))
        .route("/api/payments/deposit", post(deposit))
        .route("/api/payments/balance", get(balance))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub user_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub balance: i64,
}

impl From<Account> for BalanceResponse {
    fn from(account: Account) -> Self {
        Self {
            user_id: account.user_id,
            balance: account.balance,
        }
    }
}

/// POST /api/payments/create_account
async fn create_account(
    State(state): State<PaymentsState>,
    body: Result<Json<AccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BalanceResponse>), ApiError> {
    let Json(req) = body?;
    let account = state.ledger.create_account(req.user_id).await?;
    info!(user_id = %account.user_id, "Account created");
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// POST /api/payments/deposit
async fn deposit(
    State(state): State<PaymentsState>,
    body: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let Json(req) = body?;
    let amount = positive_amount(req.amount)?;
    let account = state.ledger.deposit(req.user_id, amount).await?;
    info!(user_id = %account.user_id, amount, balance = account.balance, "Deposit applied");
    Ok(Json(account.into()))
}

/// GET /api/payments/balance?user_id=
async fn balance(
    State(state): State<PaymentsState>,
    query: Result<Query<BalanceQuery>, QueryRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let Query(query) = query?;
    state
        .ledger
        .get_account(query.user_id)
        .await?
        .map(|account| Json(account.into()))
        .ok_or_else(|| ApiError::NotFound(format!("Account not found for {}", query.user_id)))
}
