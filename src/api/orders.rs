//! Order service endpoints.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRef, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use super::{health, ws, ApiError};
use crate::domain::{NewOrder, Order, OrderStatus};
use crate::notify::NotificationHub;
use crate::storage::OrderLedger;

/// Shared state of the order router.
#[derive(Clone)]
pub struct OrdersState {
    ledger: Arc<dyn OrderLedger>,
    hub: NotificationHub,
    topic: Arc<str>,
}

impl OrdersState {
    /// `topic` is where new orders are announced.
    pub fn new(ledger: Arc<dyn OrderLedger>, hub: NotificationHub, topic: &str) -> Self {
        Self {
            ledger,
            hub,
            topic: Arc::from(topic),
        }
    }
}

impl FromRef<OrdersState> for NotificationHub {
    fn from_ref(state: &OrdersState) -> Self {
        state.hub.clone()
    }
}

pub fn router(state: OrdersState) -> Router {
    Router::new()
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/{id}", get(get_order))
        .route("/ws", get(ws::connect))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub amount: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: Uuid,
}

/// POST /api/orders
async fn create_order(
    State(state): State<OrdersState>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let Json(req) = body?;
    let new_order = NewOrder::new(req.user_id, req.amount, req.description)?;

    let order = state.ledger.create_order(new_order, &state.topic).await?;
    info!(
        order_id = %order.id,
        user_id = %order.user_id,
        amount = order.amount,
        "Order created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order_id: order.id,
            status: order.status,
            message: "Order created and awaiting payment".to_string(),
        }),
    ))
}

/// GET /api/orders/{id}
async fn get_order(
    State(state): State<OrdersState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(id) = id?;
    state
        .ledger
        .get_order(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {id}")))
}

/// GET /api/orders?user_id=
async fn list_orders(
    State(state): State<OrdersState>,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.ledger.list_orders(query.user_id).await?))
}
