//! Push channel: `GET /ws?user_id=<uuid>`.
//!
//! The connection registers with the `NotificationHub` and stays open until
//! the client closes it or the hub replaces it with a newer connection of the
//! same user. Inbound frames are read only to notice the disconnect.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::ApiError;
use crate::notify::NotificationHub;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub user_id: String,
}

/// Normalize the `user_id` query value. Ids are matched lowercased.
fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }
    Uuid::parse_str(&normalized)
        .map_err(|_| ApiError::BadRequest(format!("Invalid user_id: {normalized}")))
}

/// GET /ws
pub async fn connect(
    State(hub): State<NotificationHub>,
    Query(params): Query<ConnectParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user_id = match parse_user_id(&params.user_id) {
        Ok(user_id) => user_id,
        Err(e) => return e.into_response(),
    };

    match upgrade {
        Ok(ws) => ws
            .on_upgrade(move |socket| serve(socket, hub, user_id))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn serve(socket: WebSocket, hub: NotificationHub, user_id: Uuid) {
    let (registration, mut outbound) = hub.register(user_id);
    info!(user_id = %user_id, "User connected to push channel");

    let (mut sink, mut stream) = socket.split();

    let writer = async {
        while let Some(text) = outbound.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    };

    let reader = async {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => debug!(user_id = %user_id, "Ignoring client frame"),
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    hub.unregister(&registration);
    info!(user_id = %user_id, "User disconnected from push channel");
}
