//! Service assembly.
//!
//! Each service is one HTTP router plus two background loops: the outbox
//! relay for its own outbox and the inbox consumer for the other service's
//! topic. Both loops and the server share one shutdown signal.

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::utils::{Shutdown, TaskHandle};

pub mod orders;
pub mod payments;

pub use orders::OrdersService;
pub use payments::PaymentsService;

/// Boxed error type returned by service entry points.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The relay and consumer loops of one service.
pub struct BackgroundTasks {
    relay: TaskHandle,
    consumer: TaskHandle,
}

impl BackgroundTasks {
    pub(crate) fn new(relay: TaskHandle, consumer: TaskHandle) -> Self {
        Self { relay, consumer }
    }

    /// Stop both loops, letting in-flight units finish.
    pub async fn shutdown(self) {
        self.relay.stop();
        self.consumer.stop();
        self.relay.shutdown().await;
        self.consumer.shutdown().await;
    }
}

/// Serve `router` on `addr` until `shutdown` fires.
pub async fn serve_http(router: Router, addr: &str, mut shutdown: Shutdown) -> Result<(), BoxError> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    info!(addr = %addr, "HTTP server stopped");
    Ok(())
}
