//! Per-user push notifications.
//!
//! The hub maps a user id to at most one live connection. Each connection
//! owns a bounded queue; the WebSocket writer drains it. Pushes never block:
//! a full queue drops the notification, a closed queue removes the entry.
//!
//! A reconnect replaces the user's entry. Every registration carries a
//! generation number so that the old connection's cleanup cannot remove the
//! new one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::Notification;

/// Per-connection queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

struct Connection {
    conn_id: u64,
    tx: mpsc::Sender<String>,
}

/// Identifies one registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub user_id: Uuid,
    conn_id: u64,
}

/// Shared registry of connected users. Cheap to clone.
#[derive(Clone)]
pub struct NotificationHub {
    connections: Arc<Mutex<HashMap<Uuid, Connection>>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<Uuid, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a connection for `user_id`, replacing any previous one.
    pub fn register(&self, user_id: Uuid) -> (Registration, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let replaced = self
            .connections()
            .insert(user_id, Connection { conn_id, tx })
            .is_some();
        debug!(user_id = %user_id, conn_id, replaced, "Client registered");

        (Registration { user_id, conn_id }, rx)
    }

    /// Remove the registration if it is still the user's current one.
    pub fn unregister(&self, registration: &Registration) {
        let mut connections = self.connections();
        let current = connections
            .get(&registration.user_id)
            .is_some_and(|c| c.conn_id == registration.conn_id);
        if current {
            connections.remove(&registration.user_id);
            debug!(user_id = %registration.user_id, "Client unregistered");
        }
    }

    /// Queue `notification` for the user if connected. Returns whether it was
    /// queued.
    pub fn push_if_present(&self, user_id: Uuid, notification: &Notification) -> bool {
        let payload = match notification.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to encode notification");
                return false;
            }
        };

        let mut connections = self.connections();
        let Some(connection) = connections.get(&user_id) else {
            return false;
        };

        match connection.tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(user_id = %user_id, "Notification queue full, dropping");
                false
            }
            Err(TrySendError::Closed(_)) => {
                connections.remove(&user_id);
                debug!(user_id = %user_id, "Client gone, removed");
                false
            }
        }
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.connections().contains_key(&user_id)
    }

    pub fn connected_count(&self) -> usize {
        self.connections().len()
    }
}
