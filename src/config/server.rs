//! HTTP server configuration.

use serde::Deserialize;

use super::ServiceRole;

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port override for single-service binaries (`HTTP_PORT`).
    pub port: Option<u16>,
    /// Order service port when no override is set.
    pub orders_port: u16,
    /// Payment service port when no override is set.
    pub payments_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: None,
            orders_port: 8080,
            payments_port: 8081,
        }
    }
}

impl ServerConfig {
    /// Port a single-service binary listens on.
    pub fn port_for(&self, role: ServiceRole) -> u16 {
        self.port.unwrap_or_else(|| self.role_port(role))
    }

    /// Port ignoring the override; the standalone binary binds both.
    pub fn role_port(&self, role: ServiceRole) -> u16 {
        match role {
            ServiceRole::Orders => self.orders_port,
            ServiceRole::Payments => self.payments_port,
        }
    }

    pub fn bind_addr(&self, port: u16) -> String {
        format!("{}:{}", self.host, port)
    }
}
