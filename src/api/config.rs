//! HTTP server configuration types.

use serde::{Deserialize, Serialize};

/// Paginated read API server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1).
    pub bind: String,
    /// Port for the API server.
    pub port: u16,
    /// Origins allowed by CORS. Empty allows any origin.
    pub allowed_origins: Vec<String>,
    /// Maximum accepted ingest body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
            allowed_origins: Vec::new(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
