//! HTTP server configuration

use serde::{Deserialize, Serialize};

/// Gateway server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen host
    pub host: String,

    /// Listen port
    pub port: u16,

    /// HTTP worker threads
    pub workers: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: 4,
        }
    }
}

impl GatewayConfig {
    /// Load from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = GatewayConfig::default();

        if let Ok(host) = std::env::var("NANITES_HTTP_HOST") {
            config.host = host;
        }

        if let Ok(port) = std::env::var("NANITES_HTTP_PORT") {
            config.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid NANITES_HTTP_PORT: {}", port))?;
        }

        if let Ok(workers) = std::env::var("NANITES_HTTP_WORKERS") {
            config.workers = workers
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid NANITES_HTTP_WORKERS: {}", workers))?;
        }

        Ok(config)
    }
}
