//! Delivery collaborators - transport-specific document senders
//!
//! Each distribution method maps to one client. The shipped clients
//! stage documents into local spool directories that external
//! transports (SFTP server, cloud sync) sweep; the trait is the seam
//! where real network transports plug in.

pub mod cloud;
pub mod mock;
pub mod sftp;

use crate::config::DeliveryConfig;
use crate::error::{Error, Result};
use crate::types::DeliveryMethod;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Transport-specific document sender
///
/// `deliver` returns an opaque JSON confirmation receipt on success.
/// Failures are `Error::Delivery` and are retried by the dispatcher up
/// to the configured policy limit.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Send `payload` to `location`, returning a confirmation receipt
    async fn deliver(&self, location: &str, payload: &[u8]) -> Result<serde_json::Value>;
}

/// Routes each delivery method to its client
pub struct DeliveryRouter {
    clients: HashMap<DeliveryMethod, Arc<dyn DeliveryClient>>,
}

impl DeliveryRouter {
    /// Router with no clients registered
    pub fn empty() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Router with the standard clients built from configuration
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::empty()
            .with_client(
                DeliveryMethod::Sftp,
                Arc::new(sftp::SftpDropClient::new(config.sftp_dropoff_dir.clone())),
            )
            .with_client(
                DeliveryMethod::CloudStorage,
                Arc::new(cloud::CloudStorageClient::new(config.cloud_archive_dir.clone())),
            )
            .with_client(
                DeliveryMethod::Mock,
                Arc::new(mock::MockDeliveryClient::new(
                    config.mock_latency_ms,
                    config.mock_success_rate,
                )),
            )
    }

    /// Register or replace the client for a method
    pub fn with_client(mut self, method: DeliveryMethod, client: Arc<dyn DeliveryClient>) -> Self {
        self.clients.insert(method, client);
        self
    }

    /// Resolve the client for a method
    pub fn client_for(&self, method: DeliveryMethod) -> Result<Arc<dyn DeliveryClient>> {
        self.clients
            .get(&method)
            .cloned()
            .ok_or_else(|| Error::Config(format!("No delivery client registered for {}", method)))
    }
}
