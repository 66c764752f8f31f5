//! Mock delivery collaborator for tests and staging environments

use super::DeliveryClient;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Simulates a transport with configurable latency and failure rate
pub struct MockDeliveryClient {
    latency_ms: u64,
    success_rate: f64,
    deliveries: Arc<RwLock<HashMap<String, u32>>>,
}

impl MockDeliveryClient {
    /// Client with fixed latency and success rate (1.0 = always succeeds)
    pub fn new(latency_ms: u64, success_rate: f64) -> Self {
        Self {
            latency_ms,
            success_rate,
            deliveries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn should_succeed(&self) -> bool {
        let mut rng = rand::thread_rng();
        rng.gen::<f64>() <= self.success_rate
    }

    /// Number of successful deliveries recorded for a location
    pub async fn delivery_count(&self, location: &str) -> u32 {
        self.deliveries
            .read()
            .await
            .get(location)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DeliveryClient for MockDeliveryClient {
    async fn deliver(&self, location: &str, payload: &[u8]) -> Result<serde_json::Value> {
        // Simulate network latency
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        if !self.should_succeed() {
            warn!(location, "Mock transport: simulated delivery failure");
            return Err(Error::Delivery("Simulated delivery failure".to_string()));
        }

        let receipt = format!("MOCK-{}", Uuid::new_v4());
        *self
            .deliveries
            .write()
            .await
            .entry(location.to_string())
            .or_insert(0) += 1;

        info!(location, receipt = %receipt, bytes = payload.len(), "Mock delivery complete");

        Ok(serde_json::json!({
            "receipt": receipt,
            "delivered_at": Utc::now().to_rfc3339(),
        }))
    }
}
