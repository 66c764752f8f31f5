//! SFTP dropoff collaborator
//!
//! Stages documents into a local dropoff spool laid out to mirror the
//! partner's remote path. An external SFTP transport owns the actual
//! network hop and sweeps the spool.

use super::DeliveryClient;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Stages files for an external SFTP transport
pub struct SftpDropClient {
    dropoff_root: PathBuf,
}

impl SftpDropClient {
    /// Client staging into `dropoff_root`
    pub fn new(dropoff_root: PathBuf) -> Self {
        Self { dropoff_root }
    }

    /// Map a partner path onto the spool, rejecting traversal segments
    fn staged_path(&self, location: &str) -> Result<PathBuf> {
        let relative = Path::new(location.trim_start_matches('/'));

        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
        {
            return Err(Error::Delivery(format!(
                "Refusing SFTP location with traversal segments: {}",
                location
            )));
        }

        Ok(self.dropoff_root.join(relative))
    }
}

#[async_trait]
impl DeliveryClient for SftpDropClient {
    async fn deliver(&self, location: &str, payload: &[u8]) -> Result<serde_json::Value> {
        let path = self.staged_path(location)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Delivery(format!("SFTP spool mkdir failed: {}", e)))?;
        }

        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| Error::Delivery(format!("SFTP spool write failed: {}", e)))?;

        let receipt = format!("SFTP-{}", Uuid::new_v4());
        info!(location, receipt = %receipt, bytes = payload.len(), "Document staged for SFTP");

        Ok(serde_json::json!({
            "receipt": receipt,
            "staged_path": path.display().to_string(),
            "bytes": payload.len(),
            "delivered_at": Utc::now().to_rfc3339(),
        }))
    }
}
