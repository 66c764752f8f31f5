//! Cloud-storage archive collaborator
//!
//! Maps `s3://bucket/key` object URIs onto a local archive spool that
//! an external sync process uploads. The bucket name becomes the first
//! path segment so multiple buckets can share one spool.

use super::DeliveryClient;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

/// Stages objects for an external cloud-storage sync
pub struct CloudStorageClient {
    archive_root: PathBuf,
}

impl CloudStorageClient {
    /// Client staging into `archive_root`
    pub fn new(archive_root: PathBuf) -> Self {
        Self { archive_root }
    }

    /// Split an `s3://bucket/key` URI into bucket and key
    fn parse_object_uri(location: &str) -> Result<(&str, &str)> {
        let rest = location
            .strip_prefix("s3://")
            .ok_or_else(|| Error::Delivery(format!("Unsupported object URI: {}", location)))?;

        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| Error::Delivery(format!("Object URI missing key: {}", location)))?;

        if bucket.is_empty() || key.is_empty() || key.contains("..") {
            return Err(Error::Delivery(format!("Malformed object URI: {}", location)));
        }

        Ok((bucket, key))
    }
}

#[async_trait]
impl DeliveryClient for CloudStorageClient {
    async fn deliver(&self, location: &str, payload: &[u8]) -> Result<serde_json::Value> {
        let (bucket, key) = Self::parse_object_uri(location)?;
        let path = self.archive_root.join(bucket).join(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Delivery(format!("Archive spool mkdir failed: {}", e)))?;
        }

        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| Error::Delivery(format!("Archive spool write failed: {}", e)))?;

        let receipt = format!("OBJ-{}", Uuid::new_v4());
        info!(location, receipt = %receipt, bytes = payload.len(), "Object staged for archive");

        Ok(serde_json::json!({
            "receipt": receipt,
            "object": location,
            "bytes": payload.len(),
            "stored_at": Utc::now().to_rfc3339(),
        }))
    }
}
