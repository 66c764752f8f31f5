//! Transaction store - intake facade over storage
//!
//! Owns payload bytes and transaction records. Intake renders the
//! configured partner routes into pending distributions and commits
//! record, payload, and distribution set in one atomic, synced batch:
//! readers never observe a partially-initialized transaction, and the
//! payload is durable before `submit` returns.

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::storage::Storage;
use crate::types::{ContentType, Distribution, PartnerRoute, PayloadRef, TransactionRecord};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Durable transaction store
pub struct TransactionStore {
    storage: Arc<Storage>,
    routes: Vec<PartnerRoute>,
    metrics: Metrics,
}

impl TransactionStore {
    /// Create a store over the shared storage with the partner routing
    /// table used at intake
    pub fn new(storage: Arc<Storage>, routes: Vec<PartnerRoute>, metrics: Metrics) -> Self {
        Self {
            storage,
            routes,
            metrics,
        }
    }

    /// Accept a document for distribution and return its transaction id
    pub fn submit(&self, payload: &[u8], content_type: ContentType) -> Result<Uuid> {
        if self.routes.is_empty() {
            return Err(Error::Config(
                "no partner routes configured; refusing intake".to_string(),
            ));
        }

        let transaction_id = Uuid::now_v7();
        let now = Utc::now();

        let record = TransactionRecord {
            transaction_id,
            payload_ref: PayloadRef::for_transaction(transaction_id),
            content_type,
            created_at: now,
            distribution_count: self.routes.len() as u32,
        };

        let distributions: Vec<Distribution> = self
            .routes
            .iter()
            .enumerate()
            .map(|(seq, route)| {
                Distribution::new(
                    transaction_id,
                    seq as u32,
                    route.partner.clone(),
                    route.method,
                    route.render_location(transaction_id),
                    now,
                )
            })
            .collect();

        self.storage
            .create_transaction(&record, payload, &distributions)?;

        self.metrics.transactions_submitted.inc();
        tracing::info!(
            transaction_id = %transaction_id,
            content_type = %content_type,
            partners = distributions.len(),
            "Transaction accepted"
        );

        Ok(transaction_id)
    }

    /// Get a transaction record by id
    pub fn get(&self, transaction_id: Uuid) -> Result<TransactionRecord> {
        self.storage.get_transaction(transaction_id)
    }

    /// Fetch the stored document bytes for a record
    pub fn payload(&self, record: &TransactionRecord) -> Result<Vec<u8>> {
        self.storage.get_payload(&record.payload_ref)
    }

    /// List transaction records in submission order
    pub fn list(&self, offset: usize, limit: usize) -> Result<Vec<TransactionRecord>> {
        self.storage.list_transactions(offset, limit)
    }
}
