//! Status projector - externally-visible view of a transaction
//!
//! Projections are computed from a fresh ledger read on every call, so
//! a poll immediately observes dispatcher updates. The overall state is
//! derived, never stored: `complete` holds only when every distribution
//! finished successfully, while `has_failures` flags a resolved-but-
//! degraded transaction.

use crate::error::Result;
use crate::ledger::DistributionLedger;
use crate::store::TransactionStore;
use crate::types::{Distribution, DistributionStatus, DistributionView, StatusDocument};
use std::sync::Arc;
use uuid::Uuid;

/// Builds status documents for polling clients
pub struct StatusProjector {
    store: Arc<TransactionStore>,
    ledger: Arc<DistributionLedger>,
    public_base_url: String,
}

impl StatusProjector {
    /// Projector rendering status URLs under `public_base_url`
    pub fn new(
        store: Arc<TransactionStore>,
        ledger: Arc<DistributionLedger>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            public_base_url: public_base_url.into(),
        }
    }

    /// Current status of a transaction
    pub fn project(&self, transaction_id: Uuid) -> Result<StatusDocument> {
        // Existence check; TransactionNotFound is the only error a
        // caller should see for an unknown id
        self.store.get(transaction_id)?;

        let distributions = self.ledger.list_for(transaction_id)?;

        let complete = !distributions.is_empty()
            && distributions
                .iter()
                .all(|d| d.status == DistributionStatus::Complete);
        let has_failures = distributions
            .iter()
            .any(|d| d.status == DistributionStatus::Failed);

        Ok(StatusDocument {
            complete,
            has_failures,
            status_url: self.status_url(transaction_id),
            distribution: distributions.iter().map(Self::view).collect(),
        })
    }

    /// Polling URL for a transaction
    pub fn status_url(&self, transaction_id: Uuid) -> String {
        format!(
            "{}/v1/transaction/{}",
            self.public_base_url.trim_end_matches('/'),
            transaction_id
        )
    }

    fn view(dist: &Distribution) -> DistributionView {
        let confirmation = match &dist.confirmation {
            Some(raw) => serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.clone())),
            None => serde_json::Value::Null,
        };

        DistributionView {
            partner: dist.partner.clone(),
            method: dist.method.code().to_string(),
            status: dist.status.code().to_string(),
            location: dist.location.clone(),
            confirmation,
        }
    }
}
