//! Distribution ledger - per-partner delivery records
//!
//! All mutation goes through a single claim mutex plus a conditional
//! re-read (compare-and-set on status, attempts, and the lease token),
//! so concurrent workers can never claim or finalize the same
//! distribution twice. Reads never take the lock: each distribution is
//! one atomic record, so a projection is never torn between fields.

use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::types::{DeliveryMethod, Distribution, DistributionStatus};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Ledger of distribution records with leased claiming
pub struct DistributionLedger {
    storage: Arc<Storage>,
    claim_lock: Mutex<()>,
    lease_timeout: Duration,
}

impl DistributionLedger {
    /// Create a ledger over the shared storage
    pub fn new(storage: Arc<Storage>, lease_timeout: std::time::Duration) -> Self {
        Self {
            storage,
            claim_lock: Mutex::new(()),
            lease_timeout: Duration::from_std(lease_timeout)
                .unwrap_or_else(|_| Duration::seconds(60)),
        }
    }

    /// List a transaction's distributions in creation order
    pub fn list_for(&self, transaction_id: Uuid) -> Result<Vec<Distribution>> {
        self.storage.list_distributions(transaction_id)
    }

    /// Atomically claim up to `limit` distributions for delivery
    ///
    /// Claimable distributions are pending records whose
    /// `next_attempt_at` has passed, plus in-progress records whose
    /// lease expired (a worker died mid-delivery). Claimed records are
    /// marked in-progress under a fresh lease before being returned;
    /// the mutex makes the mark-and-return atomic with respect to
    /// other claimers.
    pub fn claim_pending(&self, limit: usize) -> Result<Vec<Distribution>> {
        let _guard = self.claim_lock.lock();
        let now = Utc::now();

        let mut candidates: Vec<Distribution> = Vec::new();

        for dist in self.storage.distributions_with_status(DistributionStatus::Pending)? {
            if candidates.len() >= limit {
                break;
            }
            let due = dist.next_attempt_at.map_or(true, |at| at <= now);
            if due {
                candidates.push(dist);
            }
        }

        if candidates.len() < limit {
            for dist in self
                .storage
                .distributions_with_status(DistributionStatus::InProgress)?
            {
                if candidates.len() >= limit {
                    break;
                }
                let expired = dist.lease_expires_at.map_or(true, |at| at <= now);
                if expired {
                    candidates.push(dist);
                }
            }
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut updates = Vec::with_capacity(candidates.len());
        let mut claimed = Vec::with_capacity(candidates.len());

        for dist in candidates {
            let old_status = dist.status;
            let mut next = dist;
            next.status = DistributionStatus::InProgress;
            next.lease_expires_at = Some(now + self.lease_timeout);
            next.updated_at = now;
            claimed.push(next.clone());
            updates.push((old_status, next));
        }

        self.storage.write_distributions(&updates)?;

        tracing::debug!(claimed = claimed.len(), "Distributions claimed");
        Ok(claimed)
    }

    /// Compare-and-set update keyed by (transaction, partner, method)
    ///
    /// Fails with `Conflict` when the distribution is already terminal
    /// or the requested transition is not legal from its current
    /// status. `confirmation` is recorded only on terminal transitions.
    pub fn update(
        &self,
        transaction_id: Uuid,
        partner: &str,
        method: DeliveryMethod,
        new_status: DistributionStatus,
        confirmation: Option<serde_json::Value>,
    ) -> Result<()> {
        let _guard = self.claim_lock.lock();

        let current = self
            .list_for(transaction_id)?
            .into_iter()
            .find(|d| d.partner == partner && d.method == method)
            .ok_or_else(|| {
                Error::DistributionNotFound(format!("{}/{}/{}", transaction_id, partner, method))
            })?;

        if current.is_terminal() {
            return Err(Error::Conflict(format!(
                "Distribution {}/{} is already {}",
                transaction_id, partner, current.status
            )));
        }

        if !Self::transition_allowed(current.status, new_status) {
            return Err(Error::Conflict(format!(
                "Illegal transition {} -> {} for {}/{}",
                current.status, new_status, transaction_id, partner
            )));
        }

        let now = Utc::now();
        let old_status = current.status;
        let mut next = current;
        next.status = new_status;
        next.updated_at = now;
        if new_status.is_terminal() {
            next.confirmation = confirmation.map(|v| v.to_string());
            next.lease_expires_at = None;
            next.next_attempt_at = None;
        }

        self.storage.write_distributions(&[(old_status, next)])
    }

    fn transition_allowed(from: DistributionStatus, to: DistributionStatus) -> bool {
        use DistributionStatus::*;
        matches!(
            (from, to),
            (Pending, InProgress) | (InProgress, Complete) | (InProgress, Failed) | (InProgress, Pending)
        )
    }

    // Dispatcher-facing transitions. Each re-reads the record and
    // verifies the claim snapshot still holds (status in-progress, same
    // attempt count, same lease token) before writing, so a worker that
    // lost its lease to a reclaim gets a Conflict instead of clobbering
    // the new owner's state.

    fn checked_transition<F>(&self, snapshot: &Distribution, apply: F) -> Result<Distribution>
    where
        F: FnOnce(&mut Distribution),
    {
        let _guard = self.claim_lock.lock();

        let current = self
            .storage
            .get_distribution(snapshot.transaction_id, snapshot.seq)?;

        let holds_claim = current.status == DistributionStatus::InProgress
            && current.attempts == snapshot.attempts
            && current.lease_expires_at == snapshot.lease_expires_at;

        if !holds_claim {
            return Err(Error::Conflict(format!(
                "Claim lost for {}/{} (now {})",
                snapshot.transaction_id, snapshot.partner, current.status
            )));
        }

        let old_status = current.status;
        let mut next = current;
        next.attempts += 1;
        next.lease_expires_at = None;
        next.updated_at = Utc::now();
        apply(&mut next);

        self.storage
            .write_distributions(&[(old_status, next.clone())])?;
        Ok(next)
    }

    /// Record a successful delivery with its receipt
    pub fn complete_delivery(
        &self,
        snapshot: &Distribution,
        confirmation: serde_json::Value,
    ) -> Result<Distribution> {
        self.checked_transition(snapshot, |next| {
            next.status = DistributionStatus::Complete;
            next.confirmation = Some(confirmation.to_string());
            next.next_attempt_at = None;
            next.failure_reason = None;
        })
    }

    /// Return a failed delivery to the pending queue for a later retry
    pub fn requeue_delivery(
        &self,
        snapshot: &Distribution,
        next_attempt_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<Distribution> {
        self.checked_transition(snapshot, |next| {
            next.status = DistributionStatus::Pending;
            next.next_attempt_at = Some(next_attempt_at);
            next.failure_reason = Some(reason.to_string());
        })
    }

    /// Mark a delivery failed for good, recording the reason
    pub fn fail_delivery(&self, snapshot: &Distribution, reason: &str) -> Result<Distribution> {
        self.checked_transition(snapshot, |next| {
            next.status = DistributionStatus::Failed;
            next.confirmation = Some(serde_json::json!({ "error": reason }).to_string());
            next.next_attempt_at = None;
            next.failure_reason = Some(reason.to_string());
        })
    }
}
