//! Dispatcher - worker pool draining claimed distributions
//!
//! Workers claim batches from the ledger, deliver through the
//! method-specific collaborator, and record the outcome with a
//! compare-and-set update. The claim is the only serialized step;
//! no ledger lock is held while a collaborator call is in flight, so
//! slow partner I/O never stalls other workers. A worker that dies
//! mid-delivery leaves an in-progress record whose lease expires and
//! gets reclaimed on a later cycle.

use crate::config::DispatcherConfig;
use crate::delivery::DeliveryRouter;
use crate::error::{Error, Result};
use crate::ledger::DistributionLedger;
use crate::metrics::Metrics;
use crate::retry::RetryPolicy;
use crate::store::TransactionStore;
use crate::types::Distribution;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Worker pool delivering claimed distributions
pub struct Dispatcher {
    store: Arc<TransactionStore>,
    ledger: Arc<DistributionLedger>,
    router: Arc<DeliveryRouter>,
    retry: RetryPolicy,
    config: DispatcherConfig,
    metrics: Metrics,
}

/// Handle for stopping a running dispatcher
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Signal all workers and wait for them to drain their current batch
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            worker
                .await
                .map_err(|e| Error::Concurrency(format!("Worker task panicked: {}", e)))?;
        }
        Ok(())
    }
}

impl Dispatcher {
    /// Create a dispatcher over the shared store and ledger
    pub fn new(
        store: Arc<TransactionStore>,
        ledger: Arc<DistributionLedger>,
        router: Arc<DeliveryRouter>,
        retry: RetryPolicy,
        config: DispatcherConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            ledger,
            router,
            retry,
            config,
            metrics,
        }
    }

    /// Spawn the configured number of worker tasks
    pub fn spawn(self: Arc<Self>) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let workers = (0..self.config.workers)
            .map(|worker_id| {
                let dispatcher = self.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move {
                    dispatcher.worker_loop(worker_id, shutdown).await;
                })
            })
            .collect();

        info!(workers = self.config.workers, "Dispatcher started");

        DispatcherHandle {
            shutdown: shutdown_tx,
            workers,
        }
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(0) => {
                    // Idle; wait for work or shutdown
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
                Ok(processed) => {
                    debug!(worker_id, processed, "Batch drained");
                }
                Err(e) => {
                    error!(worker_id, "Claim cycle failed: {}", e);
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        debug!(worker_id, "Worker stopped");
    }

    /// Claim and process one batch; returns the number processed
    ///
    /// Exposed so tests and operational tooling can drive the
    /// dispatcher deterministically without the polling loop.
    pub async fn run_once(&self) -> Result<usize> {
        let claimed = self.ledger.claim_pending(self.config.claim_batch_size)?;
        let count = claimed.len();

        for distribution in claimed {
            self.process_distribution(distribution).await;
        }

        Ok(count)
    }

    async fn process_distribution(&self, dist: Distribution) {
        let record = match self.store.get(dist.transaction_id) {
            Ok(record) => record,
            Err(Error::TransactionNotFound(_)) => {
                // Store-level inconsistency: fatal for this distribution
                error!(
                    transaction_id = %dist.transaction_id,
                    partner = %dist.partner,
                    "Transaction record missing; failing distribution"
                );
                self.record_failure(&dist, "transaction record missing");
                return;
            }
            Err(e) => {
                // Transient store failure: leave the claim to expire
                error!(
                    transaction_id = %dist.transaction_id,
                    "Store read failed, will reclaim after lease expiry: {}",
                    e
                );
                return;
            }
        };

        let payload = match self.store.payload(&record) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    transaction_id = %dist.transaction_id,
                    "Payload read failed, will reclaim after lease expiry: {}",
                    e
                );
                return;
            }
        };

        let client = match self.router.client_for(dist.method) {
            Ok(client) => client,
            Err(e) => {
                // No retry can succeed without a client for the method
                self.record_failure(&dist, &e.to_string());
                return;
            }
        };

        let timer = self.metrics.delivery_duration.start_timer();
        let outcome = client.deliver(&dist.location, &payload).await;
        timer.observe_duration();

        match outcome {
            Ok(confirmation) => match self.ledger.complete_delivery(&dist, confirmation) {
                Ok(done) => {
                    self.metrics.deliveries_completed.inc();
                    info!(
                        transaction_id = %dist.transaction_id,
                        partner = %dist.partner,
                        attempts = done.attempts,
                        "Distribution complete"
                    );
                }
                Err(Error::Conflict(reason)) => {
                    warn!(
                        transaction_id = %dist.transaction_id,
                        partner = %dist.partner,
                        "Completion lost a race, leaving to the new claimant: {}",
                        reason
                    );
                }
                Err(e) => {
                    error!(
                        transaction_id = %dist.transaction_id,
                        "Completion update failed: {}",
                        e
                    );
                }
            },
            Err(e) => {
                let reason = e.to_string();
                let attempts_made = dist.attempts + 1;

                if self.retry.is_exhausted(attempts_made) {
                    warn!(
                        transaction_id = %dist.transaction_id,
                        partner = %dist.partner,
                        attempts = attempts_made,
                        "Retry budget exhausted: {}",
                        reason
                    );
                    self.record_failure(&dist, &reason);
                } else {
                    let next_attempt_at = self.retry.next_attempt_at(Utc::now(), attempts_made);
                    match self.ledger.requeue_delivery(&dist, next_attempt_at, &reason) {
                        Ok(_) => {
                            self.metrics.delivery_retries.inc();
                            warn!(
                                transaction_id = %dist.transaction_id,
                                partner = %dist.partner,
                                attempt = attempts_made,
                                next_attempt_at = %next_attempt_at,
                                "Delivery failed, requeued: {}",
                                reason
                            );
                        }
                        Err(Error::Conflict(conflict)) => {
                            warn!(
                                transaction_id = %dist.transaction_id,
                                "Requeue lost a race: {}",
                                conflict
                            );
                        }
                        Err(update_err) => {
                            error!(
                                transaction_id = %dist.transaction_id,
                                "Requeue update failed: {}",
                                update_err
                            );
                        }
                    }
                }
            }
        }
    }

    fn record_failure(&self, dist: &Distribution, reason: &str) {
        match self.ledger.fail_delivery(dist, reason) {
            Ok(_) => self.metrics.deliveries_failed.inc(),
            Err(Error::Conflict(conflict)) => {
                warn!(
                    transaction_id = %dist.transaction_id,
                    "Failure update lost a race: {}",
                    conflict
                );
            }
            Err(e) => {
                error!(
                    transaction_id = %dist.transaction_id,
                    "Failure update failed: {}",
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::mock::MockDeliveryClient;
    use crate::delivery::DeliveryClient;
    use crate::retry::RetryConfig;
    use crate::storage::Storage;
    use crate::types::{ContentType, DeliveryMethod, DistributionStatus, PartnerRoute};
    use crate::Config;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;
    use uuid::Uuid;

    /// Fails the first `fail_first` deliveries, then succeeds
    struct FlakyClient {
        fail_first: u32,
        calls: AtomicU32,
    }

    impl FlakyClient {
        fn new(fail_first: u32) -> Self {
            Self {
                fail_first,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DeliveryClient for FlakyClient {
        async fn deliver(&self, _location: &str, _payload: &[u8]) -> Result<serde_json::Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(Error::Delivery("partner connection reset".to_string()))
            } else {
                Ok(serde_json::json!({"receipt": format!("FLAKY-{}", call)}))
            }
        }
    }

    struct Harness {
        storage: Arc<Storage>,
        store: Arc<TransactionStore>,
        ledger: Arc<DistributionLedger>,
        dispatcher: Dispatcher,
        _temp: TempDir,
    }

    fn harness(client: Arc<dyn DeliveryClient>, max_attempts: u32, partners: usize) -> Harness {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp.path().to_path_buf();
        config.routes = (0..partners)
            .map(|i| PartnerRoute {
                partner: format!("partner_{}", i),
                method: DeliveryMethod::Mock,
                location_template: format!("mock://partner_{}/{{transaction_id}}", i),
            })
            .collect();
        config.retry = RetryConfig {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };

        let storage = Arc::new(Storage::open(&config).unwrap());
        let metrics = Metrics::default();
        let store = Arc::new(TransactionStore::new(
            storage.clone(),
            config.routes.clone(),
            metrics.clone(),
        ));
        let ledger = Arc::new(DistributionLedger::new(
            storage.clone(),
            Duration::from_secs(60),
        ));
        let router = Arc::new(DeliveryRouter::empty().with_client(DeliveryMethod::Mock, client));

        let dispatcher = Dispatcher::new(
            store.clone(),
            ledger.clone(),
            router,
            RetryPolicy::new(config.retry.clone()),
            config.dispatcher.clone(),
            metrics,
        );

        Harness {
            storage,
            store,
            ledger,
            dispatcher,
            _temp: temp,
        }
    }

    async fn drain_until_settled(h: &Harness, id: Uuid) -> Vec<Distribution> {
        for _ in 0..50 {
            h.dispatcher.run_once().await.unwrap();
            let dists = h.ledger.list_for(id).unwrap();
            if dists.iter().all(|d| d.is_terminal()) {
                return dists;
            }
        }
        h.ledger.list_for(id).unwrap()
    }

    #[tokio::test]
    async fn test_successful_delivery_completes() {
        let h = harness(Arc::new(MockDeliveryClient::new(0, 1.0)), 3, 2);
        let id = h.store.submit(b"ISA*00*", ContentType::X12).unwrap();

        let processed = h.dispatcher.run_once().await.unwrap();
        assert_eq!(processed, 2);

        let dists = h.ledger.list_for(id).unwrap();
        assert!(dists.iter().all(|d| d.status == DistributionStatus::Complete));
        assert!(dists.iter().all(|d| d.attempts == 1));
        assert!(dists.iter().all(|d| d.confirmation.is_some()));

        // Terminal states stay terminal: nothing left to claim
        assert_eq!(h.dispatcher.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_exhausts_exact_attempts() {
        let h = harness(Arc::new(MockDeliveryClient::new(0, 0.0)), 3, 1);
        let id = h.store.submit(b"UNB+", ContentType::Edifact).unwrap();

        let dists = drain_until_settled(&h, id).await;
        assert_eq!(dists.len(), 1);
        assert_eq!(dists[0].status, DistributionStatus::Failed);
        assert_eq!(dists[0].attempts, 3);
        assert!(dists[0].failure_reason.is_some());
    }

    #[tokio::test]
    async fn test_flaky_delivery_recovers() {
        let h = harness(Arc::new(FlakyClient::new(2)), 5, 1);
        let id = h.store.submit(b"{}", ContentType::Json).unwrap();

        let dists = drain_until_settled(&h, id).await;
        assert_eq!(dists[0].status, DistributionStatus::Complete);
        assert_eq!(dists[0].attempts, 3); // 2 failures + 1 success
    }

    #[tokio::test]
    async fn test_missing_transaction_is_fatal() {
        let h = harness(Arc::new(MockDeliveryClient::new(0, 1.0)), 3, 1);

        // Orphan distribution with no transaction record behind it
        let orphan_id = Uuid::now_v7();
        let orphan = Distribution::new(
            orphan_id,
            0,
            "partner_0",
            DeliveryMethod::Mock,
            "mock://partner_0/orphan",
            Utc::now(),
        );
        h.storage
            .write_distributions(&[(DistributionStatus::Pending, orphan)])
            .unwrap();

        h.dispatcher.run_once().await.unwrap();

        let dists = h.ledger.list_for(orphan_id).unwrap();
        assert_eq!(dists[0].status, DistributionStatus::Failed);
        assert_eq!(
            dists[0].failure_reason.as_deref(),
            Some("transaction record missing")
        );
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let h = harness(Arc::new(MockDeliveryClient::new(0, 1.0)), 3, 1);
        let id = h.store.submit(b"ISA*00*", ContentType::X12).unwrap();

        let dispatcher = Arc::new(h.dispatcher);
        let handle = dispatcher.clone().spawn();

        // Workers pick the distribution up without explicit driving
        for _ in 0..100 {
            if h.ledger.list_for(id).unwrap().iter().all(|d| d.is_terminal()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        handle.shutdown().await.unwrap();

        let dists = h.ledger.list_for(id).unwrap();
        assert!(dists.iter().all(|d| d.status == DistributionStatus::Complete));
    }
}
