//! Property-based tests for distribution invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Intake atomicity: a projection right after submit sees the full
//!   pending distribution set
//! - At-most-once claiming under concurrent workers
//! - Retry budget: a permanently failing partner consumes exactly the
//!   configured number of attempts
//! - Projection idempotence absent dispatcher activity

use distribution_core::delivery::{DeliveryClient, DeliveryRouter};
use distribution_core::{
    Config, ContentType, DeliveryMethod, Dispatcher, Distribution, DistributionLedger,
    DistributionStatus, Metrics, PartnerRoute, RetryConfig, RetryPolicy, StatusProjector, Storage,
    TransactionStore,
};
use async_trait::async_trait;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// Per-location scripted delivery behavior
#[derive(Debug, Clone, Copy)]
enum Script {
    Succeed,
    AlwaysFail,
    FailFirst(u32),
}

/// Routes delivery outcomes by partner name embedded in the location
struct ScriptedClient {
    scripts: Vec<(String, Script)>,
    calls: parking_lot::Mutex<HashMap<String, u32>>,
}

impl ScriptedClient {
    fn new(scripts: Vec<(String, Script)>) -> Self {
        Self {
            scripts,
            calls: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn script_for(&self, location: &str) -> Script {
        self.scripts
            .iter()
            .find(|(partner, _)| location.contains(partner.as_str()))
            .map(|(_, script)| *script)
            .unwrap_or(Script::Succeed)
    }
}

#[async_trait]
impl DeliveryClient for ScriptedClient {
    async fn deliver(
        &self,
        location: &str,
        _payload: &[u8],
    ) -> distribution_core::Result<serde_json::Value> {
        let call = {
            let mut calls = self.calls.lock();
            let counter = calls.entry(location.to_string()).or_insert(0);
            let current = *counter;
            *counter += 1;
            current
        };

        match self.script_for(location) {
            Script::Succeed => Ok(serde_json::json!({"receipt": format!("OK-{}", call)})),
            Script::AlwaysFail => Err(distribution_core::Error::Delivery(
                "partner permanently unavailable".to_string(),
            )),
            Script::FailFirst(n) if call < n => Err(distribution_core::Error::Delivery(
                "partner timed out".to_string(),
            )),
            Script::FailFirst(_) => Ok(serde_json::json!({"receipt": format!("OK-{}", call)})),
        }
    }
}

/// Always succeeds and counts calls
struct CountingClient {
    calls: AtomicU32,
}

#[async_trait]
impl DeliveryClient for CountingClient {
    async fn deliver(
        &self,
        _location: &str,
        _payload: &[u8],
    ) -> distribution_core::Result<serde_json::Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({"receipt": call}))
    }
}

struct Core {
    store: Arc<TransactionStore>,
    ledger: Arc<DistributionLedger>,
    dispatcher: Dispatcher,
    projector: StatusProjector,
    _temp: TempDir,
}

fn mock_routes(partners: &[&str]) -> Vec<PartnerRoute> {
    partners
        .iter()
        .map(|partner| PartnerRoute {
            partner: partner.to_string(),
            method: DeliveryMethod::Mock,
            location_template: format!("mock://{}/{{transaction_id}}", partner),
        })
        .collect()
}

fn build_core(
    routes: Vec<PartnerRoute>,
    retry: RetryConfig,
    client: Arc<dyn DeliveryClient>,
) -> Core {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp.path().to_path_buf();
    config.routes = routes;
    config.retry = retry;

    let storage = Arc::new(Storage::open(&config).unwrap());
    let metrics = Metrics::default();
    let store = Arc::new(TransactionStore::new(
        storage.clone(),
        config.routes.clone(),
        metrics.clone(),
    ));
    let ledger = Arc::new(DistributionLedger::new(storage, Duration::from_secs(60)));
    let router = Arc::new(DeliveryRouter::empty().with_client(DeliveryMethod::Mock, client));
    let dispatcher = Dispatcher::new(
        store.clone(),
        ledger.clone(),
        router,
        RetryPolicy::new(config.retry.clone()),
        config.dispatcher.clone(),
        metrics,
    );
    let projector = StatusProjector::new(
        store.clone(),
        ledger.clone(),
        config.public_base_url.clone(),
    );

    Core {
        store,
        ledger,
        dispatcher,
        projector,
        _temp: temp,
    }
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 0,
        max_delay_ms: 0,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

async fn drain_until_settled(core: &Core, id: Uuid) -> Vec<Distribution> {
    for _ in 0..100 {
        core.dispatcher.run_once().await.unwrap();
        let dists = core.ledger.list_for(id).unwrap();
        if dists.iter().all(|d| d.is_terminal()) {
            return dists;
        }
    }
    core.ledger.list_for(id).unwrap()
}

/// Strategy for generating payloads across the supported content types
fn payload_strategy() -> impl Strategy<Value = (Vec<u8>, ContentType)> {
    (
        prop::collection::vec(any::<u8>(), 1..2048),
        prop_oneof![
            Just(ContentType::X12),
            Just(ContentType::Edifact),
            Just(ContentType::Json),
        ],
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    /// Property: immediately after submit, every distribution is
    /// pending and the transaction is not complete
    #[test]
    fn prop_submit_then_project_all_pending(
        (payload, content_type) in payload_strategy(),
        partner_count in 1usize..5,
    ) {
        let partners: Vec<String> = (0..partner_count).map(|i| format!("partner-{}", i)).collect();
        let refs: Vec<&str> = partners.iter().map(String::as_str).collect();
        let core = build_core(
            mock_routes(&refs),
            fast_retry(3),
            Arc::new(CountingClient { calls: AtomicU32::new(0) }),
        );

        let id = core.store.submit(&payload, content_type).unwrap();
        let doc = core.projector.project(id).unwrap();

        prop_assert!(!doc.complete);
        prop_assert!(!doc.has_failures);
        prop_assert_eq!(doc.distribution.len(), partner_count);
        for view in &doc.distribution {
            prop_assert_eq!(view.status.as_str(), "pending");
            prop_assert_eq!(&view.confirmation, &serde_json::Value::Null);
        }
    }

    /// Property: concurrent claimers never receive the same
    /// distribution twice
    #[test]
    fn prop_claim_at_most_once(
        transactions in 1usize..6,
        claimers in 2usize..6,
        batch in 1usize..8,
    ) {
        let core = build_core(
            mock_routes(&["a", "b", "c"]),
            fast_retry(3),
            Arc::new(CountingClient { calls: AtomicU32::new(0) }),
        );

        for _ in 0..transactions {
            core.store.submit(b"payload", ContentType::Json).unwrap();
        }
        let total = transactions * 3;

        let claimed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        std::thread::scope(|scope| {
            for _ in 0..claimers {
                let ledger = core.ledger.clone();
                let claimed = claimed.clone();
                scope.spawn(move || loop {
                    let chunk = ledger.claim_pending(batch).unwrap();
                    if chunk.is_empty() {
                        break;
                    }
                    claimed.lock().extend(chunk);
                });
            }
        });

        let claimed = claimed.lock();
        let mut keys: Vec<(Uuid, u32)> =
            claimed.iter().map(|d| (d.transaction_id, d.seq)).collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();

        prop_assert_eq!(before, keys.len()); // no duplicates
        prop_assert_eq!(keys.len(), total);  // and nothing missed
    }

    /// Property: a permanently failing partner consumes exactly the
    /// configured attempt budget before failing
    #[test]
    fn prop_failed_after_exact_attempts(max_attempts in 1u32..6) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let core = build_core(
                mock_routes(&["unreachable"]),
                fast_retry(max_attempts),
                Arc::new(ScriptedClient::new(vec![(
                    "unreachable".to_string(),
                    Script::AlwaysFail,
                )])),
            );

            let id = core.store.submit(b"payload", ContentType::X12).unwrap();
            let dists = drain_until_settled(&core, id).await;

            prop_assert_eq!(dists.len(), 1);
            prop_assert_eq!(dists[0].status, DistributionStatus::Failed);
            prop_assert_eq!(dists[0].attempts, max_attempts);
            Ok(())
        })?;
    }

    /// Property: projecting twice with no dispatcher activity yields
    /// identical documents
    #[test]
    fn prop_projection_idempotent((payload, content_type) in payload_strategy()) {
        let core = build_core(
            mock_routes(&["a", "b"]),
            fast_retry(3),
            Arc::new(CountingClient { calls: AtomicU32::new(0) }),
        );

        let id = core.store.submit(&payload, content_type).unwrap();
        let first = core.projector.project(id).unwrap();
        let second = core.projector.project(id).unwrap();
        prop_assert_eq!(first, second);
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_mixed_outcome_scenario() {
        // Partner A succeeds, B fails permanently, C times out once
        // then succeeds
        let core = build_core(
            mock_routes(&["partner-a", "partner-b", "partner-c"]),
            fast_retry(3),
            Arc::new(ScriptedClient::new(vec![
                ("partner-a".to_string(), Script::Succeed),
                ("partner-b".to_string(), Script::AlwaysFail),
                ("partner-c".to_string(), Script::FailFirst(1)),
            ])),
        );

        let id = core.store.submit(b"ISA*00*MIXED", ContentType::X12).unwrap();
        let dists = drain_until_settled(&core, id).await;
        assert!(dists.iter().all(|d| d.is_terminal()));

        let doc = core.projector.project(id).unwrap();
        assert!(!doc.complete);
        assert!(doc.has_failures);

        let by_partner: HashMap<&str, &distribution_core::DistributionView> = doc
            .distribution
            .iter()
            .map(|v| (v.partner.as_str(), v))
            .collect();

        assert_eq!(by_partner["partner-a"].status, "complete");
        assert_eq!(by_partner["partner-b"].status, "failed");
        assert_eq!(by_partner["partner-c"].status, "complete");
        assert_eq!(by_partner["partner-b"].confirmation["error"].as_str().unwrap(),
            "Delivery error: partner permanently unavailable");

        let ledger_view = core.ledger.list_for(id).unwrap();
        assert_eq!(ledger_view[0].attempts, 1); // A: first attempt succeeded
        assert_eq!(ledger_view[1].attempts, 3); // B: full budget
        assert_eq!(ledger_view[2].attempts, 2); // C: one timeout, one success
    }

    #[tokio::test]
    async fn test_completed_distribution_never_reverts() {
        let core = build_core(
            mock_routes(&["partner-a"]),
            fast_retry(3),
            Arc::new(CountingClient { calls: AtomicU32::new(0) }),
        );

        let id = core.store.submit(b"{}", ContentType::Json).unwrap();
        let dists = drain_until_settled(&core, id).await;
        assert_eq!(dists[0].status, DistributionStatus::Complete);

        // Extra cycles find nothing to do and change nothing
        for _ in 0..5 {
            assert_eq!(core.dispatcher.run_once().await.unwrap(), 0);
        }
        let after = core.ledger.list_for(id).unwrap();
        assert_eq!(after[0].status, DistributionStatus::Complete);
        assert_eq!(after[0].attempts, dists[0].attempts);
        assert_eq!(after[0].confirmation, dists[0].confirmation);
    }

    #[tokio::test]
    async fn test_state_machine_passes_through_in_progress() {
        let core = build_core(
            mock_routes(&["partner-a"]),
            fast_retry(3),
            Arc::new(CountingClient { calls: AtomicU32::new(0) }),
        );

        let id = core.store.submit(b"{}", ContentType::Json).unwrap();

        // Claim without processing: externally visible as in-progress
        let claimed = core.ledger.claim_pending(1).unwrap();
        assert_eq!(claimed.len(), 1);
        let doc = core.projector.project(id).unwrap();
        assert_eq!(doc.distribution[0].status, "in-progress");

        // Completing the claim lands in the terminal state
        core.ledger
            .complete_delivery(&claimed[0], serde_json::json!({"receipt": "R"}))
            .unwrap();
        let doc = core.projector.project(id).unwrap();
        assert_eq!(doc.distribution[0].status, "complete");
        assert!(doc.complete);
    }
}
