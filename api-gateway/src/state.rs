//! Application context - the wiring between HTTP handlers and the core
//!
//! Constructed once at startup and handed to handlers through actix
//! `web::Data`; nothing hangs off module-level globals.

use distribution_core::delivery::DeliveryRouter;
use distribution_core::{
    Config, Dispatcher, DistributionLedger, Metrics, RetryPolicy, StatusProjector, Storage,
    TransactionStore,
};
use std::sync::Arc;
use std::time::Duration;

/// Shared handles the HTTP layer works against
#[derive(Clone)]
pub struct AppContext {
    /// Transaction intake and lookup
    pub store: Arc<TransactionStore>,

    /// Status document projection
    pub projector: Arc<StatusProjector>,

    /// Metrics registry for the exposition endpoint
    pub metrics: Metrics,

    /// Service name reported by /health
    pub service_name: String,

    /// Service version reported by /health
    pub service_version: String,

    /// Base URL for rendering absolute links
    pub public_base_url: String,
}

impl AppContext {
    /// Build the full core wiring with the standard delivery clients
    pub fn build(config: &Config) -> distribution_core::Result<(Self, Arc<Dispatcher>)> {
        let router = Arc::new(DeliveryRouter::from_config(&config.delivery));
        Self::build_with_router(config, router)
    }

    /// Build the core wiring with an injected delivery router
    pub fn build_with_router(
        config: &Config,
        router: Arc<DeliveryRouter>,
    ) -> distribution_core::Result<(Self, Arc<Dispatcher>)> {
        config.validate()?;

        let storage = Arc::new(Storage::open(config)?);
        let metrics = Metrics::default();

        let store = Arc::new(TransactionStore::new(
            storage.clone(),
            config.routes.clone(),
            metrics.clone(),
        ));
        let ledger = Arc::new(DistributionLedger::new(
            storage,
            Duration::from_secs(config.dispatcher.lease_timeout_secs),
        ));
        let projector = Arc::new(StatusProjector::new(
            store.clone(),
            ledger.clone(),
            config.public_base_url.clone(),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            ledger,
            router,
            RetryPolicy::new(config.retry.clone()),
            config.dispatcher.clone(),
            metrics.clone(),
        ));

        let context = Self {
            store,
            projector,
            metrics,
            service_name: config.service_name.clone(),
            service_version: config.service_version.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        };

        Ok((context, dispatcher))
    }
}
