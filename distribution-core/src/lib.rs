//! Nanites Distribution Core
//!
//! Asynchronous transaction intake and multi-destination distribution
//! tracking for EDI documents.
//!
//! # Architecture
//!
//! - **Transaction Store**: durable record + payload per submitted
//!   transaction, committed atomically with its distribution set
//! - **Distribution Ledger**: per-partner delivery records with leased,
//!   at-most-once claiming and compare-and-set transitions
//! - **Dispatcher**: worker pool delivering claimed distributions via
//!   method-keyed collaborators, with persisted retry backoff
//! - **Status Projector**: on-demand composition of store and ledger
//!   into the polling document
//!
//! # Invariants
//!
//! - A transaction is never visible without its full distribution set
//! - A distribution is claimed by at most one worker at a time
//! - Terminal distribution states are never left
//! - Projections always reflect the latest ledger write

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod projector;
pub mod retry;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports
pub use config::Config;
pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use error::{Error, Result};
pub use ledger::DistributionLedger;
pub use metrics::Metrics;
pub use projector::StatusProjector;
pub use retry::{RetryConfig, RetryPolicy};
pub use storage::Storage;
pub use store::TransactionStore;
pub use types::{
    ContentType, DeliveryMethod, Distribution, DistributionStatus, DistributionView,
    PartnerRoute, PayloadRef, StatusDocument, TransactionRecord,
};
