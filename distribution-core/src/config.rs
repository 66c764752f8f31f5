//! Configuration for the distribution core

use crate::retry::RetryConfig;
use crate::types::{DeliveryMethod, PartnerRoute};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Distribution core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// External base URL used to render status_url values
    pub public_base_url: String,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Dispatcher configuration
    pub dispatcher: DispatcherConfig,

    /// Retry policy for failed deliveries
    pub retry: RetryConfig,

    /// Delivery collaborator configuration
    pub delivery: DeliveryConfig,

    /// Partner routing table; each submitted transaction gets one
    /// distribution per route
    pub routes: Vec<PartnerRoute>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/distribution"),
            service_name: "distribution-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            rocksdb: RocksDbConfig::default(),
            dispatcher: DispatcherConfig::default(),
            retry: RetryConfig::default(),
            delivery: DeliveryConfig::default(),
            routes: default_routes(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
        }
    }
}

/// Dispatcher worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of concurrent worker tasks
    pub workers: usize,

    /// Maximum distributions claimed per cycle
    pub claim_batch_size: usize,

    /// Idle poll interval (milliseconds)
    pub poll_interval_ms: u64,

    /// Claim lease duration; an in-progress distribution whose lease
    /// expired is reclaimable (seconds)
    pub lease_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            claim_batch_size: 16,
            poll_interval_ms: 500,
            lease_timeout_secs: 60,
        }
    }
}

/// Delivery collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Local spool an external SFTP transport sweeps
    pub sftp_dropoff_dir: PathBuf,

    /// Local spool an external cloud-storage sync sweeps
    pub cloud_archive_dir: PathBuf,

    /// Simulated latency for the mock transport (milliseconds)
    pub mock_latency_ms: u64,

    /// Success rate for the mock transport (1.0 = always succeeds)
    pub mock_success_rate: f64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            sftp_dropoff_dir: PathBuf::from("./spool/sftp"),
            cloud_archive_dir: PathBuf::from("./spool/cloud"),
            mock_latency_ms: 10,
            mock_success_rate: 1.0,
        }
    }
}

/// Default routing table matching the destinations the service has
/// historically shipped with
fn default_routes() -> Vec<PartnerRoute> {
    vec![
        PartnerRoute {
            partner: "trading_partner_1".to_string(),
            method: DeliveryMethod::Sftp,
            location_template: "/var/edi/dropoff/transaction/{transaction_id}.edi".to_string(),
        },
        PartnerRoute {
            partner: "source-archive".to_string(),
            method: DeliveryMethod::CloudStorage,
            location_template: "s3://bucket-name/archive/{transaction_id}.edi".to_string(),
        },
        PartnerRoute {
            partner: "result-archive".to_string(),
            method: DeliveryMethod::CloudStorage,
            location_template: "s3://bucket-name/results/{transaction_id}.edi".to_string(),
        },
    ]
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables, starting from defaults or an
    /// optional config file named by `NANITES_CONFIG`
    pub fn from_env() -> crate::Result<Self> {
        let mut config = match std::env::var("NANITES_CONFIG") {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };

        if let Ok(data_dir) = std::env::var("NANITES_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(base_url) = std::env::var("NANITES_BASE_URL") {
            config.public_base_url = base_url;
        }

        if let Ok(dir) = std::env::var("NANITES_SFTP_DROPOFF_DIR") {
            config.delivery.sftp_dropoff_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("NANITES_CLOUD_ARCHIVE_DIR") {
            config.delivery.cloud_archive_dir = PathBuf::from(dir);
        }

        if let Ok(workers) = std::env::var("NANITES_DISPATCHER_WORKERS") {
            config.dispatcher.workers = workers
                .parse()
                .map_err(|_| crate::Error::Config(format!("Invalid worker count: {}", workers)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the core cannot operate with
    pub fn validate(&self) -> crate::Result<()> {
        if self.routes.is_empty() {
            return Err(crate::Error::Config(
                "at least one partner route is required".to_string(),
            ));
        }

        if self.dispatcher.workers == 0 {
            return Err(crate::Error::Config("dispatcher.workers must be > 0".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(crate::Error::Config("retry.max_attempts must be > 0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.delivery.mock_success_rate) {
            return Err(crate::Error::Config(
                "delivery.mock_success_rate must be within [0, 1]".to_string(),
            ));
        }

        Ok(())
    }
}
