//! Core types for transaction intake and distribution tracking
//!
//! All records are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Stable wire names for the HTTP status document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Document content type accepted at intake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ContentType {
    /// ANSI ASC X12
    X12,
    /// UN/EDIFACT
    Edifact,
    /// JSON
    Json,
}

impl ContentType {
    /// Canonical MIME type
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::X12 => "application/x12",
            ContentType::Edifact => "application/edifact",
            ContentType::Json => "application/json",
        }
    }

    /// Parse from a MIME type, ignoring parameters (`; charset=...`)
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence {
            "application/x12" | "application/edi-x12" => Some(ContentType::X12),
            "application/edifact" | "application/edi-edifact" => Some(ContentType::Edifact),
            "application/json" => Some(ContentType::Json),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mime())
    }
}

/// Transport used to deliver a document to a partner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum DeliveryMethod {
    /// File staged into an SFTP dropoff spool
    Sftp,
    /// Object staged into a cloud-storage archive spool
    CloudStorage,
    /// In-process mock transport (tests, staging)
    Mock,
}

impl DeliveryMethod {
    /// Wire name used in status documents and route configuration
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryMethod::Sftp => "sftp",
            DeliveryMethod::CloudStorage => "cloud-storage",
            DeliveryMethod::Mock => "mock",
        }
    }

    /// Parse from wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sftp" => Some(DeliveryMethod::Sftp),
            "cloud-storage" => Some(DeliveryMethod::CloudStorage),
            "mock" => Some(DeliveryMethod::Mock),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Lifecycle state of a single distribution
///
/// `pending → in-progress → {complete | pending(retry) | failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum DistributionStatus {
    /// Waiting to be claimed by a dispatcher worker
    Pending = 1,
    /// Claimed under a lease, delivery in flight
    InProgress = 2,
    /// Delivered, confirmation recorded (terminal)
    Complete = 3,
    /// Retry budget exhausted or fatal error (terminal)
    Failed = 4,
}

impl DistributionStatus {
    /// Wire name used in status documents
    pub fn code(&self) -> &'static str {
        match self {
            DistributionStatus::Pending => "pending",
            DistributionStatus::InProgress => "in-progress",
            DistributionStatus::Complete => "complete",
            DistributionStatus::Failed => "failed",
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, DistributionStatus::Complete | DistributionStatus::Failed)
    }
}

impl fmt::Display for DistributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Opaque reference to payload bytes held by the transaction store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadRef(Uuid);

impl PayloadRef {
    /// Reference derived from the owning transaction id
    pub fn for_transaction(transaction_id: Uuid) -> Self {
        Self(transaction_id)
    }

    /// Storage key bytes
    pub fn as_key(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

/// Durable record of a submitted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique transaction id (UUIDv7 for time-ordered listing)
    pub transaction_id: Uuid,

    /// Reference to the stored document bytes
    pub payload_ref: PayloadRef,

    /// Declared document type
    pub content_type: ContentType,

    /// Intake timestamp
    pub created_at: DateTime<Utc>,

    /// Number of distributions created at intake
    pub distribution_count: u32,
}

/// One partner-specific delivery task derived from a transaction
///
/// Addressed by `(transaction_id, seq)`; `seq` is creation order and
/// fixes the ordering of the externally-visible distribution list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    /// Owning transaction
    pub transaction_id: Uuid,

    /// Creation order within the transaction
    pub seq: u32,

    /// Trading partner identifier
    pub partner: String,

    /// Delivery transport
    pub method: DeliveryMethod,

    /// Destination path/URI, immutable once assigned
    pub location: String,

    /// Current lifecycle state
    pub status: DistributionStatus,

    /// Serialized JSON receipt; None until a terminal transition
    pub confirmation: Option<String>,

    /// Delivery attempts made so far
    pub attempts: u32,

    /// Not claimable before this instant (persisted backoff state)
    pub next_attempt_at: Option<DateTime<Utc>>,

    /// Claim lease; an in-progress distribution past this instant is
    /// reclaimable
    pub lease_expires_at: Option<DateTime<Utc>>,

    /// Reason recorded on the failed transition
    pub failure_reason: Option<String>,

    /// Last state change
    pub updated_at: DateTime<Utc>,
}

impl Distribution {
    /// New pending distribution created at intake time
    pub fn new(
        transaction_id: Uuid,
        seq: u32,
        partner: impl Into<String>,
        method: DeliveryMethod,
        location: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id,
            seq,
            partner: partner.into(),
            method,
            location: location.into(),
            status: DistributionStatus::Pending,
            confirmation: None,
            attempts: 0,
            next_attempt_at: None,
            lease_expires_at: None,
            failure_reason: None,
            updated_at: now,
        }
    }

    /// Storage key: transaction_id (16 bytes) followed by seq (4 bytes BE)
    pub fn key(transaction_id: Uuid, seq: u32) -> [u8; 20] {
        let mut key = [0u8; 20];
        key[..16].copy_from_slice(transaction_id.as_bytes());
        key[16..].copy_from_slice(&seq.to_be_bytes());
        key
    }

    /// Terminal distributions admit no further transitions
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Configured destination for one trading partner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerRoute {
    /// Trading partner identifier
    pub partner: String,

    /// Delivery transport
    pub method: DeliveryMethod,

    /// Destination template; `{transaction_id}` expands at intake
    pub location_template: String,
}

impl PartnerRoute {
    /// Render the destination for a concrete transaction
    pub fn render_location(&self, transaction_id: Uuid) -> String {
        self.location_template
            .replace("{transaction_id}", &transaction_id.to_string())
    }
}

/// Externally-visible view of one distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionView {
    /// Trading partner identifier
    pub partner: String,
    /// Delivery transport wire name
    pub method: String,
    /// Lifecycle state wire name
    pub status: String,
    /// Destination path/URI
    pub location: String,
    /// Delivery receipt, null until a terminal transition
    pub confirmation: serde_json::Value,
}

/// Externally-visible status of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDocument {
    /// True iff every distribution completed successfully
    pub complete: bool,
    /// True iff any distribution reached the failed state
    pub has_failures: bool,
    /// Polling URL for this transaction
    pub status_url: String,
    /// Distributions in creation order
    pub distribution: Vec<DistributionView>,
}
