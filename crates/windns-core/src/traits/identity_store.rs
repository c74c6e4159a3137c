// # Identity Store Trait
//
// Defines the interface for persisting which records are under management.
//
// ## Purpose
//
// Identity is the only state that survives between reconciliation calls. The store maps
// a caller-chosen resource address (e.g. "windns.web") to the identity assigned by a
// successful Create, together with the record that was declared at the time.
//
// ## Implementations
//
// - In-memory: `MemoryIdentityStore`
// - File-based: `FileIdentityStore` (versioned JSON with crash recovery)

use async_trait::async_trait;

use crate::record::DnsRecord;

/// Tracked state for one managed record
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredIdentity {
    /// Identity assigned by the last successful Create or Read
    pub id: String,
    /// The record as declared when the identity was assigned
    pub record: DnsRecord,
    /// Timestamp of the last assignment
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl StoredIdentity {
    /// Create a stored identity for `record`, stamped now
    pub fn new(id: impl Into<String>, record: DnsRecord) -> Self {
        Self {
            id: id.into(),
            record,
            last_updated: chrono::Utc::now(),
        }
    }
}

/// Trait for identity store implementations
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Get the tracked identity for a resource address
    ///
    /// - `Ok(Some(StoredIdentity))`: the resource is tracked
    /// - `Ok(None)`: the resource is not tracked
    async fn get(&self, address: &str) -> Result<Option<StoredIdentity>, crate::Error>;

    /// Create or replace the tracked identity for a resource address
    async fn set(&self, address: &str, identity: &StoredIdentity) -> Result<(), crate::Error>;

    /// Stop tracking a resource address (no-op if it was not tracked)
    async fn remove(&self, address: &str) -> Result<(), crate::Error>;

    /// List all tracked resource addresses
    async fn list(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
