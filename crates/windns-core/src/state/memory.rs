// # Memory Identity Store
//
// In-memory implementation of IdentityStore.
//
// Tracked identities are lost when the process exits. Useful for tests and for
// embedding the reconciler in a host that persists state itself.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::identity_store::{IdentityStore, StoredIdentity};

/// In-memory identity store
///
/// Stores all identities in a HashMap protected by a RwLock.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    inner: Arc<RwLock<HashMap<String, StoredIdentity>>>,
}

impl MemoryIdentityStore {
    /// Create a new empty memory identity store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of tracked resources
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get(&self, address: &str) -> Result<Option<StoredIdentity>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(address).cloned())
    }

    async fn set(&self, address: &str, identity: &StoredIdentity) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(address.to_string(), identity.clone());
        Ok(())
    }

    async fn remove(&self, address: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.remove(address);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DnsRecord;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryIdentityStore::new();
        assert!(store.is_empty().await);

        let record = DnsRecord::a("corp.local", "svc1", "10.0.0.5");
        let stored = StoredIdentity::new(record.identity(), record);
        store.set("windns.svc1", &stored).await.unwrap();

        assert_eq!(store.len().await, 1);
        let retrieved = store.get("windns.svc1").await.unwrap().unwrap();
        assert_eq!(retrieved.id, "corp.local_svc1_A");

        store.remove("windns.svc1").await.unwrap();
        assert!(store.get("windns.svc1").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_list() {
        let store = MemoryIdentityStore::new();

        let a = DnsRecord::a("corp.local", "svc1", "10.0.0.5");
        let c = DnsRecord::cname("corp.local", "www", "svc1.corp.local");
        store.set("windns.svc1", &StoredIdentity::new(a.identity(), a)).await.unwrap();
        store.set("windns.www", &StoredIdentity::new(c.identity(), c)).await.unwrap();

        let mut addresses = store.list().await.unwrap();
        addresses.sort();
        assert_eq!(addresses, vec!["windns.svc1", "windns.www"]);
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryIdentityStore::new();
        let other = store.clone();

        let record = DnsRecord::ptr("0.0.10.in-addr.arpa", "5", "svc1.corp.local");
        let stored = StoredIdentity::new(record.identity(), record);
        tokio_test::block_on(store.set("windns.ptr", &stored)).unwrap();

        let seen = tokio_test::block_on(other.get("windns.ptr")).unwrap();
        assert_eq!(seen.map(|s| s.id).as_deref(), Some("0.0.10.in-addr.arpa_5_PTR"));
    }
}
