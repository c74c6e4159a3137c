//! Record reconciler
//!
//! The ResourceReconciler drives one declared record through its external lifecycle:
//!
//! ```text
//!          create (upsert)          delete
//!   Absent ──────────────▶ Present ────────▶ Absent
//!     ▲                          │
//!     └──── read: not found ─────┘
//! ```
//!
//! There is no updating state: Create is an upsert, so re-running it against an existing
//! record modifies the record in place. Zone, name and type never change for a tracked
//! identity; changing them is a delete of one record and a create of another.
//!
//! ## Locking
//!
//! Create and Delete hold the target's [`FileLock`] for exactly one remote call. Read does
//! not lock and may observe a record mid-mutation.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::command::{CommandBuilder, RECORD_FOUND, RECORD_MODIFIED, Script};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::lock::FileLock;
use crate::record::DnsRecord;
use crate::traits::RemoteExecutor;

/// A declared record together with the identity tracked for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRecord {
    /// The declared record
    pub record: DnsRecord,

    id: Option<String>,
}

impl TrackedRecord {
    /// A record with no identity yet (not created)
    pub fn new(record: DnsRecord) -> Self {
        Self { record, id: None }
    }

    /// A record whose identity was assigned earlier (e.g. loaded from an identity store)
    pub fn with_id(record: DnsRecord, id: impl Into<String>) -> Self {
        Self {
            record,
            id: Some(id.into()),
        }
    }

    /// The tracked identity, if the record is believed to exist
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn assign_id(&mut self) {
        self.id = Some(self.record.identity());
    }

    fn clear_id(&mut self) {
        self.id = None;
    }
}

/// Whether a record exists on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

/// Which branch of the upsert script ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The record did not exist and was added
    Created,
    /// The record existed and was replaced in place
    Modified,
}

/// Result of [`ResourceReconciler::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The record was already present; nothing was sent
    Unchanged,
    /// The record was added
    Created,
    /// The record was modified in place (it appeared between probe and upsert)
    Modified,
}

impl From<UpsertOutcome> for ApplyOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Created => ApplyOutcome::Created,
            UpsertOutcome::Modified => ApplyOutcome::Modified,
        }
    }
}

/// Create / Read / Delete over declared records
///
/// The reconciler owns no session state; the [`ClientConfig`] is passed into every call.
/// It performs no retries: a failed Create leaves the identity unset and a failed Delete
/// leaves it intact, so re-running the operation is the retry path.
#[derive(Clone)]
pub struct ResourceReconciler {
    executor: Arc<dyn RemoteExecutor>,
}

impl ResourceReconciler {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    /// Converge the server to the declared record.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] before any lock or remote call
    /// - [`Error::LockAcquisition`] before any remote call
    /// - any error from the executor, verbatim
    pub async fn create(
        &self,
        resource: &mut TrackedRecord,
        config: &ClientConfig,
    ) -> Result<UpsertOutcome> {
        let script = CommandBuilder::new(config).upsert(&resource.record)?;
        let identity = resource.record.identity();

        let output = self.execute_locked(config, &script).await?;

        let outcome = if output.contains(RECORD_MODIFIED) {
            UpsertOutcome::Modified
        } else {
            UpsertOutcome::Created
        };

        resource.assign_id();
        info!(identity = %identity, outcome = ?outcome, "Record created");
        Ok(outcome)
    }

    /// Refresh the tracked identity from the server. Never mutates remote state.
    ///
    /// A record the server reports as not found is `Ok(Presence::Absent)` with the
    /// identity cleared; any other failure is an error and leaves the identity untouched.
    pub async fn read(
        &self,
        resource: &mut TrackedRecord,
        config: &ClientConfig,
    ) -> Result<Presence> {
        let script = CommandBuilder::new(config).probe(&resource.record)?;
        let identity = resource.record.identity();

        let presence = match self.executor.execute(config, &script).await {
            Ok(output) if output.contains(RECORD_FOUND) => Presence::Present,
            Ok(_) => Presence::Absent,
            Err(Error::NotFound(detail)) => {
                debug!(identity = %identity, "Probe reported not found: {}", detail);
                Presence::Absent
            }
            Err(e) => return Err(e),
        };

        match presence {
            Presence::Present => resource.assign_id(),
            Presence::Absent => {
                if resource.id().is_some() {
                    info!(identity = %identity, "Record no longer exists on the server");
                }
                resource.clear_id();
            }
        }

        debug!(identity = %identity, presence = ?presence, "Record read");
        Ok(presence)
    }

    /// Remove the record from the server.
    ///
    /// A record the server reports as already absent counts as deleted. On any other
    /// failure the identity is kept so the delete can be retried.
    pub async fn delete(&self, resource: &mut TrackedRecord, config: &ClientConfig) -> Result<()> {
        let script = CommandBuilder::new(config).remove(&resource.record)?;
        let identity = resource.record.identity();

        match self.execute_locked(config, &script).await {
            Ok(_) => {}
            Err(Error::NotFound(detail)) => {
                info!(identity = %identity, "Record already absent: {}", detail);
            }
            Err(e) => return Err(e),
        }

        resource.clear_id();
        info!(identity = %identity, "Record deleted");
        Ok(())
    }

    /// Read, then Create if the record is absent.
    pub async fn apply(
        &self,
        resource: &mut TrackedRecord,
        config: &ClientConfig,
    ) -> Result<ApplyOutcome> {
        // Validate up front so an invalid declaration never reaches the probe either
        resource.record.validate()?;

        match self.read(resource, config).await? {
            Presence::Present => {
                debug!(identity = %resource.record.identity(), "Record present, nothing to do");
                Ok(ApplyOutcome::Unchanged)
            }
            Presence::Absent => Ok(self.create(resource, config).await?.into()),
        }
    }

    // Holds the target's lock for exactly one remote call and releases it whatever
    // the call returned.
    async fn execute_locked(&self, config: &ClientConfig, script: &Script) -> Result<String> {
        let guard = FileLock::for_config(config).acquire().await?;

        debug!(
            executor = self.executor.executor_name(),
            operation = %script.operation,
            "Executing under lock"
        );
        let result = self.executor.execute(config, script).await;

        if let Err(e) = guard.release().await {
            warn!("{}", e);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockSettings;
    use crate::record::RecordType;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Replays canned results in order and records scripts
    struct CannedExecutor {
        results: Mutex<Vec<Result<String>>>,
        scripts: Mutex<Vec<Script>>,
    }

    impl CannedExecutor {
        fn new(results: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into_iter().rev().collect()),
                scripts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.scripts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RemoteExecutor for CannedExecutor {
        async fn execute(&self, _config: &ClientConfig, script: &Script) -> Result<String> {
            self.scripts.lock().unwrap().push(script.clone());
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Error::execution("no canned result")))
        }

        fn executor_name(&self) -> &'static str {
            "canned"
        }
    }

    fn config(dir: &std::path::Path) -> ClientConfig {
        ClientConfig::new("admin", "dc01")
            .with_password("secret")
            .with_lock(LockSettings::at(dir.join("dc01.lock")).without_delays())
    }

    #[tokio::test]
    async fn create_reports_modified_branch() {
        let dir = tempdir().unwrap();
        let executor = CannedExecutor::new(vec![Ok("RECORD_MODIFIED".into())]);
        let reconciler = ResourceReconciler::new(executor.clone());

        let mut resource = TrackedRecord::new(DnsRecord::a("corp.local", "svc1", "10.0.0.5"));
        let outcome = reconciler.create(&mut resource, &config(dir.path())).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Modified);
        assert_eq!(resource.id(), Some("corp.local_svc1_A"));
    }

    #[tokio::test]
    async fn read_without_sentinel_is_absent() {
        let dir = tempdir().unwrap();
        let executor = CannedExecutor::new(vec![Ok(String::new())]);
        let reconciler = ResourceReconciler::new(executor);

        let record = DnsRecord::new("corp.local", "svc1", RecordType::A);
        let mut resource = TrackedRecord::with_id(record, "corp.local_svc1_A");
        let presence = reconciler.read(&mut resource, &config(dir.path())).await.unwrap();

        assert_eq!(presence, Presence::Absent);
        assert_eq!(resource.id(), None);
    }

    #[tokio::test]
    async fn read_failure_keeps_identity() {
        let dir = tempdir().unwrap();
        let executor = CannedExecutor::new(vec![Err(Error::execution(
            "WinRM cannot complete the operation",
        ))]);
        let reconciler = ResourceReconciler::new(executor);

        let record = DnsRecord::new("corp.local", "svc1", RecordType::A);
        let mut resource = TrackedRecord::with_id(record, "corp.local_svc1_A");
        let err = reconciler.read(&mut resource, &config(dir.path())).await.unwrap_err();

        assert!(err.to_string().contains("WinRM cannot complete the operation"));
        assert_eq!(resource.id(), Some("corp.local_svc1_A"));
    }

    #[tokio::test]
    async fn delete_of_absent_record_succeeds() {
        let dir = tempdir().unwrap();
        let executor = CannedExecutor::new(vec![Err(Error::not_found("ObjectNotFound"))]);
        let reconciler = ResourceReconciler::new(executor);

        let record = DnsRecord::new("corp.local", "svc1", RecordType::A);
        let mut resource = TrackedRecord::with_id(record, "corp.local_svc1_A");
        reconciler.delete(&mut resource, &config(dir.path())).await.unwrap();
        assert_eq!(resource.id(), None);
    }

    #[tokio::test]
    async fn apply_skips_create_when_present() {
        let dir = tempdir().unwrap();
        let executor = CannedExecutor::new(vec![Ok("RECORD_FOUND".into())]);
        let reconciler = ResourceReconciler::new(executor.clone());

        let mut resource = TrackedRecord::new(DnsRecord::a("corp.local", "svc1", "10.0.0.5"));
        let outcome = reconciler.apply(&mut resource, &config(dir.path())).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(executor.calls(), 1);
        assert_eq!(resource.id(), Some("corp.local_svc1_A"));
    }

    #[tokio::test]
    async fn apply_creates_when_absent() {
        let dir = tempdir().unwrap();
        let executor = CannedExecutor::new(vec![Ok(String::new()), Ok("RECORD_CREATED".into())]);
        let reconciler = ResourceReconciler::new(executor.clone());

        let mut resource = TrackedRecord::new(DnsRecord::a("corp.local", "svc1", "10.0.0.5"));
        let outcome = reconciler.apply(&mut resource, &config(dir.path())).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::Created);
        assert_eq!(executor.calls(), 2);
    }
}
