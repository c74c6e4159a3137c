// # File Identity Store
//
// File-based implementation of IdentityStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write to a per-writer `<path>.<pid>-<n>.tmp`, then rename over the state file
// - Backup: the previous state file is copied to `<path>.backup` before each write
// - Recovery: a state file that fails to parse is replaced from the backup
//
// ## Concurrent Writers
//
// Several processes may share one state file. Each mutation holds the advisory lock
// `<path>.lock`, re-reads the file, applies its single change to what is on disk and
// writes the result back, so changes made by other writers are preserved.
//
// ## File Format
//
// ```json
// {
//   "version": "1",
//   "resources": {
//     "windns.svc1": {
//       "id": "corp.local_svc1_A",
//       "record": {
//         "zone_name": "corp.local",
//         "record_name": "svc1",
//         "record_type": "A",
//         "ipv4address": "10.0.0.5"
//       },
//       "last_updated": "2026-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::LockSettings;
use crate::lock::FileLock;
use crate::traits::identity_store::{IdentityStore, StoredIdentity};

/// State file format version
const STATE_FILE_VERSION: &str = "1";

/// Seconds after which an abandoned state lock is reclaimed
const STATE_LOCK_LEASE_SECS: u64 = 30;

type Resources = BTreeMap<String, StoredIdentity>;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// File-based identity store with crash recovery
///
/// Every mutation is written through to disk before the call returns. Reads are served
/// from the view loaded at [`open`](Self::open) and refreshed by each mutation.
///
/// # Example
///
/// ```rust,no_run
/// use windns_core::{DnsRecord, FileIdentityStore, IdentityStore, StoredIdentity};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileIdentityStore::open("/var/lib/windns/state.json").await?;
///
///     let record = DnsRecord::a("corp.local", "svc1", "10.0.0.5");
///     store.set("windns.svc1", &StoredIdentity::new(record.identity(), record)).await?;
///
///     assert!(store.get("windns.svc1").await?.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileIdentityStore {
    path: PathBuf,
    lock: FileLock,
    resources: Arc<RwLock<Resources>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    resources: Resources,
}

impl FileIdentityStore {
    /// Open or create a file identity store
    ///
    /// Creates parent directories as needed. A missing state file is an empty store.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_store(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let resources = Self::load_with_recovery(&path).await?;

        let lock = FileLock::new(LockSettings {
            max_jitter_ms: 0,
            poll_interval_ms: 10,
            settle_ms: 0,
            stale_after_secs: Some(STATE_LOCK_LEASE_SECS),
            max_wait_secs: Some(STATE_LOCK_LEASE_SECS * 2),
            ..LockSettings::at(Self::sibling_path(&path, "lock"))
        });

        tracing::debug!(path = %path.display(), "Opened identity state file");

        Ok(Self {
            path,
            lock,
            resources: Arc::new(RwLock::new(resources)),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path) -> Result<Resources, Error> {
        match Self::load(path).await {
            Ok(resources) => {
                tracing::debug!(resources = resources.len(), "Loaded identity state");
                Ok(resources)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    path = %path.display(),
                    "State file is corrupted ({}), attempting recovery from backup",
                    e
                );

                let backup = Self::backup_path(path);
                if !backup.exists() {
                    tracing::warn!("No backup file found, starting with empty state");
                    return Ok(Resources::new());
                }

                match Self::load(&backup).await {
                    Ok(resources) => {
                        if let Err(err) = fs::copy(&backup, path).await {
                            tracing::error!("Failed to restore state file from backup: {}", err);
                        } else {
                            tracing::info!(
                                resources = resources.len(),
                                "Recovered identity state from backup"
                            );
                        }
                        Ok(resources)
                    }
                    Err(err) => {
                        tracing::error!(
                            "Backup also unreadable ({}), starting with empty state",
                            err
                        );
                        Ok(Resources::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Resources, Error> {
        if !path.exists() {
            return Ok(Resources::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::state_store(format!("Failed to read state file {}: {}", path.display(), e))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                expected = STATE_FILE_VERSION,
                found = %state_file.version,
                "State file version mismatch, loading anyway"
            );
        }

        Ok(state_file.resources)
    }

    /// Apply `change` to the state on disk under the state lock.
    ///
    /// `change` returns `false` when it left the map untouched; nothing is written then.
    async fn update<F>(&self, change: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Resources) -> bool + Send,
    {
        let guard = self.lock.acquire().await?;

        let result = async {
            let mut resources = Self::load_with_recovery(&self.path).await?;
            if change(&mut resources) {
                self.write(&resources).await?;
            }
            Ok::<_, Error>(resources)
        }
        .await;

        if let Err(e) = guard.release().await {
            tracing::warn!("{}", e);
        }

        *self.resources.write().await = result?;
        Ok(())
    }

    async fn write(&self, resources: &Resources) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(&StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            resources: resources.clone(),
        })?;

        let temp = self.temp_path();
        let written = async {
            let mut file = fs::File::create(&temp).await.map_err(|e| {
                Error::state_store(format!("Failed to create {}: {}", temp.display(), e))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!("Failed to write {}: {}", temp.display(), e))
            })?;
            file.sync_all().await.map_err(|e| {
                Error::state_store(format!("Failed to sync {}: {}", temp.display(), e))
            })
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create state backup: {}", e);
            }
        }

        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp.display(),
                self.path.display(),
                e
            )));
        }

        tracing::trace!(path = %self.path.display(), "Identity state written");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::sibling_path(&self.path, &format!("{}-{}.tmp", std::process::id(), n))
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn get(&self, address: &str) -> Result<Option<StoredIdentity>, Error> {
        let guard = self.resources.read().await;
        Ok(guard.get(address).cloned())
    }

    async fn set(&self, address: &str, identity: &StoredIdentity) -> Result<(), Error> {
        let address = address.to_string();
        let identity = identity.clone();
        self.update(move |resources| {
            resources.insert(address, identity);
            true
        })
        .await
    }

    async fn remove(&self, address: &str) -> Result<(), Error> {
        self.update(|resources| resources.remove(address).is_some()).await
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let guard = self.resources.read().await;
        Ok(guard.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Mutations are written through
        Ok(())
    }
}
