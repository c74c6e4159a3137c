// # Lock Coordinator
//
// Advisory lock that serializes mutating remote calls against one target.
//
// ## Protocol
//
// The lock is a marker file at a well-known path, one per configured target.
//
// 1. Sleep a random jitter (up to `max_jitter_ms`) to spread out competitors
// 2. Poll while the marker exists, sleeping `poll_interval_ms` between checks
// 3. Once absent, sleep `settle_ms`
// 4. Create the marker with `create_new`; losing that race goes back to step 2
//
// The holder removes the marker when its remote call returns, success or failure.
//
// ## Abandoned markers
//
// The marker records the holder's PID and acquisition time. A marker older than
// `stale_after_secs` is treated as left behind by a crashed holder and removed.
// Reclaiming first renames the marker to a private name and only deletes it if it is
// still the marker that was judged stale; a waiter racing another reclaimer can
// therefore never delete a live holder's marker.
// With the lease disabled, an abandoned marker blocks the target until removed by hand.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::{ClientConfig, LockSettings};
use crate::error::{Error, Result};

/// Contents of the marker file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockMarker {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// A marker as observed on disk
#[derive(Debug, Clone, PartialEq, Eq)]
struct MarkerSnapshot {
    content: Vec<u8>,
    modified: SystemTime,
}

impl MarkerSnapshot {
    // Prefers the recorded acquisition time; falls back to the file's mtime for a
    // marker that is still being written or was not written by us.
    fn age(&self) -> Duration {
        if let Ok(marker) = serde_json::from_slice::<LockMarker>(&self.content) {
            return (Utc::now() - marker.acquired_at).to_std().unwrap_or_default();
        }
        SystemTime::now().duration_since(self.modified).unwrap_or_default()
    }
}

/// Advisory file lock for one remote target
#[derive(Debug, Clone)]
pub struct FileLock {
    settings: LockSettings,
}

impl FileLock {
    pub fn new(settings: LockSettings) -> Self {
        Self { settings }
    }

    /// The lock for the target described by `config`
    pub fn for_config(config: &ClientConfig) -> Self {
        Self::new(config.lock.clone())
    }

    /// Marker file path
    pub fn path(&self) -> &Path {
        &self.settings.path
    }

    /// Returns `true` if some holder currently owns the marker
    pub async fn is_held(&self) -> bool {
        fs::try_exists(self.path()).await.unwrap_or(false)
    }

    /// Wait for the marker to clear and take it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockAcquisition`] if the marker cannot be created or inspected,
    /// or if `max_wait_secs` elapses first. No remote call may be made in that case.
    pub async fn acquire(&self) -> Result<LockGuard> {
        let started = Instant::now();
        let path = self.path();

        let jitter = self.jitter();
        if !jitter.is_zero() {
            tokio::time::sleep(jitter).await;
        }

        loop {
            self.wait_until_clear(started).await?;

            let settle = self.settings.settle();
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
            {
                Ok(file) => {
                    self.write_marker(file).await?;
                    tracing::debug!(
                        path = %path.display(),
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Lock acquired"
                    );
                    return Ok(LockGuard {
                        path: path.to_path_buf(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!(path = %path.display(), "Lost lock race, waiting again");
                }
                Err(e) => {
                    return Err(Error::lock(format!(
                        "failed to create lock marker {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }
    }

    fn jitter(&self) -> Duration {
        let max = self.settings.max_jitter();
        if max.is_zero() {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max.as_millis() as u64))
    }

    async fn wait_until_clear(&self, started: Instant) -> Result<()> {
        let path = self.path();

        loop {
            let exists = fs::try_exists(path).await.map_err(|e| {
                Error::lock(format!("failed to inspect lock marker {}: {}", path.display(), e))
            })?;
            if !exists {
                return Ok(());
            }

            if self.reclaim_if_stale().await {
                continue;
            }

            if let Some(max_wait) = self.settings.max_wait() {
                if started.elapsed() >= max_wait {
                    return Err(Error::lock(format!(
                        "timed out after {}s waiting for {}",
                        max_wait.as_secs(),
                        path.display()
                    )));
                }
            }

            tracing::trace!(path = %path.display(), "Lock held, polling");
            tokio::time::sleep(self.settings.poll_interval()).await;
        }
    }

    /// Remove the marker if its lease has expired. Returns `true` if it was removed.
    async fn reclaim_if_stale(&self) -> bool {
        let Some(stale_after) = self.settings.stale_after() else {
            return false;
        };

        let Some(snapshot) = self.snapshot().await else {
            return false;
        };
        if snapshot.age() <= stale_after {
            return false;
        }

        self.remove_if_unchanged(&snapshot).await
    }

    async fn snapshot(&self) -> Option<MarkerSnapshot> {
        let content = fs::read(self.path()).await.ok()?;
        let modified = fs::metadata(self.path()).await.ok()?.modified().ok()?;
        Some(MarkerSnapshot { content, modified })
    }

    // Moves the marker aside before deciding, so a marker created after `observed` was
    // taken is never deleted. A marker that turns out to differ is linked back in place.
    async fn remove_if_unchanged(&self, observed: &MarkerSnapshot) -> bool {
        let path = self.path();
        let tombstone = self.tombstone_path();

        match fs::rename(path, &tombstone).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return true,
            Err(e) => {
                tracing::warn!("Failed to move abandoned lock marker aside: {}", e);
                return false;
            }
        }

        let taken = match fs::metadata(&tombstone).await.and_then(|m| m.modified()) {
            Ok(modified) => fs::read(&tombstone)
                .await
                .ok()
                .map(|content| MarkerSnapshot { content, modified }),
            Err(_) => None,
        };

        if taken.as_ref() != Some(observed) {
            tracing::debug!(
                path = %path.display(),
                "Lock marker replaced while reclaiming, restoring"
            );
            if let Err(e) = fs::hard_link(&tombstone, path).await {
                tracing::warn!("Failed to restore lock marker: {}", e);
            }
            let _ = fs::remove_file(&tombstone).await;
            return false;
        }

        tracing::warn!(
            path = %path.display(),
            age_secs = observed.age().as_secs(),
            "Removed abandoned lock marker"
        );
        if let Err(e) = fs::remove_file(&tombstone).await {
            tracing::warn!(
                "Failed to delete abandoned lock marker {}: {}",
                tombstone.display(),
                e
            );
        }
        true
    }

    fn tombstone_path(&self) -> PathBuf {
        let mut name = self.path().as_os_str().to_os_string();
        name.push(format!(
            ".{}-{:x}.stale",
            std::process::id(),
            rand::rng().random::<u64>()
        ));
        PathBuf::from(name)
    }

    async fn write_marker(&self, mut file: fs::File) -> Result<()> {
        let marker = LockMarker {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let written = async {
            file.write_all(&serde_json::to_vec(&marker)?).await?;
            file.flush().await?;
            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(self.path()).await;
            return Err(Error::lock(format!(
                "failed to write lock marker {}: {}",
                self.path().display(),
                e
            )));
        }
        Ok(())
    }
}

/// A held lock. Release it with [`release`](Self::release) once the remote call returns.
///
/// Dropping an unreleased guard removes the marker synchronously.
#[derive(Debug)]
#[must_use = "dropping the guard releases the lock immediately"]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the marker
    pub async fn release(mut self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                self.released = true;
                tracing::debug!(path = %self.path.display(), "Lock released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.released = true;
                tracing::warn!(path = %self.path.display(), "Lock marker already gone at release");
                Ok(())
            }
            Err(e) => Err(Error::lock(format!(
                "failed to remove lock marker {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Lock released on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                "Failed to remove lock marker on drop: {}",
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn settings(dir: &Path) -> LockSettings {
        LockSettings::at(dir.join("target.lock")).without_delays()
    }

    #[tokio::test]
    async fn acquire_creates_marker_and_release_removes_it() {
        let dir = tempdir().unwrap();
        let lock = FileLock::new(settings(dir.path()));

        let guard = lock.acquire().await.unwrap();
        assert!(lock.is_held().await);

        let content = std::fs::read_to_string(guard.path()).unwrap();
        assert!(content.contains(&format!("\"pid\":{}", std::process::id())));

        guard.release().await.unwrap();
        assert!(!lock.is_held().await);
    }

    #[tokio::test]
    async fn dropping_guard_releases_lock() {
        let dir = tempdir().unwrap();
        let lock = FileLock::new(settings(dir.path()));

        {
            let _guard = lock.acquire().await.unwrap();
            assert!(lock.is_held().await);
        }
        assert!(!lock.is_held().await);
    }

    #[tokio::test]
    async fn second_acquirer_waits_for_release() {
        let dir = tempdir().unwrap();
        let lock = Arc::new(FileLock::new(settings(dir.path())));

        let first = lock.acquire().await.unwrap();

        let contender = Arc::clone(&lock);
        let waiter = tokio::spawn(async move {
            let guard = contender.acquire().await.unwrap();
            guard.release().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "waiter must block while the marker is held");

        first.release().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter acquires after release")
            .unwrap();
    }

    #[tokio::test]
    async fn abandoned_marker_is_reclaimed_after_lease() {
        let dir = tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.stale_after_secs = Some(60);

        let stale = LockMarker {
            pid: 999_999_999,
            acquired_at: Utc::now() - chrono::Duration::minutes(5),
        };
        std::fs::write(&settings.path, serde_json::to_vec(&stale).unwrap()).unwrap();

        let lock = FileLock::new(settings);
        let guard = tokio::time::timeout(Duration::from_secs(5), lock.acquire())
            .await
            .expect("stale marker must not block")
            .unwrap();
        guard.release().await.unwrap();
    }

    #[tokio::test]
    async fn fresh_marker_is_not_reclaimed_and_max_wait_bounds_polling() {
        let dir = tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.stale_after_secs = Some(600);
        settings.max_wait_secs = Some(0);

        std::fs::write(&settings.path, b"").unwrap();

        let lock = FileLock::new(settings);
        let err = lock.acquire().await.unwrap_err();
        assert!(matches!(err, Error::LockAcquisition(_)));
        assert!(lock.is_held().await, "a fresh foreign marker must be left alone");
    }

    #[tokio::test]
    async fn reclaim_leaves_a_replaced_marker_alone() {
        let dir = tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.stale_after_secs = Some(60);
        let lock = FileLock::new(settings.clone());

        let stale = LockMarker {
            pid: 999_999_999,
            acquired_at: Utc::now() - chrono::Duration::minutes(5),
        };
        std::fs::write(&settings.path, serde_json::to_vec(&stale).unwrap()).unwrap();
        let observed = lock.snapshot().await.unwrap();
        assert!(observed.age() > Duration::from_secs(60));

        // Another waiter reclaims the stale marker and takes the lock in between
        std::fs::remove_file(&settings.path).unwrap();
        let live = lock.acquire().await.unwrap();
        let live_content = std::fs::read(live.path()).unwrap();

        assert!(!lock.remove_if_unchanged(&observed).await);
        assert_eq!(std::fs::read(live.path()).unwrap(), live_content);

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "no tombstone may be left behind");
        live.release().await.unwrap();
    }

    #[tokio::test]
    async fn reclaim_removes_the_observed_marker() {
        let dir = tempdir().unwrap();
        let lock = FileLock::new(settings(dir.path()));

        std::fs::write(lock.path(), b"{}").unwrap();
        let observed = lock.snapshot().await.unwrap();

        assert!(lock.remove_if_unchanged(&observed).await);
        assert!(!lock.is_held().await);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unwritable_marker_location_is_lock_error() {
        let dir = tempdir().unwrap();
        let settings =
            LockSettings::at(dir.path().join("missing").join("target.lock")).without_delays();

        let err = FileLock::new(settings).acquire().await.unwrap_err();
        assert!(matches!(err, Error::LockAcquisition(_)));
    }
}
