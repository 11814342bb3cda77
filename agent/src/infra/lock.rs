//! Cross-process exclusive lock built on exclusive file creation.
//!
//! The lock file holds a JSON [`LockRecord`]. A holder that crashed leaves
//! its file behind; once older than [`LockPolicy::stale_after`] the file may
//! be reclaimed. Reclaim moves the file aside and compares what it moved with
//! what it judged stale, so of two racing reclaimers only the first removes
//! it; the second finds a fresh lock in its hands and puts it back.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::StoreError;
use crate::infra::process::current_hostname;

/// Timing knobs for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Age after which a lock is presumed abandoned.
    pub stale_after: Duration,
    pub retry_base: Duration,
    /// Upper bound of the random delay added to each retry.
    pub retry_jitter: Duration,
    pub max_retries: u32,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            retry_base: Duration::from_millis(100),
            retry_jitter: Duration::from_millis(50),
            max_retries: 300,
        }
    }
}

/// Contents of a lock file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Fencing token, unique per acquisition.
    pub lock_id: String,
    pub pid: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    fn fresh() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let pid = std::process::id();
        Self {
            lock_id: format!("{pid}-{nanos}-{:08x}", rand::random::<u32>()),
            pid,
            hostname: current_hostname(),
            acquired_at: Utc::now(),
        }
    }
}

/// A lock file path plus the policy used to acquire it.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    policy: LockPolicy,
}

impl FileLock {
    #[must_use]
    pub fn new(path: PathBuf, policy: LockPolicy) -> Self {
        Self { path, policy }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the lock, reclaiming it if stale.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockTimeout`] once `max_retries` waits are spent,
    /// or an I/O error if the lock file cannot be created or inspected.
    pub async fn acquire(&self) -> Result<LockGuard> {
        let started = Instant::now();
        let mut waits = 0u32;
        let mut reclaims = 0u32;
        loop {
            if let Some(guard) = self.try_create()? {
                return Ok(guard);
            }
            // Bounded so a misbehaving clock cannot spin us forever.
            if reclaims < self.policy.max_retries && self.reclaim_if_stale()? {
                reclaims += 1;
                continue;
            }
            if waits >= self.policy.max_retries {
                return Err(StoreError::LockTimeout {
                    path: self.path.clone(),
                    attempts: waits,
                    waited: started.elapsed(),
                }
                .into());
            }
            waits += 1;
            tokio::time::sleep(self.retry_delay()).await;
        }
    }

    fn retry_delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.policy.retry_jitter.as_millis()).unwrap_or(0);
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.policy.retry_base + Duration::from_millis(extra)
    }

    /// One exclusive-create attempt. `Ok(None)` means someone else holds it.
    fn try_create(&self) -> Result<Option<LockGuard>> {
        let record = LockRecord::fresh();
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("creating lock {}", self.path.display()));
            }
        };
        let body = serde_json::to_vec(&record).context("serializing lock record")?;
        file.write_all(&body)
            .and_then(|()| file.sync_all())
            .with_context(|| format!("writing lock {}", self.path.display()))?;
        tracing::trace!(path = %self.path.display(), lock_id = %record.lock_id, "lock acquired");
        Ok(Some(LockGuard {
            path: self.path.clone(),
            lock_id: record.lock_id,
        }))
    }

    /// Remove the lock file if it is stale. `Ok(true)` means retry at once.
    fn reclaim_if_stale(&self) -> Result<bool> {
        let observed = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => {
                return Err(e).with_context(|| format!("reading lock {}", self.path.display()));
            }
        };
        let Some(age) = self.age_of(&observed) else {
            return Ok(true);
        };
        if age < self.policy.stale_after {
            return Ok(false);
        }
        tracing::warn!(
            path = %self.path.display(),
            age_secs = age.as_secs(),
            "reclaiming stale lock",
        );
        self.reclaim(&observed)
    }

    /// Age of the lock: from its record, or from the file's mtime when the
    /// record is unreadable. `None` if the file vanished meanwhile.
    fn age_of(&self, content: &str) -> Option<Duration> {
        if let Ok(record) = serde_json::from_str::<LockRecord>(content) {
            return Some((Utc::now() - record.acquired_at).to_std().unwrap_or_default());
        }
        let modified = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        Some(modified.elapsed().unwrap_or_default())
    }

    /// Move the lock aside and delete it only if it still holds `observed`.
    pub(crate) fn reclaim(&self, observed: &str) -> Result<bool> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let aside = self
            .path
            .with_extension(format!("lock.stale.{}.{nanos}", std::process::id()));
        match std::fs::rename(&self.path, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => {
                return Err(e).with_context(|| format!("moving stale lock {}", self.path.display()));
            }
        }
        let moved = std::fs::read_to_string(&aside).unwrap_or_default();
        if moved == observed {
            let _ = std::fs::remove_file(&aside);
            return Ok(true);
        }
        // Lost the race: another reclaimer already replaced it with a live lock.
        match std::fs::hard_link(&aside, &self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!(path = %self.path.display(), "lock re-taken while restoring");
            }
            Err(_) => {
                let _ = std::fs::rename(&aside, &self.path);
            }
        }
        let _ = std::fs::remove_file(&aside);
        Ok(false)
    }
}

/// Held lock; the file is removed on drop if it still carries our token.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    lock_id: String,
}

impl LockGuard {
    #[must_use]
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let ours = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|c| serde_json::from_str::<LockRecord>(&c).ok())
            .is_some_and(|r| r.lock_id == self.lock_id);
        if ours {
            let _ = std::fs::remove_file(&self.path);
        } else {
            tracing::warn!(path = %self.path.display(), "lock no longer ours at release");
        }
    }
}
