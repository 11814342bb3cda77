//! Infrastructure implementation of the `DocumentStore` port.
//!
//! `JsonStore` keeps one JSON document per file under the state directory,
//! guarded by a sibling `.lock` file. Writes go through a temp file + rename
//! so readers only ever see a complete document.

use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use stackwarden_common::{DockerUpdateStatus, InvariantError, SelfCheckStatus};

use crate::application::ports::DocumentStore;
use crate::domain::StoreError;
use crate::infra::lock::{FileLock, LockPolicy};

/// A status document persisted by [`JsonStore`].
pub trait StateDocument: Serialize + DeserializeOwned + Default + Clone {
    /// File stem under the state directory.
    const NAME: &'static str;

    /// Checked before every persist; a failing document is never written.
    ///
    /// # Errors
    ///
    /// Returns the violated invariant.
    fn validate(&self) -> Result<(), InvariantError>;
}

impl StateDocument for SelfCheckStatus {
    const NAME: &'static str = "selfcheck-status";

    fn validate(&self) -> Result<(), InvariantError> {
        self.check_invariants()
    }
}

impl StateDocument for DockerUpdateStatus {
    const NAME: &'static str = "docker-update-status";

    fn validate(&self) -> Result<(), InvariantError> {
        self.check_invariants()
    }
}

/// Identifies one on-disk version of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: SystemTime,
    len: u64,
}

impl Fingerprint {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok()?,
            len: meta.len(),
        })
    }
}

struct Cached<T> {
    fingerprint: Fingerprint,
    value: T,
}

/// Locked, cached JSON file holding one `T`.
pub struct JsonStore<T> {
    path: PathBuf,
    lock: FileLock,
    cache: Mutex<Option<Cached<T>>>,
    _doc: PhantomData<fn() -> T>,
}

impl<T: StateDocument> JsonStore<T> {
    /// Store for `T` under `dir` with the default lock policy.
    #[must_use]
    pub fn open(dir: &Path) -> Self {
        Self::with_policy(dir, LockPolicy::default())
    }

    #[must_use]
    pub fn with_policy(dir: &Path, policy: LockPolicy) -> Self {
        Self {
            path: dir.join(format!("{}.json", T::NAME)),
            lock: FileLock::new(dir.join(format!("{}.lock", T::NAME)), policy),
            cache: Mutex::new(None),
            _doc: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the state directory and, if absent, a default document.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the lock cannot
    /// be acquired, or the initial write fails.
    pub async fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory {}", parent.display()))?;
        }
        let _guard = self.lock.acquire().await?;
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "creating default status document");
            self.persist(&T::default())?;
        }
        Ok(())
    }

    /// Last value read or written by this instance, if any.
    #[must_use]
    pub fn cached(&self) -> Option<T> {
        self.cache
            .lock()
            .ok()
            .and_then(|c| c.as_ref().map(|c| c.value.clone()))
    }

    /// Read through the cache; a matching fingerprint skips the disk read.
    fn load(&self, use_cache: bool) -> Result<T> {
        let Some(fingerprint) = Fingerprint::of(&self.path) else {
            return Ok(T::default());
        };
        if use_cache {
            if let Ok(cache) = self.cache.lock() {
                if let Some(c) = cache.as_ref().filter(|c| c.fingerprint == fingerprint) {
                    return Ok(c.value.clone());
                }
            }
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };
        let value = match serde_json::from_str::<T>(&content) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "status document unreadable, using default",
                );
                return Ok(T::default());
            }
        };
        self.remember(fingerprint, &value);
        Ok(value)
    }

    fn persist(&self, value: &T) -> Result<()> {
        let body = serde_json::to_vec_pretty(value).context("serializing status document")?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let temp_path = self
            .path
            .with_extension(format!("json.{}.{nanos}.tmp", std::process::id()));

        let written = std::fs::File::create(&temp_path)
            .and_then(|mut f| f.write_all(&body).and_then(|()| f.sync_all()));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e).with_context(|| format!("writing temp file {}", temp_path.display()));
        }
        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e).with_context(|| format!("finalizing {}", self.path.display()));
        }
        if let Some(fingerprint) = Fingerprint::of(&self.path) {
            self.remember(fingerprint, value);
        }
        Ok(())
    }

    fn remember(&self, fingerprint: Fingerprint, value: &T) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(Cached {
                fingerprint,
                value: value.clone(),
            });
        }
    }
}

impl<T: StateDocument> DocumentStore<T> for JsonStore<T> {
    /// Lock-free: a rename replaces the file atomically, so a reader gets
    /// either the previous or the new complete document.
    async fn read(&self) -> Result<T> {
        self.load(true)
    }

    async fn update<R, F>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.lock.acquire().await?;
        // Under the lock the disk copy is authoritative: mtime granularity
        // cannot tell apart two writes within the same tick.
        let mut doc = self.load(false)?;
        let out = mutate(&mut doc);
        doc.validate().map_err(|e| StoreError::Invalid {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        self.persist(&doc)?;
        Ok(out)
    }

    async fn reset(&self) -> Result<()> {
        let _guard = self.lock.acquire().await?;
        self.persist(&T::default())
    }
}
