use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{InvariantError, RunOwner};

/// Placeholder digest recorded when no running container uses an image.
pub const LOCAL_NOT_FOUND: &str = "local-not-found";

/// Placeholder digest recorded when the latest image could not be resolved.
pub const REMOTE_NOT_FOUND: &str = "remote-not-found";

/// Per-image update state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ImageState {
    UpToDate,
    UpdateAvailable,
    Error,
}

impl ImageState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpToDate => "up-to-date",
            Self::UpdateAvailable => "update-available",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ImageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One image referenced by the compose project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub name: String,
    /// Image id of the running container, or [`LOCAL_NOT_FOUND`].
    pub current_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_digest: Option<String>,
    pub has_update: bool,
    pub last_checked: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub status: ImageState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageInfo {
    /// Compare a running digest against a freshly pulled one.
    ///
    /// A missing running container is recorded as [`LOCAL_NOT_FOUND`], which
    /// never equals a real digest and therefore reports an update.
    #[must_use]
    pub fn compared(name: &str, current: Option<&str>, latest: &str) -> Self {
        let current = current.unwrap_or(LOCAL_NOT_FOUND);
        let has_update = current != latest;
        Self {
            name: name.to_string(),
            current_digest: current.to_string(),
            latest_digest: Some(latest.to_string()),
            has_update,
            last_checked: Utc::now(),
            digest: Some(latest.to_string()),
            status: if has_update {
                ImageState::UpdateAvailable
            } else {
                ImageState::UpToDate
            },
            error: None,
        }
    }

    /// Record an image whose digests could not be resolved.
    #[must_use]
    pub fn errored(name: &str, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            current_digest: LOCAL_NOT_FOUND.to_string(),
            latest_digest: Some(REMOTE_NOT_FOUND.to_string()),
            has_update: false,
            last_checked: Utc::now(),
            digest: None,
            status: ImageState::Error,
            error: Some(error.into()),
        }
    }
}

/// Persisted update-check document (`docker-update-status.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DockerUpdateStatus {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub images: Vec<ImageInfo>,
    pub total_images: usize,
    pub has_updates: bool,
    pub is_checking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Duration of the last check cycle in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_duration: Option<u64>,
    /// Holder of the current check or apply; present only while `is_checking`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<RunOwner>,
}

impl Default for DockerUpdateStatus {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            images: Vec::new(),
            total_images: 0,
            has_updates: false,
            is_checking: false,
            last_error: None,
            check_duration: None,
            owner: None,
        }
    }
}

impl DockerUpdateStatus {
    /// Replace the image list and recompute the derived aggregate fields.
    pub fn set_images(&mut self, images: Vec<ImageInfo>) {
        self.has_updates = images.iter().any(|i| i.has_update);
        self.total_images = images.len();
        self.images = images;
    }

    /// Images with an update available.
    pub fn pending_updates(&self) -> impl Iterator<Item = &ImageInfo> {
        self.images.iter().filter(|i| i.has_update)
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.total_images != self.images.len() {
            return Err(InvariantError::new(format!(
                "totalImages is {} but {} images are recorded",
                self.total_images,
                self.images.len()
            )));
        }
        let any_update = self.images.iter().any(|i| i.has_update);
        if self.has_updates != any_update {
            return Err(InvariantError::new(
                "hasUpdates does not match the per-image update flags",
            ));
        }
        if self.owner.is_some() && !self.is_checking {
            return Err(InvariantError::new("an idle update check cannot have an owner"));
        }
        Ok(())
    }
}
