//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator. Callers that need to tell them apart use
//! `anyhow::Error::downcast_ref`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ── State store errors ────────────────────────────────────────────────────────

/// Errors raised by the locked JSON state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not lock {path} after {attempts} attempts ({waited:?})")]
    LockTimeout {
        path: PathBuf,
        attempts: u32,
        waited: Duration,
    },

    #[error("refusing to persist {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

// ── Host bridge errors ────────────────────────────────────────────────────────

/// Errors raised while talking to the host over SSH.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("host command \"{command}\" failed: {cause}")]
    CommandFailed { command: String, cause: String },

    #[error("host command \"{command}\" timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("host unreachable after {attempts} attempts")]
    Unreachable { attempts: u32 },
}

impl HostError {
    /// `true` when the failure is a timeout rather than a non-zero exit.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ── Self-check errors ─────────────────────────────────────────────────────────

/// Errors raised by the self-check orchestrator.
#[derive(Debug, Error)]
pub enum SelfCheckError {
    #[error("Self-check is already running")]
    AlreadyRunning,

    #[error("Host connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Self-check claim was taken over by another process")]
    Superseded,
}

// ── Update errors ─────────────────────────────────────────────────────────────

/// Errors raised by the image update checker/applier.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Docker update check is already running")]
    AlreadyChecking,

    #[error("Docker update failed: {dispatch}. Fallback also failed: {fallback}")]
    ApplyFailed { dispatch: String, fallback: String },

    #[error("Docker update claim was taken over by another process")]
    Superseded,

    #[error("Invalid update URL: it must fit on a single line")]
    InvalidChannelUrl,
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to the environment-provided configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(String),

    #[error("Invalid value for {key}: {value}\n\nValid values: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },
}

/// `true` if `err` (or anything in its chain) is an "already in progress" rejection.
#[must_use]
pub fn is_already_in_progress(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<SelfCheckError>(),
            Some(SelfCheckError::AlreadyRunning)
        ) || matches!(
            cause.downcast_ref::<UpdateError>(),
            Some(UpdateError::AlreadyChecking)
        )
    })
}
