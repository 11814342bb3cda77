//! JSON output helpers.
//!
//! Every `--json` code path prints one pretty-printed document to stdout;
//! failures use the error object below.

use anyhow::{Context, Result};
use serde::Serialize;

/// Format a JSON error object.
///
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Print `value` as pretty JSON on stdout.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("JSON serialization failed")?;
    println!("{out}");
    Ok(())
}

/// Stable machine-readable code for an error chain.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    use crate::domain::error::{ConfigError, HostError, SelfCheckError, StoreError, UpdateError};

    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<SelfCheckError>() {
            return match e {
                SelfCheckError::AlreadyRunning => "ALREADY_RUNNING",
                SelfCheckError::ConnectionUnavailable(_) => "CONNECTION_UNAVAILABLE",
                SelfCheckError::Superseded => "SUPERSEDED",
            };
        }
        if let Some(e) = cause.downcast_ref::<UpdateError>() {
            return match e {
                UpdateError::AlreadyChecking => "ALREADY_RUNNING",
                UpdateError::ApplyFailed { .. } => "UPDATE_FAILED",
                UpdateError::Superseded => "SUPERSEDED",
                UpdateError::InvalidChannelUrl => "INVALID_INPUT",
            };
        }
        if let Some(e) = cause.downcast_ref::<StoreError>() {
            return match e {
                StoreError::LockTimeout { .. } => "LOCK_TIMEOUT",
                StoreError::Invalid { .. } => "INVALID_STATE",
            };
        }
        if cause.downcast_ref::<HostError>().is_some() {
            return "HOST_COMMAND_FAILED";
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return "CONFIG_ERROR";
        }
    }
    "ERROR"
}
