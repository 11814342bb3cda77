use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{InvariantError, RunOwner};

/// Outcome of a self-check run, as shown on the admin dashboard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    Failure,
    Partial,
    #[default]
    NeverRun,
    ConnectionFailed,
}

impl OverallStatus {
    /// Derive the terminal status of a run from its script tally.
    ///
    /// An empty script list counts as success: nothing failed.
    #[must_use]
    pub fn from_tally(total: usize, succeeded: usize) -> Self {
        if succeeded == total {
            Self::Success
        } else if succeeded == 0 {
            Self::Failure
        } else {
            Self::Partial
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
            Self::NeverRun => "never_run",
            Self::ConnectionFailed => "connection_failed",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one self-check unit (a script or the integrity step).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptResult {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl ScriptResult {
    #[must_use]
    pub fn succeeded(message: impl Into<String>, duration: Option<u64>) -> Self {
        Self {
            success: true,
            message: message.into(),
            timestamp: Utc::now(),
            duration,
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>, duration: Option<u64>) -> Self {
        Self {
            success: false,
            message: message.into(),
            timestamp: Utc::now(),
            duration,
        }
    }
}

/// Persisted self-check document (`selfcheck-status.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelfCheckStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub overall_status: OverallStatus,
    #[serde(default)]
    pub scripts: BTreeMap<String, ScriptResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_check: Option<ScriptResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_error: Option<String>,
    /// Holder of the current run; present only while `is_running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<RunOwner>,
}

/// Aggregate counts over the scripts of the latest run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelfCheckSummary {
    pub total_scripts: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub is_running: bool,
    pub overall_status: OverallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

impl SelfCheckStatus {
    #[must_use]
    pub fn summary(&self) -> SelfCheckSummary {
        let success_count = self.scripts.values().filter(|r| r.success).count();
        SelfCheckSummary {
            total_scripts: self.scripts.len(),
            success_count,
            failure_count: self.scripts.len() - success_count,
            is_running: self.is_running,
            overall_status: self.overall_status,
            last_run: self.last_run,
        }
    }

    /// Structural checks applied before every persist.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.is_running && self.overall_status != OverallStatus::NeverRun {
            return Err(InvariantError::new(format!(
                "self-check marked running with terminal status {}",
                self.overall_status
            )));
        }
        if self.connection_error.is_some() && self.overall_status != OverallStatus::ConnectionFailed
        {
            return Err(InvariantError::new(
                "connectionError is only valid with connection_failed status",
            ));
        }
        if self.owner.is_some() && !self.is_running {
            return Err(InvariantError::new("an idle self-check cannot have an owner"));
        }
        Ok(())
    }
}
