//! Reference-tree reconciliation planning and reporting.

use std::collections::BTreeSet;

use stackwarden_common::ScriptResult;

use crate::domain::ignore::IgnoreRules;

/// Work derived from two file listings (relative, `/`-separated paths).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Reference files to compare against (and possibly copy over) the target.
    pub candidates: Vec<String>,
    /// Target files with no reference counterpart.
    pub orphans: Vec<String>,
}

/// Split two listings into compare candidates and orphans, skipping ignored paths.
#[must_use]
pub fn plan(reference: &[String], target: &[String], rules: &IgnoreRules) -> ReconcilePlan {
    let known: BTreeSet<&str> = reference.iter().map(String::as_str).collect();
    let candidates = reference
        .iter()
        .filter(|p| !rules.is_ignored(p))
        .cloned()
        .collect();
    let orphans = target
        .iter()
        .filter(|p| !known.contains(p.as_str()) && !rules.is_ignored(p))
        .cloned()
        .collect();
    ReconcilePlan {
        candidates,
        orphans,
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub fixed: Vec<String>,
    pub removed: Vec<String>,
    pub errors: Vec<String>,
}

impl ReconcileReport {
    /// No copies, removals, or errors.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.fixed.is_empty() && self.removed.is_empty() && self.errors.is_empty()
    }

    #[must_use]
    pub fn message(&self) -> String {
        let counts = format!(
            "{} files fixed, {} files removed",
            self.fixed.len(),
            self.removed.len()
        );
        if self.errors.is_empty() {
            format!("Integrity check completed: {counts}")
        } else {
            format!(
                "Integrity check completed with {} errors: {counts} ({})",
                self.errors.len(),
                self.errors.join("; ")
            )
        }
    }

    /// Collapse into the single integrity step result.
    #[must_use]
    pub fn to_script_result(&self, duration_ms: u64) -> ScriptResult {
        if self.errors.is_empty() {
            ScriptResult::succeeded(self.message(), Some(duration_ms))
        } else {
            ScriptResult::failed(self.message(), Some(duration_ms))
        }
    }
}
