use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// The process holding a status document's `running`/`checking` claim.
///
/// Recorded at claim time so a later process can tell a claim whose owner
/// died apart from one that is still being worked on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunOwner {
    /// Random per-claim token; writes from a superseded owner are refused.
    pub run_id: String,
    pub pid: u32,
    pub hostname: String,
    pub started_at: DateTime<Utc>,
    /// After this instant the claim may be taken over even if the owner
    /// cannot be shown to be gone.
    pub expires_at: DateTime<Utc>,
}

impl RunOwner {
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        pid: u32,
        hostname: impl Into<String>,
        now: DateTime<Utc>,
        ttl: std::time::Duration,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            pid,
            hostname: hostname.into(),
            started_at: now,
            expires_at: deadline(now, ttl),
        }
    }

    /// Push the expiry to `now + ttl`.
    pub fn renew(&mut self, now: DateTime<Utc>, ttl: std::time::Duration) {
        self.expires_at = deadline(now, ttl);
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// `now + ttl`, saturating at the latest representable instant.
#[must_use]
pub fn deadline(now: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
