//! Claim rules for the `running` / `checking` flags of the status documents.
//!
//! A claim names its owner process and an expiry. It is abandoned only when
//! the owner is known to have exited or the expiry has passed; claims left
//! by older agents that recorded no owner fall back to the claim's age.

use std::time::Duration;

use chrono::{DateTime, Utc};
use stackwarden_common::RunOwner;
use stackwarden_common::lease::deadline;

/// Extra time on every lease for the work around the timed steps.
pub const LEASE_SLACK: Duration = Duration::from_secs(5 * 60);

/// Why a held claim may be taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abandonment {
    OwnerExited,
    LeaseExpired,
    Unowned,
}

impl Abandonment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OwnerExited => "owner process exited",
            Self::LeaseExpired => "lease expired",
            Self::Unowned => "claim has no owner and is past its bound",
        }
    }
}

/// State of a document's claim as seen by a would-be claimant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Free,
    Held,
    Abandoned(Abandonment),
}

/// The claim flag, owner, and claim time of one document.
#[derive(Debug, Clone, Copy)]
pub struct ClaimView<'a> {
    pub active: bool,
    pub owner: Option<&'a RunOwner>,
    /// When the claim was taken, for documents without an owner.
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Classify a claim.
///
/// `owner_gone` must be `true` only when the owner's process has provably
/// exited. `unowned_bound` limits claims without an owner; one with no
/// claim time at all cannot belong to a live run.
#[must_use]
pub fn assess_claim(
    view: ClaimView<'_>,
    owner_gone: bool,
    unowned_bound: Duration,
    now: DateTime<Utc>,
) -> Claim {
    if !view.active {
        return Claim::Free;
    }
    match view.owner {
        Some(_) if owner_gone => Claim::Abandoned(Abandonment::OwnerExited),
        Some(owner) if owner.is_expired(now) => Claim::Abandoned(Abandonment::LeaseExpired),
        Some(_) => Claim::Held,
        None => match view.claimed_at {
            Some(at) if now <= deadline(at, unowned_bound) => Claim::Held,
            _ => Claim::Abandoned(Abandonment::Unowned),
        },
    }
}

/// `true` when `owner` is the claim identified by `run_id`.
#[must_use]
pub fn holds(owner: Option<&RunOwner>, run_id: &str) -> bool {
    owner.is_some_and(|o| o.run_id == run_id)
}

/// Lease long enough for `steps` units of `per_step` plus [`LEASE_SLACK`].
#[must_use]
pub fn lease_for(per_step: Duration, steps: usize) -> Duration {
    let steps = u32::try_from(steps).unwrap_or(u32::MAX);
    per_step.saturating_mul(steps).saturating_add(LEASE_SLACK)
}
