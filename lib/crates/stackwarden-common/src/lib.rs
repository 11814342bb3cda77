//! Status documents shared between the stackwarden agent and the HTTP layer
//! that serves them to the admin dashboard.

pub mod lease;
pub mod selfcheck;
pub mod update;

pub use lease::RunOwner;
pub use selfcheck::{OverallStatus, ScriptResult, SelfCheckStatus, SelfCheckSummary};
pub use update::{DockerUpdateStatus, ImageInfo, ImageState, LOCAL_NOT_FOUND, REMOTE_NOT_FOUND};

/// A status document violates one of its structural invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid status document: {0}")]
pub struct InvariantError(String);

impl InvariantError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
