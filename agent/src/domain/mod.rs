//! Domain layer: pure rules, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod channel;
pub mod compose;
pub mod config;
pub mod error;
pub mod host;
pub mod ignore;
pub mod lease;
pub mod reconcile;
pub mod schedule;
pub mod scripts;

pub use config::{AgentConfig, ScriptLayout};
pub use error::{ConfigError, HostError, SelfCheckError, StoreError, UpdateError};
pub use host::SshTarget;
pub use ignore::IgnoreRules;
pub use reconcile::ReconcileReport;
