//! Command implementations

pub mod channel;
pub mod daemon;
pub mod revoke_ssh;
pub mod self_check;
pub mod setup_ssh;
pub mod status;
pub mod update;
