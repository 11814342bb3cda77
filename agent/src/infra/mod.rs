//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the
//! locked state files, SSH to the host, and the data-tree reconciler.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod command_runner;
pub mod config;
pub mod lock;
pub mod process;
pub mod reconcile;
pub mod ssh;
pub mod state;
