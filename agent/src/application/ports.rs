//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared status types,
//! never from `crate::infra`, `crate::commands`, or `crate::output`.

use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use stackwarden_common::RunOwner;

use crate::domain::ReconcileReport;

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts local process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Host Bridge Port ──────────────────────────────────────────────────────────

/// Captured output of a successful host command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs shell commands on the host, one fresh session per call.
#[allow(async_fn_in_trait)]
pub trait HostExecutor {
    /// Run `command` with the executor's default timeout.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::domain::HostError`] (wrapped in `anyhow`) on
    /// non-zero exit, connection failure, or timeout.
    async fn run(&self, command: &str) -> Result<HostOutput>;
    /// Run `command`, giving up after `timeout`.
    async fn run_with_timeout(&self, command: &str, timeout: Duration) -> Result<HostOutput>;
}

// ── Key Provisioning Port ─────────────────────────────────────────────────────

/// Keypair lifecycle for host access.
#[allow(async_fn_in_trait)]
pub trait KeyProvisioner {
    /// Create a fresh keypair, replacing any previous one; returns the public key.
    async fn generate_keypair(&self) -> Result<String>;
    /// Authorize `public_key` on the host, dropping previous agent keys.
    /// Returns the number of agent keys removed.
    async fn install_public_key(&self, public_key: &str) -> Result<usize>;
    /// Current authorized-keys content (empty when absent).
    async fn authorized_keys(&self) -> Result<String>;
    /// Remove every agent key from the host, leaving other keys intact.
    /// Returns the number of keys removed.
    async fn revoke_agent_keys(&self) -> Result<usize>;
}

// ── State Store Port ──────────────────────────────────────────────────────────

/// Locked, cached persistence of one status document.
#[allow(async_fn_in_trait)]
pub trait DocumentStore<T> {
    /// Current document, or the default when none is persisted.
    async fn read(&self) -> Result<T>;
    /// Apply `mutate` under the lock and persist the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired, the mutated document
    /// fails validation, or the write fails. Nothing is persisted on error.
    async fn update<R, F>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R;
    /// Replace the persisted document with the default.
    async fn reset(&self) -> Result<()>;
}

// ── Process Registry Port ─────────────────────────────────────────────────────

/// Issues run claims for this process and judges claims left by others.
pub trait ProcessRegistry {
    /// A fresh claim owned by this process, valid for `ttl`.
    fn claim(&self, ttl: Duration) -> RunOwner;
    /// `true` only when `owner`'s process has provably exited. An owner
    /// that cannot be checked (another host, say) is never reported gone.
    fn is_gone(&self, owner: &RunOwner) -> bool;
}

// ── Tree Reconciler Port ──────────────────────────────────────────────────────

/// Brings a target tree in line with a reference tree.
#[allow(async_fn_in_trait)]
pub trait TreeReconciler {
    /// Copy missing or differing files and prune orphans. Per-file failures
    /// are collected into the report, never returned as `Err`.
    async fn reconcile(&self) -> ReconcileReport;
}
