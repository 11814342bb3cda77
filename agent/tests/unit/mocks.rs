//! Shared mock infrastructure for unit tests.
//!
//! Provides a scripted [`HostExecutor`], an in-memory [`DocumentStore`], a
//! canned [`TreeReconciler`] and a fake [`ProcessRegistry`] so each test
//! file doesn't have to re-define the same boilerplate.

#![allow(clippy::expect_used)]

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use stackwarden::application::ports::{
    DocumentStore, HostExecutor, HostOutput, KeyProvisioner, ProcessRegistry, TreeReconciler,
};
use stackwarden::domain::{HostError, ReconcileReport, ScriptLayout, StoreError};
use stackwarden::infra::state::StateDocument;
use stackwarden_common::RunOwner;

// ── Host ──────────────────────────────────────────────────────────────────────

/// Canned reply for a host command.
#[derive(Clone)]
pub enum Reply {
    Ok(String),
    Fail(String),
    Timeout,
}

/// Host whose replies are chosen by the first rule whose pattern occurs in
/// the command. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct MockHost {
    rules: Vec<(String, Reply)>,
    calls: Mutex<Vec<String>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on(mut self, pattern: &str, reply: Reply) -> Self {
        self.rules.push((pattern.to_string(), reply));
        self
    }

    #[must_use]
    pub fn ok(self, pattern: &str, stdout: &str) -> Self {
        self.on(pattern, Reply::Ok(stdout.to_string()))
    }

    #[must_use]
    pub fn fail(self, pattern: &str, stderr: &str) -> Self {
        self.on(pattern, Reply::Fail(stderr.to_string()))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    /// Commands containing `pattern`, in call order.
    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.contains(pattern))
            .collect()
    }

    fn reply(&self, command: &str, timeout: Duration) -> Result<HostOutput> {
        self.calls.lock().expect("lock").push(command.to_string());
        let reply = self
            .rules
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map_or(Reply::Ok(String::new()), |(_, r)| r.clone());
        match reply {
            Reply::Ok(stdout) => Ok(HostOutput {
                stdout,
                stderr: String::new(),
            }),
            Reply::Fail(stderr) => Err(HostError::CommandFailed {
                command: command.to_string(),
                cause: format!("exit status 1: {stderr}"),
            }
            .into()),
            Reply::Timeout => Err(HostError::Timeout {
                command: command.to_string(),
                timeout,
            }
            .into()),
        }
    }
}

impl HostExecutor for MockHost {
    async fn run(&self, command: &str) -> Result<HostOutput> {
        self.reply(command, Duration::from_secs(600))
    }

    async fn run_with_timeout(&self, command: &str, timeout: Duration) -> Result<HostOutput> {
        self.reply(command, timeout)
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// In-memory document store with the same validation as the file store.
pub struct MockStore<T> {
    doc: Mutex<T>,
    updates: Mutex<usize>,
}

impl<T: StateDocument> MockStore<T> {
    pub fn new() -> Self {
        Self::with(T::default())
    }

    pub fn with(doc: T) -> Self {
        Self {
            doc: Mutex::new(doc),
            updates: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> T {
        self.doc.lock().expect("lock").clone()
    }

    pub fn update_count(&self) -> usize {
        *self.updates.lock().expect("lock")
    }
}

impl<T: StateDocument> DocumentStore<T> for MockStore<T> {
    async fn read(&self) -> Result<T> {
        Ok(self.snapshot())
    }

    async fn update<R, F>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.doc.lock().expect("lock");
        let mut doc = guard.clone();
        let out = mutate(&mut doc);
        doc.validate().map_err(|e| StoreError::Invalid {
            path: T::NAME.into(),
            reason: e.to_string(),
        })?;
        *guard = doc;
        *self.updates.lock().expect("lock") += 1;
        Ok(out)
    }

    async fn reset(&self) -> Result<()> {
        *self.doc.lock().expect("lock") = T::default();
        Ok(())
    }
}

// ── Reconciler ────────────────────────────────────────────────────────────────

pub struct MockReconciler {
    report: ReconcileReport,
    runs: Mutex<usize>,
}

impl MockReconciler {
    pub fn clean() -> Self {
        Self::returning(ReconcileReport::default())
    }

    pub fn returning(report: ReconcileReport) -> Self {
        Self {
            report,
            runs: Mutex::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        *self.runs.lock().expect("lock")
    }
}

impl TreeReconciler for MockReconciler {
    async fn reconcile(&self) -> ReconcileReport {
        *self.runs.lock().expect("lock") += 1;
        self.report.clone()
    }
}

// ── Keys ──────────────────────────────────────────────────────────────────────

/// Key provisioner backed by an in-memory authorized-keys file.
pub struct MockKeys {
    pub authorized: Mutex<String>,
    pub fail_keygen: bool,
}

impl MockKeys {
    pub fn with_authorized(content: &str) -> Self {
        Self {
            authorized: Mutex::new(content.to_string()),
            fail_keygen: false,
        }
    }
}

impl KeyProvisioner for MockKeys {
    async fn generate_keypair(&self) -> Result<String> {
        if self.fail_keygen {
            anyhow::bail!("ssh-keygen failed");
        }
        Ok("ssh-ed25519 AAAANEW stackwarden-agent-1700000000".to_string())
    }

    async fn install_public_key(&self, public_key: &str) -> Result<usize> {
        let mut authorized = self.authorized.lock().expect("lock");
        let (updated, removed) = stackwarden::domain::host::replace_agent_keys(
            &authorized,
            stackwarden::domain::host::AGENT_KEY_MARKER,
            public_key,
        );
        *authorized = updated;
        Ok(removed)
    }

    async fn authorized_keys(&self) -> Result<String> {
        Ok(self.authorized.lock().expect("lock").clone())
    }

    async fn revoke_agent_keys(&self) -> Result<usize> {
        let mut authorized = self.authorized.lock().expect("lock");
        let (updated, removed) = stackwarden::domain::host::strip_agent_keys(
            &authorized,
            stackwarden::domain::host::AGENT_KEY_MARKER,
        );
        *authorized = updated;
        Ok(removed)
    }
}

// ── Processes ─────────────────────────────────────────────────────────────────

pub const MOCK_PID: u32 = 4242;
pub const MOCK_HOST: &str = "agent-test";

/// Registry for a single fake process. `gone` is the answer for every
/// owner it is asked about.
pub struct MockProcesses {
    gone: bool,
    claims: Mutex<u32>,
}

impl MockProcesses {
    /// Every recorded owner is still running.
    pub fn alive() -> Self {
        Self {
            gone: false,
            claims: Mutex::new(0),
        }
    }

    /// Every recorded owner has exited.
    pub fn exited() -> Self {
        Self {
            gone: true,
            claims: Mutex::new(0),
        }
    }
}

impl ProcessRegistry for MockProcesses {
    fn claim(&self, ttl: Duration) -> RunOwner {
        let mut claims = self.claims.lock().expect("lock");
        *claims += 1;
        RunOwner::new(format!("run-{claims}"), MOCK_PID, MOCK_HOST, Utc::now(), ttl)
    }

    fn is_gone(&self, _owner: &RunOwner) -> bool {
        self.gone
    }
}

/// An owner from another process with an hour left on its lease.
pub fn other_owner() -> RunOwner {
    RunOwner::new("run-other", 77, MOCK_HOST, Utc::now(), Duration::from_secs(3600))
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

pub const COMPOSE_DIR: &str = "/srv/stack";

pub fn layout() -> ScriptLayout {
    ScriptLayout {
        wrapper: format!("{COMPOSE_DIR}/scripts/tools/execute_script_with_log.sh"),
        list_file: format!("{COMPOSE_DIR}/scripts/self-check/scripts.list"),
        script_dir: format!("{COMPOSE_DIR}/scripts/self-check"),
    }
}
