//! Application service: startup provisioning and the maintenance cycle.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use anyhow::Result;
use stackwarden_common::{DockerUpdateStatus, OverallStatus, SelfCheckStatus};

use crate::application::ports::{
    DocumentStore, HostExecutor, KeyProvisioner, ProcessRegistry, TreeReconciler,
};
use crate::application::services::self_check::{SelfCheckOptions, run_self_check};
use crate::application::services::update::{ApplyOutcome, apply_update, check_for_updates};
use crate::domain::HostError;
use crate::domain::host::{AGENT_KEY_MARKER, KeyEntry, PROBE_TOKEN, key_inventory};

/// Reachability probing used once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            retry_delay: Duration::from_secs(3),
        }
    }
}

/// What [`provision_access`] or [`revoke_access`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Agent keys dropped from `authorized_keys`.
    pub removed: usize,
    pub inventory: Vec<KeyEntry>,
}

/// Generate a fresh keypair and authorize it on the host.
///
/// # Errors
///
/// Returns an error if key generation or installation fails.
pub async fn provision_access(keys: &impl KeyProvisioner) -> Result<ProvisionReport> {
    let public_key = keys.generate_keypair().await?;
    let removed = keys.install_public_key(&public_key).await?;
    let inventory = key_inventory(&keys.authorized_keys().await?, AGENT_KEY_MARKER);

    let agent = inventory.iter().filter(|k| k.agent_key).count();
    tracing::info!(
        total = inventory.len(),
        agent,
        other = inventory.len() - agent,
        removed,
        "authorized keys updated",
    );
    for entry in inventory.iter().filter(|k| !k.agent_key) {
        tracing::debug!(comment = %entry.comment, "keeping existing key");
    }
    Ok(ProvisionReport { removed, inventory })
}

/// Remove the agent's keys from the host without installing a new one.
///
/// Keys not tagged as agent keys are kept. The local keypair is left in
/// place so a later `setup-ssh` can reinstall it.
///
/// # Errors
///
/// Returns an error if the authorized-keys file cannot be read or written.
pub async fn revoke_access(keys: &impl KeyProvisioner) -> Result<ProvisionReport> {
    let removed = keys.revoke_agent_keys().await?;
    let inventory = key_inventory(&keys.authorized_keys().await?, AGENT_KEY_MARKER);
    tracing::info!(removed, remaining = inventory.len(), "agent access revoked");
    Ok(ProvisionReport { removed, inventory })
}

/// Probe the host until it answers or `policy.max_attempts` is spent.
///
/// # Errors
///
/// Returns [`HostError::Unreachable`] after the last failed attempt.
pub async fn wait_until_reachable(host: &impl HostExecutor, policy: ProbePolicy) -> Result<()> {
    let probe = format!("echo {PROBE_TOKEN}");
    for attempt in 1..=policy.max_attempts {
        match host.run(&probe).await {
            Ok(out) if out.stdout.contains(PROBE_TOKEN) => {
                tracing::info!(attempt, "host reachable over SSH");
                return Ok(());
            }
            Ok(_) => tracing::warn!(attempt, "unexpected probe output"),
            Err(e) => tracing::debug!(attempt, error = %format!("{e:#}"), "host not reachable yet"),
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.retry_delay).await;
        }
    }
    Err(HostError::Unreachable {
        attempts: policy.max_attempts,
    }
    .into())
}

/// Stores and settings for one maintenance cycle.
pub struct MaintenanceContext<'a, H, S, U, T, P> {
    pub host: &'a H,
    pub self_check_store: &'a S,
    pub update_store: &'a U,
    pub reconciler: &'a T,
    pub processes: &'a P,
    pub self_check: SelfCheckOptions<'a>,
    pub compose_dir: &'a str,
}

/// What one maintenance cycle did; `None` marks a step that failed or was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub self_check: Option<OverallStatus>,
    pub pending_updates: Option<usize>,
    pub applied: Option<ApplyOutcome>,
}

/// Self-check, then update check, then apply when updates are pending.
///
/// Never fails: every step's error is logged and the cycle moves on, except
/// that a failed update check skips the apply.
pub async fn check<H, S, U, T, P>(
    ctx: &MaintenanceContext<'_, H, S, U, T, P>,
) -> MaintenanceReport
where
    H: HostExecutor,
    S: DocumentStore<SelfCheckStatus>,
    U: DocumentStore<DockerUpdateStatus>,
    T: TreeReconciler,
    P: ProcessRegistry,
{
    let mut report = MaintenanceReport::default();
    tracing::info!("maintenance cycle started");

    let self_check = run_self_check(
        ctx.host,
        ctx.self_check_store,
        ctx.reconciler,
        ctx.processes,
        &ctx.self_check,
    )
    .await;
    match self_check {
        Ok(status) => report.self_check = Some(status.overall_status),
        Err(e) => tracing::error!(error = %format!("{e:#}"), "self-check did not complete"),
    }

    let checked =
        check_for_updates(ctx.host, ctx.update_store, ctx.processes, ctx.compose_dir).await;
    let status = match checked {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "skipping update apply");
            return report;
        }
    };
    report.pending_updates = Some(status.pending_updates().count());

    if !status.has_updates {
        tracing::info!("all images up to date");
        return report;
    }
    match apply_update(ctx.host, ctx.update_store, ctx.processes, ctx.compose_dir).await {
        Ok(outcome) => report.applied = Some(outcome),
        Err(e) => tracing::error!(error = %format!("{e:#}"), "update apply failed"),
    }
    report
}
