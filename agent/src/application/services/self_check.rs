//! Application service: host self-check use-case.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! A run is: claim the status document, check the host answers, load the script
//! list, reconcile the data tree, run every script, finalize. Only the
//! claim and each individual record are locked; the run itself is not.
//! Every record after the claim is fenced on the run id and renews the
//! claim's lease.

use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use stackwarden_common::{OverallStatus, ScriptResult, SelfCheckStatus};

use crate::application::ports::{DocumentStore, HostExecutor, ProcessRegistry, TreeReconciler};
use crate::domain::ScriptLayout;
use crate::domain::error::{HostError, SelfCheckError};
use crate::domain::host::{PROBE_TOKEN, shell_quote};
use crate::domain::lease::{Claim, ClaimView, assess_claim, holds, lease_for};
use crate::domain::scripts::{
    DEFAULT_SCRIPTS, default_scripts, parse_script_list, rejected_entries,
};

/// Knobs for one self-check run.
pub struct SelfCheckOptions<'a> {
    pub layout: &'a ScriptLayout,
    /// Per-script limit; a script exceeding it is recorded as failed.
    pub script_timeout: Duration,
}

impl SelfCheckOptions<'_> {
    /// Lease covering `scripts` more scripts plus the integrity step.
    fn lease(&self, scripts: usize) -> Duration {
        lease_for(self.script_timeout, scripts + 1)
    }

    /// Bound for claims that carry no owner, sized for the built-in list.
    fn unowned_bound(&self) -> Duration {
        self.lease(DEFAULT_SCRIPTS.len())
    }
}

/// How a run ended, as recorded at finalize.
enum Ending {
    Completed(Vec<String>),
    ConnectionFailed(String),
    Aborted(String),
}

/// Current self-check document. Never blocked by an in-flight run.
///
/// # Errors
///
/// Returns an error if the state file exists but cannot be read.
pub async fn get_self_check_status(
    store: &impl DocumentStore<SelfCheckStatus>,
) -> Result<SelfCheckStatus> {
    store.read().await
}

/// Run a full self-check and return the finalized document.
///
/// # Errors
///
/// - [`SelfCheckError::AlreadyRunning`] if a live run holds the document.
///   A claim whose owner has exited or whose lease has expired is taken over.
/// - [`SelfCheckError::ConnectionUnavailable`] if the host cannot be reached;
///   the document is finalized as `connection_failed` first.
/// - [`SelfCheckError::Superseded`] if another process took the claim over
///   mid-run; nothing more is written.
/// - Any store error; a failure after the claim still finalizes the run as
///   `failure` before returning.
pub async fn run_self_check(
    host: &impl HostExecutor,
    store: &impl DocumentStore<SelfCheckStatus>,
    reconciler: &impl TreeReconciler,
    processes: &impl ProcessRegistry,
    opts: &SelfCheckOptions<'_>,
) -> Result<SelfCheckStatus> {
    let run_id = begin_run(store, processes, opts).await?;
    tracing::info!(run = %run_id, "self-check started");

    match execute(host, store, reconciler, opts, &run_id).await {
        Ok(scripts) => finalize(store, &run_id, Ending::Completed(scripts)).await,
        Err(e) => {
            let ending = match e.downcast_ref::<SelfCheckError>() {
                Some(SelfCheckError::Superseded) => {
                    tracing::warn!(run = %run_id, "self-check claim lost, stopping");
                    return Err(e);
                }
                Some(SelfCheckError::ConnectionUnavailable(reason)) => {
                    Ending::ConnectionFailed(reason.clone())
                }
                _ => Ending::Aborted(format!("{e:#}")),
            };
            if let Err(fin) = finalize(store, &run_id, ending).await {
                tracing::error!(error = %format!("{fin:#}"), "could not finalize self-check");
            }
            Err(e)
        }
    }
}

/// Clear a `running` flag whose owner has exited or whose lease expired,
/// marking that run as failed. A claim held by a live process is left
/// alone. Returns `true` if an abandoned run was cleared.
///
/// # Errors
///
/// Returns an error if the status document cannot be updated.
pub async fn recover_interrupted_run(
    store: &impl DocumentStore<SelfCheckStatus>,
    processes: &impl ProcessRegistry,
    opts: &SelfCheckOptions<'_>,
) -> Result<bool> {
    let now = Utc::now();
    let claim = store
        .update(|s| {
            let claim = claim_state(s, processes, opts, now);
            if let Claim::Abandoned(_) = claim {
                s.is_running = false;
                s.owner = None;
                s.overall_status = OverallStatus::Failure;
            }
            claim
        })
        .await?;
    match claim {
        Claim::Abandoned(reason) => {
            tracing::warn!(
                reason = reason.as_str(),
                "previous self-check was interrupted; marked as failed",
            );
            Ok(true)
        }
        Claim::Held => {
            tracing::info!("self-check in progress in another process; leaving it");
            Ok(false)
        }
        Claim::Free => Ok(false),
    }
}

fn claim_state(
    s: &SelfCheckStatus,
    processes: &impl ProcessRegistry,
    opts: &SelfCheckOptions<'_>,
    now: chrono::DateTime<Utc>,
) -> Claim {
    let view = ClaimView {
        active: s.is_running,
        owner: s.owner.as_ref(),
        claimed_at: s.last_run,
    };
    let gone = view.owner.is_some_and(|o| processes.is_gone(o));
    assess_claim(view, gone, opts.unowned_bound(), now)
}

/// Atomic check-and-set into `running`; clears the previous run's results.
/// Returns the new claim's run id.
async fn begin_run(
    store: &impl DocumentStore<SelfCheckStatus>,
    processes: &impl ProcessRegistry,
    opts: &SelfCheckOptions<'_>,
) -> Result<String> {
    let owner = processes.claim(opts.unowned_bound());
    let run_id = owner.run_id.clone();
    let now = Utc::now();
    let claim = store
        .update(|s| {
            let claim = claim_state(s, processes, opts, now);
            if claim == Claim::Held {
                return claim;
            }
            s.is_running = true;
            s.owner = Some(owner);
            s.last_run = Some(now);
            s.overall_status = OverallStatus::NeverRun;
            s.scripts.clear();
            s.integrity_check = None;
            s.connection_error = None;
            claim
        })
        .await?;
    match claim {
        Claim::Held => Err(SelfCheckError::AlreadyRunning.into()),
        Claim::Abandoned(reason) => {
            tracing::warn!(reason = reason.as_str(), "took over an abandoned self-check");
            Ok(run_id)
        }
        Claim::Free => Ok(run_id),
    }
}

/// Apply `record` only while `run_id` still holds the claim, renewing its
/// lease to `ttl` from now.
async fn record(
    store: &impl DocumentStore<SelfCheckStatus>,
    run_id: &str,
    ttl: Duration,
    apply: impl FnOnce(&mut SelfCheckStatus),
) -> Result<()> {
    let held = store
        .update(|s| {
            let Some(owner) = s.owner.as_mut().filter(|o| o.run_id == run_id) else {
                return false;
            };
            owner.renew(Utc::now(), ttl);
            apply(s);
            true
        })
        .await?;
    if held {
        Ok(())
    } else {
        Err(SelfCheckError::Superseded.into())
    }
}

async fn execute(
    host: &impl HostExecutor,
    store: &impl DocumentStore<SelfCheckStatus>,
    reconciler: &impl TreeReconciler,
    opts: &SelfCheckOptions<'_>,
    run_id: &str,
) -> Result<Vec<String>> {
    if let Err(e) = host.run(&format!("echo {PROBE_TOKEN}")).await {
        tracing::error!(error = %format!("{e:#}"), "host unreachable, skipping self-check");
        return Err(SelfCheckError::ConnectionUnavailable(format!("{e:#}")).into());
    }

    let scripts = load_script_list(host, opts.layout).await;
    record(store, run_id, opts.lease(scripts.len()), |_| {}).await?;

    let started = Instant::now();
    let report = reconciler.reconcile().await;
    let integrity = report.to_script_result(elapsed_ms(started));
    if integrity.success {
        tracing::info!(
            fixed = report.fixed.len(),
            removed = report.removed.len(),
            "integrity check completed",
        );
    } else {
        tracing::error!(errors = report.errors.len(), "{}", integrity.message);
    }
    record(store, run_id, opts.lease(scripts.len()), |s| {
        s.integrity_check = Some(integrity);
    })
    .await?;

    for (index, name) in scripts.iter().enumerate() {
        tracing::info!(script = %name, step = index + 1, total = scripts.len(), "running script");
        let result = run_script(host, opts, name).await;
        if result.success {
            tracing::info!(script = %name, duration_ms = result.duration, "script succeeded");
        } else {
            tracing::error!(script = %name, "{}", result.message);
        }
        let remaining = scripts.len() - index - 1;
        record(store, run_id, opts.lease(remaining), |s| {
            s.scripts.insert(name.clone(), result);
        })
        .await?;
    }
    Ok(scripts)
}

/// The host's script list, or the built-in order when it is missing or empty.
async fn load_script_list(host: &impl HostExecutor, layout: &ScriptLayout) -> Vec<String> {
    match host
        .run(&format!("cat {}", shell_quote(&layout.list_file)))
        .await
    {
        Ok(out) => {
            let rejected = rejected_entries(&out.stdout);
            if !rejected.is_empty() {
                tracing::warn!(
                    list = %layout.list_file,
                    rejected = ?rejected,
                    "ignoring script list entries that are not plain file names",
                );
            }
            let scripts = parse_script_list(&out.stdout);
            if scripts.is_empty() {
                tracing::warn!(list = %layout.list_file, "script list is empty, using built-in list");
                default_scripts()
            } else {
                scripts
            }
        }
        Err(e) => {
            tracing::warn!(
                list = %layout.list_file,
                error = %format!("{e:#}"),
                "script list unavailable, using built-in list",
            );
            default_scripts()
        }
    }
}

async fn run_script(
    host: &impl HostExecutor,
    opts: &SelfCheckOptions<'_>,
    name: &str,
) -> ScriptResult {
    let started = Instant::now();
    let outcome = host
        .run_with_timeout(&opts.layout.command_for(name), opts.script_timeout)
        .await;
    let duration = Some(elapsed_ms(started));
    match outcome {
        Ok(_) => ScriptResult::succeeded("Script completed successfully", duration),
        Err(e) => {
            let timed_out = e
                .downcast_ref::<HostError>()
                .is_some_and(HostError::is_timeout);
            if timed_out {
                ScriptResult::failed(
                    format!("Script timed out after {}s", opts.script_timeout.as_secs()),
                    duration,
                )
            } else {
                ScriptResult::failed(format!("Script failed: {e:#}"), duration)
            }
        }
    }
}

/// Leave `running`; the overall status is derived from this run's scripts only.
/// Refused once the claim belongs to another run.
async fn finalize(
    store: &impl DocumentStore<SelfCheckStatus>,
    run_id: &str,
    ending: Ending,
) -> Result<SelfCheckStatus> {
    let status = store
        .update(|s| {
            if !holds(s.owner.as_ref(), run_id) {
                return None;
            }
            s.is_running = false;
            s.owner = None;
            match ending {
                Ending::Completed(scripts) => {
                    let succeeded = scripts
                        .iter()
                        .filter(|name| s.scripts.get(*name).is_some_and(|r| r.success))
                        .count();
                    s.overall_status = OverallStatus::from_tally(scripts.len(), succeeded);
                }
                Ending::ConnectionFailed(reason) => {
                    s.overall_status = OverallStatus::ConnectionFailed;
                    s.connection_error = Some(reason);
                }
                Ending::Aborted(reason) => {
                    tracing::error!(error = %reason, "self-check aborted");
                    s.overall_status = OverallStatus::Failure;
                }
            }
            Some(s.clone())
        })
        .await?;
    let Some(status) = status else {
        tracing::warn!(run = %run_id, "self-check claim lost before finalize");
        return Err(SelfCheckError::Superseded.into());
    };
    tracing::info!(status = %status.overall_status, "self-check finished");
    Ok(status)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

