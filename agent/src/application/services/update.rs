//! Application service: compose image update check and apply.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! Check and apply share the `isChecking` claim; writes after the claim are
//! fenced on its run id.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use stackwarden_common::{DockerUpdateStatus, ImageInfo};

use crate::application::ports::{DocumentStore, HostExecutor, ProcessRegistry};
use crate::domain::compose::{
    self, ComposeProject, UPDATE_LOG_PATH, first_non_empty_line, is_valid_image_ref,
    parse_image_list,
};
use crate::domain::error::UpdateError;
use crate::domain::lease::{Claim, ClaimView, assess_claim, holds, lease_for};

/// Limit for the synchronous `pull && up -d` fallback.
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Lease granted per stage: one image checked, or one apply.
pub const STAGE_LEASE: Duration = Duration::from_secs(45 * 60);

/// Result of [`apply_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// `up -d` is running detached on the host, logging to `log_path`.
    Initiated { log_path: String },
    /// The synchronous fallback finished.
    Completed { output: String },
}

/// Last persisted update-check document, including per-image status and
/// `lastError`.
///
/// # Errors
///
/// Returns an error if the state file exists but cannot be read.
pub async fn get_last_update_status(
    store: &impl DocumentStore<DockerUpdateStatus>,
) -> Result<DockerUpdateStatus> {
    store.read().await
}

/// Clear an `isChecking` flag whose owner has exited or whose lease
/// expired. A claim held by a live process is left alone. Returns `true`
/// if an abandoned check was cleared.
///
/// # Errors
///
/// Returns an error if the status document cannot be updated.
pub async fn recover_interrupted_check(
    store: &impl DocumentStore<DockerUpdateStatus>,
    processes: &impl ProcessRegistry,
) -> Result<bool> {
    let now = Utc::now();
    let claim = store
        .update(|s| {
            let claim = claim_state(s, processes, now);
            if let Claim::Abandoned(_) = claim {
                s.is_checking = false;
                s.owner = None;
                s.last_error = Some("Update check was interrupted".to_string());
            }
            claim
        })
        .await?;
    match claim {
        Claim::Abandoned(reason) => {
            tracing::warn!(reason = reason.as_str(), "previous update check was interrupted");
            Ok(true)
        }
        Claim::Held => {
            tracing::info!("update check in progress in another process; leaving it");
            Ok(false)
        }
        Claim::Free => Ok(false),
    }
}

/// Compare every compose image's running id with the freshly pulled one.
///
/// Per-image failures are recorded on that image; a failure to list the
/// images at all is recorded in `lastError` and returned.
///
/// # Errors
///
/// Returns [`UpdateError::AlreadyChecking`] if a live check or apply is in
/// progress, [`UpdateError::Superseded`] if the claim was taken over
/// mid-check, or the listing / store error otherwise.
pub async fn check_for_updates(
    host: &impl HostExecutor,
    store: &impl DocumentStore<DockerUpdateStatus>,
    processes: &impl ProcessRegistry,
    compose_dir: &str,
) -> Result<DockerUpdateStatus> {
    let run_id = begin_check(store, processes).await?;
    tracing::info!(compose = compose_dir, run = %run_id, "checking for image updates");

    let started = Instant::now();
    let project = ComposeProject::new(compose_dir);
    let outcome = match collect_images(host, store, &project, &run_id).await {
        Err(e) if matches!(e.downcast_ref::<UpdateError>(), Some(UpdateError::Superseded)) => {
            tracing::warn!(run = %run_id, "update check claim lost, stopping");
            return Err(e);
        }
        other => other,
    };
    let duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let error = outcome.as_ref().err().map(|e| format!("{e:#}"));
    let status = store
        .update(|s| {
            if !holds(s.owner.as_ref(), &run_id) {
                return None;
            }
            s.is_checking = false;
            s.owner = None;
            s.timestamp = Utc::now();
            s.check_duration = Some(duration);
            s.last_error.clone_from(&error);
            if let Ok(images) = &outcome {
                s.set_images(images.clone());
            }
            Some(s.clone())
        })
        .await?
        .ok_or(UpdateError::Superseded)?;

    match outcome {
        Ok(_) => {
            tracing::info!(
                total = status.total_images,
                pending = status.pending_updates().count(),
                duration_ms = duration,
                "update check completed",
            );
            Ok(status)
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "update check failed");
            Err(e)
        }
    }
}

/// Pull and recreate the compose stack on the host.
///
/// The normal path dispatches `up -d` detached so it survives this agent's
/// own container being recreated. Only if pulling or dispatching fails is a
/// synchronous `pull && up -d` attempted, bounded by [`FALLBACK_TIMEOUT`].
///
/// # Errors
///
/// Returns [`UpdateError::AlreadyChecking`] if a check is in progress,
/// [`UpdateError::ApplyFailed`] when both paths fail, or
/// [`UpdateError::Superseded`] if the claim was taken over meanwhile.
pub async fn apply_update(
    host: &impl HostExecutor,
    store: &impl DocumentStore<DockerUpdateStatus>,
    processes: &impl ProcessRegistry,
    compose_dir: &str,
) -> Result<ApplyOutcome> {
    let run_id = begin_check(store, processes).await?;
    let project = ComposeProject::new(compose_dir);

    let dispatch = async {
        tracing::info!(compose = compose_dir, "pulling latest images");
        host.run(&project.pull_all()).await?;
        tracing::info!("dispatching detached update on host");
        host.run(&project.detached_up()).await?;
        anyhow::Ok(())
    }
    .await;

    let (outcome, last_error): (Result<ApplyOutcome>, Option<String>) = match dispatch {
        Ok(()) => {
            tracing::info!(log = UPDATE_LOG_PATH, "update dispatched; continues in background");
            (
                Ok(ApplyOutcome::Initiated {
                    log_path: UPDATE_LOG_PATH.to_string(),
                }),
                None,
            )
        }
        Err(first) => {
            tracing::warn!(error = %format!("{first:#}"), "detached update failed, trying fallback");
            match host
                .run_with_timeout(&project.pull_and_up(), FALLBACK_TIMEOUT)
                .await
            {
                Ok(out) => {
                    tracing::info!("fallback update completed");
                    (
                        Ok(ApplyOutcome::Completed {
                            output: out.stdout,
                        }),
                        None,
                    )
                }
                Err(second) => {
                    let err = UpdateError::ApplyFailed {
                        dispatch: format!("{first:#}"),
                        fallback: format!("{second:#}"),
                    };
                    let message = err.to_string();
                    tracing::error!(error = %message, "update failed");
                    (Err(err.into()), Some(message))
                }
            }
        }
    };

    let held = store
        .update(|s| {
            if !holds(s.owner.as_ref(), &run_id) {
                return false;
            }
            s.is_checking = false;
            s.owner = None;
            s.timestamp = Utc::now();
            s.last_error = last_error;
            true
        })
        .await
        .context("recording update outcome")?;
    if !held {
        tracing::warn!(run = %run_id, "update claim lost before recording the outcome");
        return Err(UpdateError::Superseded.into());
    }
    outcome
}

fn claim_state(
    s: &DockerUpdateStatus,
    processes: &impl ProcessRegistry,
    now: chrono::DateTime<Utc>,
) -> Claim {
    let view = ClaimView {
        active: s.is_checking,
        owner: s.owner.as_ref(),
        claimed_at: Some(s.timestamp),
    };
    let gone = view.owner.is_some_and(|o| processes.is_gone(o));
    assess_claim(view, gone, lease_for(STAGE_LEASE, 2), now)
}

/// Atomic check-and-set into `isChecking`; returns the claim's run id.
async fn begin_check(
    store: &impl DocumentStore<DockerUpdateStatus>,
    processes: &impl ProcessRegistry,
) -> Result<String> {
    let owner = processes.claim(lease_for(STAGE_LEASE, 1));
    let run_id = owner.run_id.clone();
    let now = Utc::now();
    let claim = store
        .update(|s| {
            let claim = claim_state(s, processes, now);
            if claim == Claim::Held {
                return claim;
            }
            s.is_checking = true;
            s.owner = Some(owner);
            s.last_error = None;
            claim
        })
        .await?;
    match claim {
        Claim::Held => Err(UpdateError::AlreadyChecking.into()),
        Claim::Abandoned(reason) => {
            tracing::warn!(reason = reason.as_str(), "took over an abandoned update check");
            Ok(run_id)
        }
        Claim::Free => Ok(run_id),
    }
}

/// Renew the lease for one more stage while `run_id` holds the claim.
async fn renew_claim(store: &impl DocumentStore<DockerUpdateStatus>, run_id: &str) -> Result<()> {
    let held = store
        .update(|s| {
            let Some(owner) = s.owner.as_mut().filter(|o| o.run_id == run_id) else {
                return false;
            };
            owner.renew(Utc::now(), lease_for(STAGE_LEASE, 1));
            true
        })
        .await?;
    if held {
        Ok(())
    } else {
        Err(UpdateError::Superseded.into())
    }
}

async fn collect_images(
    host: &impl HostExecutor,
    store: &impl DocumentStore<DockerUpdateStatus>,
    project: &ComposeProject,
    run_id: &str,
) -> Result<Vec<ImageInfo>> {
    let listed = host
        .run(&project.list_images())
        .await
        .context("listing compose images")?;
    let names = parse_image_list(&listed.stdout);
    let mut images = Vec::with_capacity(names.len());
    for name in &names {
        renew_claim(store, run_id).await?;
        images.push(check_image(host, project, name).await);
    }
    Ok(images)
}

async fn check_image(host: &impl HostExecutor, project: &ComposeProject, image: &str) -> ImageInfo {
    if !is_valid_image_ref(image) {
        tracing::warn!(image, "skipping image with unsupported reference");
        return ImageInfo::errored(image, format!("unsupported image reference: {image}"));
    }

    let current = match running_image_id(host, project, image).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(image, error = %format!("{e:#}"), "could not resolve running image");
            None
        }
    };

    let latest = async {
        host.run(&compose::pull_image(image)).await?;
        let out = host.run(&compose::local_image_id(image)).await?;
        first_non_empty_line(&out.stdout)
            .map(ToString::to_string)
            .ok_or_else(|| anyhow::anyhow!("no image id for {image} after pull"))
    }
    .await;

    match latest {
        Ok(latest) => {
            let info = ImageInfo::compared(image, current.as_deref(), &latest);
            tracing::debug!(image, status = info.status.as_str(), "image checked");
            info
        }
        Err(e) => {
            tracing::error!(image, error = %format!("{e:#}"), "image check failed");
            ImageInfo::errored(image, format!("{e:#}"))
        }
    }
}

/// Image id behind the first running container of `image`, if any.
async fn running_image_id(
    host: &impl HostExecutor,
    project: &ComposeProject,
    image: &str,
) -> Result<Option<String>> {
    let ids = host.run(&project.containers_for_image(image)).await?;
    let Some(container) = first_non_empty_line(&ids.stdout) else {
        return Ok(None);
    };
    let out = host.run(&compose::container_image_id(container)).await?;
    Ok(first_non_empty_line(&out.stdout).map(ToString::to_string))
}
