//! Update check and apply commands.

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::update::{ApplyOutcome, apply_update, check_for_updates};
use crate::output::json;

/// Check every compose image for a newer version.
///
/// # Errors
///
/// Returns an error if a check is already running, the image list cannot be
/// read from the host, or the status document cannot be updated.
pub async fn check(app: &AppContext) -> Result<()> {
    let compose_dir = app.compose_dir()?;
    let host = app.host().await;
    let status = check_for_updates(&host, &app.update_store, &app.processes, compose_dir).await?;

    if app.is_json() {
        json::print(&status)
    } else {
        app.renderer().render_updates(&status);
        Ok(())
    }
}

/// Pull and recreate the stack on the host.
///
/// # Errors
///
/// Returns an error if a check is running or both the detached dispatch
/// and the synchronous fallback fail.
pub async fn apply(app: &AppContext) -> Result<()> {
    let compose_dir = app.compose_dir()?;
    let host = app.host().await;
    let outcome = apply_update(&host, &app.update_store, &app.processes, compose_dir).await?;

    if app.is_json() {
        let value = match &outcome {
            ApplyOutcome::Initiated { log_path } => serde_json::json!({
                "status": "initiated",
                "message": "Docker update started on host system",
                "logPath": log_path,
            }),
            ApplyOutcome::Completed { output } => serde_json::json!({
                "status": "completed",
                "message": "Docker update completed via fallback method",
                "output": output,
            }),
        };
        json::print(&value)
    } else {
        app.renderer().render_apply(&outcome);
        Ok(())
    }
}
