//! Self-check command implementation.

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::self_check::run_self_check;
use crate::output::json;

/// Run one self-check and print the finalized document.
///
/// # Errors
///
/// Returns an error if a run is already in progress, the host is
/// unreachable, or the status document cannot be updated.
pub async fn run(app: &AppContext) -> Result<()> {
    let layout = app.script_layout()?;
    let host = app.host().await;
    let reconciler = app.reconciler();
    let opts = app.self_check_options(&layout);

    if !app.is_json() {
        app.output.info("Running self-check; this can take a while");
    }
    let status = run_self_check(
        &host,
        &app.self_check_store,
        &reconciler,
        &app.processes,
        &opts,
    )
    .await?;

    if app.is_json() {
        json::print(&status)
    } else {
        app.renderer().render_self_check(&status);
        Ok(())
    }
}
