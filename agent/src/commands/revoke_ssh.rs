//! SSH revoke command implementation.

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::maintenance::revoke_access;
use crate::output::json;

/// Remove the agent's keys from the host without installing a new one.
///
/// # Errors
///
/// Returns an error if the authorized-keys file cannot be read or written.
pub async fn run(app: &AppContext) -> Result<()> {
    let report = revoke_access(&app.identity()).await?;
    if app.is_json() {
        json::print(&serde_json::json!({
            "removed": report.removed,
            "authorizedKeys": report.inventory.len(),
        }))
    } else {
        app.renderer().render_revoke(&report);
        Ok(())
    }
}
