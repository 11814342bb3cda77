//! SSH setup command implementation.

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::maintenance::provision_access;
use crate::output::json;

/// Generate a fresh agent key and authorize it on the host.
///
/// # Errors
///
/// Returns an error if `ssh-keygen` fails or the authorized-keys file
/// cannot be written.
pub async fn run(app: &AppContext) -> Result<()> {
    let report = provision_access(&app.identity()).await?;
    if app.is_json() {
        let agent = report.inventory.iter().filter(|k| k.agent_key).count();
        json::print(&serde_json::json!({
            "removed": report.removed,
            "authorizedKeys": report.inventory.len(),
            "agentKeys": agent,
        }))
    } else {
        app.renderer().render_provision(&report);
        Ok(())
    }
}
