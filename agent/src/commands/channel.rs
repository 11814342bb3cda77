//! Update channel commands.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::application::services::channel::{get_update_channel, set_update_channel};
use crate::output::json;

#[derive(Args)]
pub struct ChannelArgs {
    #[command(subcommand)]
    pub command: Option<ChannelCommand>,
}

#[derive(Subcommand)]
pub enum ChannelCommand {
    /// Show the current update URL (default)
    Get,
    /// Set the update URL
    Set(SetArgs),
}

#[derive(Args)]
pub struct SetArgs {
    /// New value for UPDATE_URL
    pub url: String,
}

/// Run the given channel subcommand.
///
/// # Errors
///
/// Returns an error if `COMPOSE_FOLDER_PATH` is unset, the URL spans lines,
/// or the host cannot read or write the `.env` file.
pub async fn run(app: &AppContext, args: ChannelArgs) -> Result<()> {
    let compose_dir = app.compose_dir()?;
    let host = app.host().await;
    match args.command.unwrap_or(ChannelCommand::Get) {
        ChannelCommand::Get => {
            let url = get_update_channel(&host, compose_dir).await?;
            if app.is_json() {
                json::print(&serde_json::json!({ "updateUrl": url }))
            } else {
                app.renderer().render_channel(url.as_deref());
                Ok(())
            }
        }
        ChannelCommand::Set(SetArgs { url }) => {
            set_update_channel(&host, compose_dir, &url).await?;
            if app.is_json() {
                json::print(&serde_json::json!({ "success": true, "updateUrl": url }))
            } else {
                app.renderer().render_channel_saved(&url);
                Ok(())
            }
        }
    }
}
