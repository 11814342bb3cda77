//! Status command implementation.
//!
//! Reads both status documents without taking any lock, so it answers
//! immediately even while a self-check or update check is running.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use stackwarden_common::{DockerUpdateStatus, SelfCheckStatus, SelfCheckSummary};

use crate::app::AppContext;
use crate::application::services::self_check::get_self_check_status;
use crate::application::services::update::get_last_update_status;
use crate::output::json;

/// Arguments for the status command.
#[derive(Args, Default)]
pub struct StatusArgs {
    /// Show only the self-check document
    #[arg(long, conflicts_with = "updates")]
    pub self_check: bool,

    /// Show only the update-check document
    #[arg(long)]
    pub updates: bool,
}

/// Combined JSON document printed by `status --json`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_check: Option<SelfCheckStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SelfCheckSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_update: Option<DockerUpdateStatus>,
}

/// Run the status command.
///
/// # Errors
///
/// Returns an error if a status document cannot be read.
pub async fn run(app: &AppContext, args: &StatusArgs) -> Result<()> {
    let self_check = if args.updates {
        None
    } else {
        Some(get_self_check_status(&app.self_check_store).await?)
    };
    let docker_update = if args.self_check {
        None
    } else {
        Some(get_last_update_status(&app.update_store).await?)
    };

    if app.is_json() {
        return json::print(&StatusOutput {
            summary: self_check.as_ref().map(SelfCheckStatus::summary),
            self_check,
            docker_update,
        });
    }

    let renderer = app.renderer();
    if let Some(status) = &self_check {
        renderer.render_self_check(status);
    }
    if self_check.is_some() && docker_update.is_some() && !app.output.quiet {
        println!();
    }
    if let Some(status) = &docker_update {
        renderer.render_updates(status);
    }
    Ok(())
}
