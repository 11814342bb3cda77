//! Long-running agent: provision access, run maintenance at startup and
//! then once a day until interrupted.

use anyhow::Result;
use chrono::Local;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::maintenance::{
    self, MaintenanceContext, ProbePolicy, provision_access, wait_until_reachable,
};
use crate::application::services::self_check::recover_interrupted_run;
use crate::application::services::update::recover_interrupted_check;
use crate::domain::schedule::next_daily_run;

/// Arguments for the daemon command.
#[derive(Args, Default)]
pub struct DaemonArgs {
    /// Keep the existing key instead of generating a new one
    #[arg(long)]
    pub skip_ssh_setup: bool,

    /// Wait for the first scheduled cycle instead of running one now
    #[arg(long)]
    pub no_initial_check: bool,
}

/// Run the daemon until Ctrl-C / SIGINT.
///
/// # Errors
///
/// Returns an error if configuration is incomplete or the status documents
/// cannot be initialized. Failures inside a maintenance cycle are logged.
pub async fn run(app: &AppContext, args: &DaemonArgs) -> Result<()> {
    let compose_dir = app.compose_dir()?;
    let layout = app.script_layout()?;

    app.self_check_store.initialize().await?;
    app.update_store.initialize().await?;
    let self_check = app.self_check_options(&layout);
    recover_interrupted_run(&app.self_check_store, &app.processes, &self_check).await?;
    recover_interrupted_check(&app.update_store, &app.processes).await?;

    if !args.skip_ssh_setup {
        if let Err(e) = provision_access(&app.identity()).await {
            tracing::error!(error = %format!("{e:#}"), "SSH setup failed");
        }
    }

    let host = app.host().await;
    tracing::info!(host = %host.target().host, "agent started");
    if let Err(e) = wait_until_reachable(&host, ProbePolicy::default()).await {
        tracing::error!(error = %format!("{e:#}"), "continuing without a confirmed connection");
    }

    let reconciler = app.reconciler();
    let ctx = MaintenanceContext {
        host: &host,
        self_check_store: &app.self_check_store,
        update_store: &app.update_store,
        reconciler: &reconciler,
        processes: &app.processes,
        self_check,
        compose_dir,
    };

    if !args.no_initial_check {
        let report = maintenance::check(&ctx).await;
        tracing::info!(?report, "startup maintenance finished");
    }

    loop {
        let now = Local::now();
        let Some(next) = next_daily_run(&now, app.config.check_hour) else {
            anyhow::bail!("no valid schedule for hour {}", app.config.check_hour);
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(next = %next.to_rfc3339(), "next maintenance scheduled");

        tokio::select! {
            () = tokio::time::sleep(wait) => {
                let report = maintenance::check(&ctx).await;
                tracing::info!(?report, "scheduled maintenance finished");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }
}
