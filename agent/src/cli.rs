//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, OutputFlags};
use crate::commands;
use crate::infra;

/// Keeps a host's docker-compose stack healthy and up to date
#[derive(Parser)]
#[command(
    name = "stackwarden",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR", value_parser = clap::builder::FalseyValueParser::new())]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision SSH access, then run maintenance now and daily
    Daemon(commands::daemon::DaemonArgs),

    /// Generate the agent key and authorize it on the host
    SetupSsh,

    /// Remove the agent's keys from the host's authorized keys
    RevokeSsh,

    /// Reconcile the data tree and run the host self-check scripts
    SelfCheck,

    /// Compare running images with the latest available ones
    CheckUpdates,

    /// Pull images and recreate the compose stack on the host
    ApplyUpdate,

    /// Show the last self-check and update-check results
    Status(commands::status::StatusArgs),

    /// Show or change the update URL in the compose project's .env
    Channel(commands::channel::ChannelArgs),
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid or the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            no_color,
            quiet,
            json,
            command,
        } = self;
        let config = infra::config::load()?;
        let app = AppContext::new(
            &OutputFlags {
                no_color,
                quiet,
                json,
            },
            config,
        );
        match command {
            Command::Daemon(args) => commands::daemon::run(&app, &args).await,
            Command::SetupSsh => commands::setup_ssh::run(&app).await,
            Command::RevokeSsh => commands::revoke_ssh::run(&app).await,
            Command::SelfCheck => commands::self_check::run(&app).await,
            Command::CheckUpdates => commands::update::check(&app).await,
            Command::ApplyUpdate => commands::update::apply(&app).await,
            Command::Status(args) => commands::status::run(&app, &args).await,
            Command::Channel(args) => commands::channel::run(&app, args).await,
        }
    }
}
