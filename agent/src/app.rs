//! Application context: unified state passed to every command handler.
//!
//! Built once in `Cli::run()` from the global flags and the environment
//! configuration; command handlers borrow it and construct the host-facing
//! adapters on demand.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use stackwarden_common::{DockerUpdateStatus, SelfCheckStatus};

use crate::application::services::self_check::SelfCheckOptions;
use crate::domain::{AgentConfig, ScriptLayout, SshTarget};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::process::LocalProcesses;
use crate::infra::reconcile::FsReconciler;
use crate::infra::ssh::{ROUTE_TABLE_PATH, SshHostExecutor, SshIdentity, resolve_host_address};
use crate::infra::state::JsonStore;
use crate::output::{HumanRenderer, OutputContext};

/// Default limit for host commands that are not scripts (pulls included).
pub const HOST_COMMAND_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    pub mode: OutputMode,
    pub config: AgentConfig,
    pub self_check_store: JsonStore<SelfCheckStatus>,
    pub update_store: JsonStore<DockerUpdateStatus>,
    /// Claims for this process's runs and liveness of other claimants.
    pub processes: LocalProcesses,
}

impl AppContext {
    #[must_use]
    pub fn new(flags: &OutputFlags, config: AgentConfig) -> Self {
        let mode = if flags.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };
        Self {
            output: OutputContext::new(flags.no_color, flags.quiet),
            mode,
            self_check_store: JsonStore::open(&config.state_dir),
            update_store: JsonStore::open(&config.state_dir),
            processes: LocalProcesses::new(),
            config,
        }
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    #[must_use]
    pub fn renderer(&self) -> HumanRenderer<'_> {
        HumanRenderer::new(&self.output)
    }

    /// SSH executor for the detected host.
    pub async fn host(&self) -> SshHostExecutor<TokioCommandRunner> {
        let host = resolve_host_address(
            self.config.host_address.as_deref(),
            &PathBuf::from(ROUTE_TABLE_PATH),
        )
        .await;
        let target = SshTarget {
            host,
            user: self.config.host_user.clone(),
            key_path: self.config.ssh_key_path.clone(),
            connect_timeout: self.config.ssh_connect_timeout(),
        };
        SshHostExecutor::new(target, TokioCommandRunner::default(), HOST_COMMAND_TIMEOUT)
    }

    #[must_use]
    pub fn identity(&self) -> SshIdentity<TokioCommandRunner> {
        SshIdentity::new(
            self.config.ssh_key_path.clone(),
            self.config.authorized_keys_path.clone(),
            TokioCommandRunner::default(),
        )
    }

    #[must_use]
    pub fn reconciler(&self) -> FsReconciler {
        FsReconciler::new(
            self.config.reference_dir.clone(),
            self.config.target_dir.clone(),
            self.config.ignore_file(),
        )
    }

    /// Compose directory on the host.
    ///
    /// # Errors
    ///
    /// Returns an error if `COMPOSE_FOLDER_PATH` is not set.
    pub fn compose_dir(&self) -> Result<&str> {
        self.config.compose_dir()
    }

    /// Script layout under the compose directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `COMPOSE_FOLDER_PATH` is not set.
    pub fn script_layout(&self) -> Result<ScriptLayout> {
        self.config.script_layout()
    }

    #[must_use]
    pub fn self_check_options<'a>(&self, layout: &'a ScriptLayout) -> SelfCheckOptions<'a> {
        SelfCheckOptions {
            layout,
            script_timeout: self.config.script_timeout(),
        }
    }
}
