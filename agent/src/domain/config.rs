//! Agent configuration schema.
//!
//! Pure types only; loading from the environment lives in `crate::infra::config`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::domain::error::ConfigError;
use crate::domain::host::shell_quote;

// ── Defaults ─────────────────────────────────────────────────────────────────

pub const DEFAULT_HOST_USER: &str = "root";
pub const DEFAULT_SSH_KEY_PATH: &str = "/app/container_ssh_key";
pub const DEFAULT_AUTHORIZED_KEYS_PATH: &str = "/host_ssh/authorized_keys";
pub const DEFAULT_REFERENCE_DIR: &str = "/app/template-setup/root";
pub const DEFAULT_TARGET_DIR: &str = "/app/data";

/// Name of the ignore-pattern file inside the target tree.
pub const IGNORE_FILE_NAME: &str = ".ignore";

// ── Config schema ────────────────────────────────────────────────────────────

/// Agent configuration, one field per environment variable
/// (`compose_folder_path` ↔ `COMPOSE_FOLDER_PATH`).
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Host directory holding the compose project and its `scripts/` tree.
    #[serde(default)]
    pub compose_folder_path: Option<String>,

    /// Explicit host address; skips gateway detection when set.
    #[serde(default)]
    pub host_address: Option<String>,

    #[serde(default = "default_host_user")]
    pub host_user: String,

    /// Directory holding the status documents and their lock files.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_ssh_key_path")]
    pub ssh_key_path: PathBuf,

    /// Bind-mounted view of the host's `authorized_keys`.
    #[serde(default = "default_authorized_keys_path")]
    pub authorized_keys_path: PathBuf,

    #[serde(default = "default_reference_dir")]
    pub reference_dir: PathBuf,

    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,

    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,

    #[serde(default = "default_ssh_connect_timeout_secs")]
    pub ssh_connect_timeout_secs: u64,

    /// Local hour (0-23) of the daily maintenance cycle.
    #[serde(default = "default_check_hour")]
    pub check_hour: u32,
}

fn default_host_user() -> String {
    DEFAULT_HOST_USER.to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_ssh_key_path() -> PathBuf {
    PathBuf::from(DEFAULT_SSH_KEY_PATH)
}

fn default_authorized_keys_path() -> PathBuf {
    PathBuf::from(DEFAULT_AUTHORIZED_KEYS_PATH)
}

fn default_reference_dir() -> PathBuf {
    PathBuf::from(DEFAULT_REFERENCE_DIR)
}

fn default_target_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TARGET_DIR)
}

fn default_script_timeout_secs() -> u64 {
    20 * 60
}

fn default_ssh_connect_timeout_secs() -> u64 {
    30
}

fn default_check_hour() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            compose_folder_path: None,
            host_address: None,
            host_user: default_host_user(),
            state_dir: default_state_dir(),
            ssh_key_path: default_ssh_key_path(),
            authorized_keys_path: default_authorized_keys_path(),
            reference_dir: default_reference_dir(),
            target_dir: default_target_dir(),
            script_timeout_secs: default_script_timeout_secs(),
            ssh_connect_timeout_secs: default_ssh_connect_timeout_secs(),
            check_hour: default_check_hour(),
        }
    }
}

impl AgentConfig {
    /// Reject values that would make the agent misbehave at runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric setting is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.check_hour > 23 {
            return Err(ConfigError::InvalidValue {
                key: "CHECK_HOUR".into(),
                value: self.check_hour.to_string(),
                valid: "0-23".into(),
            }
            .into());
        }
        if self.script_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SCRIPT_TIMEOUT_SECS".into(),
                value: "0".into(),
                valid: "a positive number of seconds".into(),
            }
            .into());
        }
        Ok(())
    }

    /// The compose project directory on the host.
    ///
    /// # Errors
    ///
    /// Returns an error if `COMPOSE_FOLDER_PATH` is not set.
    pub fn compose_dir(&self) -> Result<&str> {
        self.compose_folder_path
            .as_deref()
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::Missing("COMPOSE_FOLDER_PATH".into()).into())
    }

    /// Host-side layout of the self-check scripts.
    ///
    /// # Errors
    ///
    /// Returns an error if `COMPOSE_FOLDER_PATH` is not set.
    pub fn script_layout(&self) -> Result<ScriptLayout> {
        let root = format!("{}/scripts", self.compose_dir()?);
        Ok(ScriptLayout {
            wrapper: format!("{root}/tools/execute_script_with_log.sh"),
            list_file: format!("{root}/self-check/scripts.list"),
            script_dir: format!("{root}/self-check"),
        })
    }

    #[must_use]
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }

    #[must_use]
    pub fn ssh_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_connect_timeout_secs)
    }

    #[must_use]
    pub fn ignore_file(&self) -> PathBuf {
        self.target_dir.join(IGNORE_FILE_NAME)
    }
}

/// Where the remediation scripts live on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLayout {
    /// Wrapper that runs a script and captures its log.
    pub wrapper: String,
    /// Newline-delimited, ordered script list.
    pub list_file: String,
    pub script_dir: String,
}

impl ScriptLayout {
    /// Shell command running `script` through the logging wrapper.
    #[must_use]
    pub fn command_for(&self, script: &str) -> String {
        format!(
            "{} {}",
            shell_quote(&self.wrapper),
            shell_quote(&format!("{}/{script}", self.script_dir))
        )
    }
}
