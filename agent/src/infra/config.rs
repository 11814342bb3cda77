//! Environment-backed configuration loading.
//!
//! Each `AgentConfig` field maps to an upper-case variable of the same name:
//!   - `COMPOSE_FOLDER_PATH`       (required by update and self-check)
//!   - `HOST_ADDRESS`              (optional, skips gateway detection)
//!   - `HOST_USER`                 (default `root`)
//!   - `STATE_DIR`                 (default `.`)
//!   - `SSH_KEY_PATH`, `AUTHORIZED_KEYS_PATH`
//!   - `REFERENCE_DIR`, `TARGET_DIR`
//!   - `SCRIPT_TIMEOUT_SECS`, `SSH_CONNECT_TIMEOUT_SECS`, `CHECK_HOUR`

use anyhow::{Context, Result};

use crate::domain::AgentConfig;

/// Load and validate the agent configuration from the process environment.
///
/// # Errors
///
/// Returns an error if a variable cannot be parsed or a value is out of range.
pub fn load() -> Result<AgentConfig> {
    from_iter(std::env::vars())
}

/// Same as [`load`] but from an explicit variable set.
///
/// # Errors
///
/// Returns an error if a variable cannot be parsed or a value is out of range.
pub fn from_iter<I>(vars: I) -> Result<AgentConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let config: AgentConfig = envy::from_iter(vars)
        .context("failed to load agent configuration from environment")?;
    config.validate()?;
    tracing::debug!(
        compose = config.compose_folder_path.as_deref().unwrap_or("<unset>"),
        host = config.host_address.as_deref().unwrap_or("<auto>"),
        state_dir = %config.state_dir.display(),
        "configuration loaded",
    );
    Ok(config)
}
