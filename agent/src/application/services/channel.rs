//! Application service: read and change the stack's update channel.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};

use crate::application::ports::HostExecutor;
use crate::domain::channel::{
    env_file_path, is_valid_update_url, read_env_file, read_update_url, set_update_url,
    write_env_file,
};
use crate::domain::error::UpdateError;

/// Current `UPDATE_URL` of the compose project, or `None` when the `.env`
/// file or the entry is missing.
///
/// # Errors
///
/// Returns an error if the host cannot be reached.
pub async fn get_update_channel(
    host: &impl HostExecutor,
    compose_dir: &str,
) -> Result<Option<String>> {
    let path = env_file_path(compose_dir);
    let out = host
        .run(&read_env_file(&path))
        .await
        .with_context(|| format!("reading {path} on host"))?;
    Ok(read_update_url(&out.stdout))
}

/// Point the compose project at `url`, keeping every other `.env` entry.
///
/// # Errors
///
/// Returns [`UpdateError::InvalidChannelUrl`] if `url` spans lines, or the
/// host error if the file cannot be read or written.
pub async fn set_update_channel(
    host: &impl HostExecutor,
    compose_dir: &str,
    url: &str,
) -> Result<()> {
    if !is_valid_update_url(url) {
        return Err(UpdateError::InvalidChannelUrl.into());
    }
    let path = env_file_path(compose_dir);
    let current = host
        .run(&read_env_file(&path))
        .await
        .with_context(|| format!("reading {path} on host"))?;
    let updated = set_update_url(&current.stdout, url);
    host.run(&write_env_file(&path, &updated))
        .await
        .with_context(|| format!("writing {path} on host"))?;
    tracing::info!(path = %path, url, "update channel saved");
    Ok(())
}
