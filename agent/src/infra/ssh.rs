//! SSH bridge to the host: command execution, keypair management, and host
//! address detection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, HostExecutor, HostOutput, KeyProvisioner};
use crate::domain::HostError;
use crate::domain::host::{
    AGENT_KEY_MARKER, FALLBACK_HOST, SshTarget, parse_default_gateway, replace_agent_keys,
    strip_agent_keys,
};

/// Kernel routing table inside the container.
pub const ROUTE_TABLE_PATH: &str = "/proc/net/route";

/// `ssh` exits with this code when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Runs host commands as one-shot `ssh` invocations.
pub struct SshHostExecutor<R> {
    target: SshTarget,
    runner: R,
    default_timeout: Duration,
}

impl<R: CommandRunner> SshHostExecutor<R> {
    #[must_use]
    pub fn new(target: SshTarget, runner: R, default_timeout: Duration) -> Self {
        Self {
            target,
            runner,
            default_timeout,
        }
    }

    #[must_use]
    pub fn target(&self) -> &SshTarget {
        &self.target
    }
}

impl<R: CommandRunner> HostExecutor for SshHostExecutor<R> {
    async fn run(&self, command: &str) -> Result<HostOutput> {
        self.run_with_timeout(command, self.default_timeout).await
    }

    async fn run_with_timeout(&self, command: &str, timeout: Duration) -> Result<HostOutput> {
        let args = self.target.ssh_args(command);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!(host = %self.target.host, command, "running host command");

        let output = match self.runner.run_with_timeout("ssh", &arg_refs, timeout).await {
            Ok(output) => output,
            Err(e) => {
                let timed_out = e
                    .downcast_ref::<HostError>()
                    .is_some_and(HostError::is_timeout);
                return Err(if timed_out {
                    HostError::Timeout {
                        command: command.to_string(),
                        timeout,
                    }
                } else {
                    HostError::CommandFailed {
                        command: command.to_string(),
                        cause: format!("{e:#}"),
                    }
                }
                .into());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            let detail = stderr.trim();
            let cause = match output.status.code() {
                Some(SSH_CONNECTION_FAILURE) => format!("connection failed: {detail}"),
                Some(code) if detail.is_empty() => format!("exit status {code}"),
                Some(code) => format!("exit status {code}: {detail}"),
                None => "terminated by signal".to_string(),
            };
            return Err(HostError::CommandFailed {
                command: command.to_string(),
                cause,
            }
            .into());
        }
        Ok(HostOutput { stdout, stderr })
    }
}

/// Agent keypair plus the bind-mounted host `authorized_keys` file.
pub struct SshIdentity<R> {
    key_path: PathBuf,
    authorized_keys_path: PathBuf,
    runner: R,
}

impl<R: CommandRunner> SshIdentity<R> {
    #[must_use]
    pub fn new(key_path: PathBuf, authorized_keys_path: PathBuf, runner: R) -> Self {
        Self {
            key_path,
            authorized_keys_path,
            runner,
        }
    }

    /// Written in place: the file is usually a single-file bind mount,
    /// which cannot be replaced by rename.
    async fn write_authorized_keys(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.authorized_keys_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&self.authorized_keys_path, content)
            .await
            .with_context(|| format!("writing {}", self.authorized_keys_path.display()))?;
        set_owner_only(&self.authorized_keys_path).await
    }

    fn public_key_path(&self) -> PathBuf {
        let mut name = self.key_path.clone().into_os_string();
        name.push(".pub");
        PathBuf::from(name)
    }
}

impl<R: CommandRunner> KeyProvisioner for SshIdentity<R> {
    async fn generate_keypair(&self) -> Result<String> {
        let pub_path = self.public_key_path();
        for stale in [&self.key_path, &pub_path] {
            match tokio::fs::remove_file(stale).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("removing old key {}", stale.display()));
                }
            }
        }
        if let Some(parent) = self.key_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let comment = format!("{AGENT_KEY_MARKER}-{}", chrono::Utc::now().timestamp());
        let key_path = self.key_path.display().to_string();
        let output = self
            .runner
            .run(
                "ssh-keygen",
                &["-q", "-t", "ed25519", "-N", "", "-C", &comment, "-f", &key_path],
            )
            .await
            .context("running ssh-keygen")?;
        anyhow::ensure!(
            output.status.success(),
            "ssh-keygen failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );

        let public_key = tokio::fs::read_to_string(&pub_path)
            .await
            .with_context(|| format!("reading {}", pub_path.display()))?;
        tracing::info!(key = %key_path, comment = %comment, "generated agent keypair");
        Ok(public_key.trim().to_string())
    }

    async fn install_public_key(&self, public_key: &str) -> Result<usize> {
        let existing = self.authorized_keys().await?;
        let (content, removed) = replace_agent_keys(&existing, AGENT_KEY_MARKER, public_key);
        self.write_authorized_keys(&content).await?;
        tracing::info!(
            path = %self.authorized_keys_path.display(),
            removed,
            "installed agent public key",
        );
        Ok(removed)
    }

    async fn revoke_agent_keys(&self) -> Result<usize> {
        let existing = self.authorized_keys().await?;
        let (content, removed) = strip_agent_keys(&existing, AGENT_KEY_MARKER);
        if removed == 0 {
            tracing::info!("no agent keys to revoke");
            return Ok(0);
        }
        self.write_authorized_keys(&content).await?;
        tracing::info!(
            path = %self.authorized_keys_path.display(),
            removed,
            "revoked agent keys",
        );
        Ok(removed)
    }

    async fn authorized_keys(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.authorized_keys_path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e)
                .with_context(|| format!("reading {}", self.authorized_keys_path.display())),
        }
    }
}

#[cfg(unix)]
async fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .with_context(|| format!("setting permissions on {}", path.display()))
}

#[cfg(not(unix))]
async fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

/// Host address: the explicit setting, else the default gateway from
/// `route_table`, else [`FALLBACK_HOST`].
pub async fn resolve_host_address(explicit: Option<&str>, route_table: &Path) -> String {
    if let Some(addr) = explicit.map(str::trim).filter(|a| !a.is_empty()) {
        return addr.to_string();
    }
    let gateway = tokio::fs::read_to_string(route_table)
        .await
        .ok()
        .and_then(|table| parse_default_gateway(&table));
    match gateway {
        Some(gw) => {
            tracing::debug!(gateway = %gw, "using default gateway as host address");
            gw
        }
        None => {
            tracing::warn!(fallback = FALLBACK_HOST, "no default gateway found");
            FALLBACK_HOST.to_string()
        }
    }
}
