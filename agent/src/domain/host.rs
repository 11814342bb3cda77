//! Host bridge rules: SSH invocation shape, authorized-keys rewriting, and
//! default-gateway parsing. Pure functions only.

use std::path::PathBuf;
use std::time::Duration;

/// Comment tag carried by every key this agent installs.
pub const AGENT_KEY_MARKER: &str = "stackwarden-agent";

/// Address used when no gateway can be detected.
pub const FALLBACK_HOST: &str = "host.docker.internal";

/// Text echoed by the reachability probe.
pub const PROBE_TOKEN: &str = "stackwarden-ssh-ok";

/// Where and as whom host commands run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub key_path: PathBuf,
    pub connect_timeout: Duration,
}

impl SshTarget {
    /// Arguments for a one-shot, non-interactive `ssh` invocation of `command`.
    #[must_use]
    pub fn ssh_args(&self, command: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key_path.display().to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            format!("{}@{}", self.user, self.host),
            command.to_string(),
        ]
    }
}

/// Quote `s` for safe interpolation into a POSIX shell command.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@=+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Rewrite an `authorized_keys` file: drop every line tagged with `marker`,
/// keep all other lines verbatim, append `public_key`.
///
/// Returns the new content and the number of agent keys removed.
#[must_use]
pub fn replace_agent_keys(existing: &str, marker: &str, public_key: &str) -> (String, usize) {
    let (kept, removed) = strip_agent_keys(existing, marker);
    let mut out = kept;
    out.push_str(public_key.trim());
    out.push('\n');
    (out, removed)
}

/// Drop every line tagged with `marker`. Trailing blank lines are removed;
/// the result ends with a newline unless empty.
#[must_use]
pub fn strip_agent_keys(existing: &str, marker: &str) -> (String, usize) {
    let mut removed = 0;
    let mut kept: Vec<&str> = Vec::new();
    for line in existing.lines() {
        if line.contains(marker) {
            removed += 1;
        } else {
            kept.push(line);
        }
    }
    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    (out, removed)
}

/// One line of an `authorized_keys` file, without key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub agent_key: bool,
    pub comment: String,
}

/// Summarize installed keys for logging.
#[must_use]
pub fn key_inventory(content: &str, marker: &str) -> Vec<KeyEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|line| KeyEntry {
            agent_key: line.contains(marker),
            comment: line
                .split_whitespace()
                .nth(2)
                .unwrap_or("no-comment")
                .to_string(),
        })
        .collect()
}

/// Extract the default gateway from `/proc/net/route` content.
///
/// Addresses in that file are little-endian hex, e.g. `0100A8C0` is
/// `192.168.0.1`.
#[must_use]
pub fn parse_default_gateway(route_table: &str) -> Option<String> {
    route_table.lines().skip(1).find_map(|line| {
        let mut fields = line.split_whitespace();
        let _iface = fields.next()?;
        let destination = fields.next()?;
        let gateway = fields.next()?;
        if destination != "00000000" {
            return None;
        }
        let raw = u32::from_str_radix(gateway, 16).ok()?;
        if raw == 0 {
            return None;
        }
        let [a, b, c, d] = raw.to_le_bytes();
        Some(format!("{a}.{b}.{c}.{d}"))
    })
}
