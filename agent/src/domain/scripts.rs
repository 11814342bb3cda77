//! Self-check script list: parsing and the built-in fallback order.

/// Built-in script order, used when the host has no `scripts.list`.
///
/// Order matters: later scripts assume earlier ones succeeded.
pub const DEFAULT_SCRIPTS: &[&str] = &[
    "ensure-pcs-user.sh",
    "ensure-script-executable.sh",
    "ensure-ubuntu-up-to-date.sh",
    "ensure-common-tools-installed.sh",
    "ensure-ssh.sh",
    "ensure-vm-scalable.sh",
    "ensure-qemu-agent.sh",
    "ensure-data-partition.sh",
    "ensure-data-partition-size.sh",
    "ensure-swap.sh",
    "ensure-self-check-at-reboot.sh",
    "ensure-docker-installed.sh",
    "ensure-template-version.sh",
    "ensure-user-docker-compose-updated.sh",
    "ensure-user-compose-pulled.sh",
    "ensure-user-compose-stack-up.sh",
];

/// Parse a newline-delimited script list, keeping order.
///
/// Blank lines and `#` comments are skipped. Entries containing a path
/// separator or whitespace are rejected so a list cannot escape the script
/// directory or smuggle extra shell words.
#[must_use]
pub fn parse_script_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| is_valid_script_name(l))
        .map(ToString::to_string)
        .collect()
}

/// Non-comment entries that [`parse_script_list`] drops as unsafe names.
#[must_use]
pub fn rejected_entries(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| !is_valid_script_name(l))
        .map(ToString::to_string)
        .collect()
}

#[must_use]
pub fn is_valid_script_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c))
}

#[must_use]
pub fn default_scripts() -> Vec<String> {
    DEFAULT_SCRIPTS.iter().map(ToString::to_string).collect()
}
