//! Update channel: the `UPDATE_URL` entry of the compose project's `.env`.

use crate::domain::host::shell_quote;

pub const UPDATE_URL_KEY: &str = "UPDATE_URL";

/// `.env` file of the compose project at `compose_dir`.
#[must_use]
pub fn env_file_path(compose_dir: &str) -> String {
    format!("{}/.env", compose_dir.trim_end_matches('/'))
}

/// Host command printing the `.env` file; a missing file prints nothing.
#[must_use]
pub fn read_env_file(path: &str) -> String {
    format!("cat {} 2>/dev/null || true", shell_quote(path))
}

/// Host command replacing the `.env` file with `content`, creating its
/// directory first. The file is rewritten in place.
#[must_use]
pub fn write_env_file(path: &str, content: &str) -> String {
    let dir = path.rsplit_once('/').map_or(".", |(dir, _)| dir);
    let dir = if dir.is_empty() { "/" } else { dir };
    format!(
        "mkdir -p {} && printf '%s' {} > {}",
        shell_quote(dir),
        shell_quote(content),
        shell_quote(path)
    )
}

/// Value of the first `UPDATE_URL=` line; an empty value reads as unset.
#[must_use]
pub fn read_update_url(env: &str) -> Option<String> {
    env.lines()
        .find_map(|line| line.strip_prefix(UPDATE_URL_KEY)?.strip_prefix('='))
        .map(|value| value.trim_end_matches('\r').to_string())
        .filter(|value| !value.is_empty())
}

/// Set `UPDATE_URL` in `.env` content.
///
/// The first existing `UPDATE_URL=` line is replaced in place; otherwise
/// the entry is appended. Every other line is kept verbatim. The result
/// ends with a newline.
#[must_use]
pub fn set_update_url(env: &str, url: &str) -> String {
    let prefix = format!("{UPDATE_URL_KEY}=");
    let entry = format!("{prefix}{url}");
    let mut lines: Vec<&str> = env.lines().collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let mut out: Vec<String> = lines.iter().map(ToString::to_string).collect();
    match lines.iter().position(|l| l.starts_with(&prefix)) {
        Some(index) => out[index] = entry,
        None => out.push(entry),
    }
    let mut content = out.join("\n");
    content.push('\n');
    content
}

/// An update URL must fit on one `.env` line.
#[must_use]
pub fn is_valid_update_url(url: &str) -> bool {
    !url.chars().any(char::is_control)
}
