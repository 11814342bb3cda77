//! Ignore patterns for tree reconciliation.
//!
//! Patterns are shell-style globs (`*` any run of characters including `/`,
//! `?` any single character), one per line; blank lines and `#` comments are
//! skipped. A path is ignored when a pattern matches either its full relative
//! path or its file name.

use regex::Regex;

/// Compiled ignore patterns.
#[derive(Debug, Default)]
pub struct IgnoreRules {
    patterns: Vec<(String, Regex)>,
}

impl IgnoreRules {
    /// Parse the contents of an ignore file.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let patterns = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|glob| glob_to_regex(glob).map(|re| (glob.to_string(), re)))
            .collect();
        Self { patterns }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// `true` if `relative` (a `/`-separated path) should be left alone.
    #[must_use]
    pub fn is_ignored(&self, relative: &str) -> bool {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        self.patterns
            .iter()
            .any(|(_, re)| re.is_match(relative) || re.is_match(name))
    }
}

fn glob_to_regex(glob: &str) -> Option<Regex> {
    let body = regex::escape(glob).replace(r"\*", ".*").replace(r"\?", ".");
    Regex::new(&format!("^{body}$")).ok()
}
