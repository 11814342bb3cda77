//! Docker compose command construction and output parsing.
//!
//! Commands are plain strings executed by the host shell over SSH; every
//! interpolated value goes through [`shell_quote`] or is validated first.

use crate::domain::host::shell_quote;

/// Host log file receiving the output of a detached update.
pub const UPDATE_LOG_PATH: &str = "/tmp/docker_update.log";

/// Marker line the detached update prints on completion.
pub const UPDATE_DONE_MESSAGE: &str = "Docker update completed successfully";

/// Commands scoped to one compose project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    dir: String,
}

impl ComposeProject {
    #[must_use]
    pub fn new(dir: &str) -> Self {
        Self {
            dir: dir.to_string(),
        }
    }

    fn cd(&self) -> String {
        format!("cd {}", shell_quote(&self.dir))
    }

    #[must_use]
    pub fn list_images(&self) -> String {
        format!("{} && docker compose config --images", self.cd())
    }

    /// Ids of the project's containers running `image` (one per line, others blank).
    #[must_use]
    pub fn containers_for_image(&self, image: &str) -> String {
        format!(
            "{} && docker compose ps -q | xargs -r docker inspect -f \
             '{{{{if eq .Config.Image \"{image}\"}}}}{{{{.Id}}}}{{{{end}}}}'",
            self.cd()
        )
    }

    #[must_use]
    pub fn pull_all(&self) -> String {
        format!("{} && docker compose pull", self.cd())
    }

    /// Fire-and-forget `up -d` that outlives the SSH session and the agent.
    #[must_use]
    pub fn detached_up(&self) -> String {
        let script = format!(
            "{} && docker compose up -d && echo \"{UPDATE_DONE_MESSAGE}\"",
            self.cd()
        );
        format!(
            "nohup sh -c {} > {UPDATE_LOG_PATH} 2>&1 < /dev/null &",
            shell_quote(&script)
        )
    }

    #[must_use]
    pub fn pull_and_up(&self) -> String {
        format!(
            "{cd} && docker compose pull && docker compose up -d",
            cd = self.cd()
        )
    }
}

/// Image id of a container.
#[must_use]
pub fn container_image_id(container_id: &str) -> String {
    format!("docker inspect --format '{{{{.Image}}}}' {}", shell_quote(container_id))
}

#[must_use]
pub fn pull_image(image: &str) -> String {
    format!("docker pull {} --quiet", shell_quote(image))
}

#[must_use]
pub fn local_image_id(image: &str) -> String {
    format!("docker image inspect {} --format '{{{{.Id}}}}'", shell_quote(image))
}

/// Image references allowed into host commands: registry, path, tag and
/// digest characters only.
#[must_use]
pub fn is_valid_image_ref(image: &str) -> bool {
    !image.is_empty()
        && !image.starts_with('-')
        && image
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "./:@_-".contains(c))
}

/// Parse `docker compose config --images` output; order kept, duplicates dropped.
#[must_use]
pub fn parse_image_list(stdout: &str) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !images.iter().any(|i| i == line) {
            images.push(line.to_string());
        }
    }
    images
}

/// First non-empty line of a multi-line command output.
#[must_use]
pub fn first_non_empty_line(stdout: &str) -> Option<&str> {
    stdout.lines().map(str::trim).find(|l| !l.is_empty())
}
