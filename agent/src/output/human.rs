//! Human-readable terminal renderer.

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize as _;
use stackwarden_common::{DockerUpdateStatus, ImageState, OverallStatus, SelfCheckStatus};

use crate::application::services::maintenance::ProvisionReport;
use crate::application::services::update::ApplyOutcome;
use crate::output::OutputContext;

/// Renders status documents as human-readable terminal output.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the self-check document: overall line, integrity step, scripts.
    pub fn render_self_check(&self, status: &SelfCheckStatus) {
        let summary = status.summary();
        let overall = if status.is_running {
            "running".to_string()
        } else {
            status.overall_status.to_string()
        };
        self.ctx.header("Self-check");
        self.ctx.kv("Status:", &self.paint_overall(status, &overall));
        self.ctx.kv("Last run:", &format_time(status.last_run));
        self.ctx.kv(
            "Scripts:",
            &format!(
                "{} total, {} succeeded, {} failed",
                summary.total_scripts, summary.success_count, summary.failure_count
            ),
        );
        if let Some(reason) = &status.connection_error {
            self.ctx.error(&format!("Host connection: {reason}"));
        }
        if let Some(integrity) = &status.integrity_check {
            self.line(integrity.success, &integrity.message);
        }
        for (name, result) in &status.scripts {
            let timing = result
                .duration
                .map(|ms| format!(" ({ms} ms)"))
                .unwrap_or_default();
            if result.success {
                self.line(true, &format!("{name}{timing}"));
            } else {
                self.line(false, &format!("{name}{timing}: {}", result.message));
            }
        }
    }

    /// Render the update document: one line per image.
    pub fn render_updates(&self, status: &DockerUpdateStatus) {
        self.ctx.header("Image updates");
        self.ctx
            .kv("Checked:", &format_time(Some(status.timestamp)));
        if status.is_checking {
            self.ctx.info("A check is in progress");
        }
        if let Some(ms) = status.check_duration {
            self.ctx.kv("Duration:", &format!("{ms} ms"));
        }
        for image in &status.images {
            match image.status {
                ImageState::UpToDate => self.ctx.success(&format!("{} up to date", image.name)),
                ImageState::UpdateAvailable => self.ctx.warn(&format!(
                    "{} update available ({} → {})",
                    image.name,
                    short_digest(&image.current_digest),
                    short_digest(image.latest_digest.as_deref().unwrap_or("?")),
                )),
                ImageState::Error => self.ctx.failure(&format!(
                    "{}: {}",
                    image.name,
                    image.error.as_deref().unwrap_or("check failed")
                )),
            }
        }
        if let Some(err) = &status.last_error {
            self.ctx.error(err);
        } else if status.total_images > 0 && !status.has_updates {
            self.ctx.success("All images up to date");
        }
    }

    pub fn render_apply(&self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Initiated { log_path } => {
                self.ctx.success("Update dispatched to host");
                self.ctx.kv("Host log:", log_path);
            }
            ApplyOutcome::Completed { .. } => {
                self.ctx.success("Update completed via fallback");
            }
        }
    }

    pub fn render_provision(&self, report: &ProvisionReport) {
        let agent = report.inventory.iter().filter(|k| k.agent_key).count();
        self.ctx.success("Agent key installed");
        self.ctx.kv(
            "Authorized keys:",
            &format!(
                "{} ({agent} agent, {} other)",
                report.inventory.len(),
                report.inventory.len() - agent
            ),
        );
        if report.removed > 0 {
            self.ctx
                .info(&format!("Replaced {} previous agent key(s)", report.removed));
        }
    }

    pub fn render_revoke(&self, report: &ProvisionReport) {
        if report.removed == 0 {
            self.ctx.info("No agent keys were installed");
        } else {
            self.ctx
                .success(&format!("Removed {} agent key(s)", report.removed));
        }
        self.ctx
            .kv("Authorized keys:", &report.inventory.len().to_string());
    }

    pub fn render_channel(&self, url: Option<&str>) {
        match url {
            Some(url) => self.ctx.kv("Update URL:", url),
            None => self.ctx.info("No update URL set; the default channel is used"),
        }
    }

    pub fn render_channel_saved(&self, url: &str) {
        self.ctx.success("Update channel saved");
        self.ctx.kv("Update URL:", url);
    }

    fn line(&self, ok: bool, msg: &str) {
        if ok {
            self.ctx.success(msg);
        } else {
            self.ctx.failure(msg);
        }
    }

    fn paint_overall(&self, status: &SelfCheckStatus, text: &str) -> String {
        let style = if status.is_running {
            self.ctx.styles.info
        } else {
            match status.overall_status {
                OverallStatus::Success => self.ctx.styles.success,
                OverallStatus::Partial | OverallStatus::NeverRun => self.ctx.styles.warning,
                OverallStatus::Failure | OverallStatus::ConnectionFailed => self.ctx.styles.error,
            }
        };
        text.style(style).to_string()
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "never".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// `sha256:0123456789ab…` → `0123456789ab`; sentinels pass through.
fn short_digest(digest: &str) -> &str {
    match digest.strip_prefix("sha256:") {
        Some(hex) => hex.get(..12).unwrap_or(hex),
        None => digest,
    }
}
