//! Local process registry: run claims for this process and liveness checks
//! for claims left in the shared state directory.

use std::time::Duration;

use chrono::{DateTime, Utc};
use stackwarden_common::RunOwner;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

use crate::application::ports::ProcessRegistry;

/// Start times in `/proc` have one-second resolution.
const START_TIME_SLACK_SECS: i64 = 1;

/// Host name recorded in locks and run claims.
#[must_use]
pub fn current_hostname() -> String {
    System::host_name()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// [`ProcessRegistry`] backed by the local process table.
///
/// Created once per agent process; `started_at` tells this process apart
/// from an earlier one that had the same pid (pid 1 in a restarted
/// container, typically).
#[derive(Debug, Clone)]
pub struct LocalProcesses {
    pid: u32,
    hostname: String,
    started_at: DateTime<Utc>,
}

impl LocalProcesses {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
            hostname: current_hostname(),
            started_at: Utc::now(),
        }
    }
}

impl Default for LocalProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry for LocalProcesses {
    fn claim(&self, ttl: Duration) -> RunOwner {
        let run_id = format!("{}-{:016x}", self.pid, rand::random::<u64>());
        RunOwner::new(run_id, self.pid, &self.hostname, Utc::now(), ttl)
    }

    fn is_gone(&self, owner: &RunOwner) -> bool {
        if owner.hostname != self.hostname {
            return false;
        }
        if owner.pid == self.pid {
            return owner.started_at < self.started_at;
        }

        let pid = Pid::from_u32(owner.pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let gone = match system.process(pid) {
            None => true,
            Some(process) if process.status() == ProcessStatus::Zombie => true,
            Some(process) => i64::try_from(process.start_time())
                .is_ok_and(|t| t > owner.started_at.timestamp() + START_TIME_SLACK_SECS),
        };
        tracing::debug!(pid = owner.pid, run = %owner.run_id, gone, "checked claim owner");
        gone
    }
}
