//! Unit tests for the self-check orchestrator.

#![allow(clippy::expect_used)]

use std::sync::Mutex;
use std::time::Duration;

use stackwarden::application::ports::DocumentStore;
use stackwarden::application::services::self_check::{
    SelfCheckOptions, get_self_check_status, recover_interrupted_run, run_self_check,
};
use stackwarden::domain::scripts::DEFAULT_SCRIPTS;
use stackwarden::domain::{ReconcileReport, SelfCheckError};
use stackwarden::infra::state::JsonStore;
use stackwarden_common::{OverallStatus, RunOwner, ScriptResult, SelfCheckStatus};

use crate::mocks::{
    MOCK_HOST, MOCK_PID, MockHost, MockProcesses, MockReconciler, MockStore, Reply, layout,
    other_owner,
};

const PROBE: &str = "echo stackwarden-ssh-ok";

fn opts(layout: &stackwarden::domain::ScriptLayout) -> SelfCheckOptions<'_> {
    SelfCheckOptions {
        layout,
        script_timeout: Duration::from_secs(5),
    }
}

fn three_scripts() -> MockHost {
    MockHost::new().ok("scripts.list", "s1.sh\ns2.sh\n\n# disabled.sh\ns3.sh\n")
}

#[tokio::test]
async fn test_failed_script_does_not_stop_later_scripts() {
    let host = three_scripts().fail("/s2.sh", "disk full");
    let store = MockStore::<SelfCheckStatus>::new();
    let layout = layout();

    let status = run_self_check(
        &host,
        &store,
        &MockReconciler::clean(),
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect("run completes");

    assert_eq!(status.overall_status, OverallStatus::Partial);
    assert!(!status.is_running);
    assert!(status.scripts["s1.sh"].success);
    assert_eq!(status.scripts["s1.sh"].message, "Script completed successfully");
    assert!(!status.scripts["s2.sh"].success);
    assert!(status.scripts["s2.sh"].message.starts_with("Script failed:"));
    assert!(status.scripts["s2.sh"].message.contains("disk full"));
    assert!(status.scripts["s3.sh"].success);
    assert!(!status.scripts.contains_key("disabled.sh"));

    let scripts = host.calls_matching("execute_script_with_log.sh");
    assert_eq!(scripts.len(), 3);
    assert!(scripts[0].ends_with("/s1.sh"));
    assert!(scripts[2].ends_with("/s3.sh"));
    assert_eq!(store.snapshot(), status);
}

#[tokio::test]
async fn test_all_scripts_succeeding_is_success() {
    let host = three_scripts();
    let store = MockStore::<SelfCheckStatus>::new();
    let layout = layout();

    let status = run_self_check(
        &host,
        &store,
        &MockReconciler::clean(),
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect("run completes");

    assert_eq!(status.overall_status, OverallStatus::Success);
    assert_eq!(status.summary().success_count, 3);
    assert!(status.last_run.is_some());
}

#[tokio::test]
async fn test_all_scripts_failing_is_failure() {
    let host = three_scripts().fail("/s", "boom");
    let store = MockStore::<SelfCheckStatus>::new();
    let layout = layout();

    let status = run_self_check(
        &host,
        &store,
        &MockReconciler::clean(),
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect("run completes");

    assert_eq!(status.overall_status, OverallStatus::Failure);
    assert_eq!(status.summary().failure_count, 3);
}

#[tokio::test]
async fn test_second_run_is_rejected_and_leaves_state_alone() {
    let mut running = SelfCheckStatus {
        is_running: true,
        last_run: Some(chrono::Utc::now()),
        owner: Some(other_owner()),
        ..SelfCheckStatus::default()
    };
    running.scripts.insert(
        "s1.sh".to_string(),
        ScriptResult::succeeded("Script completed successfully", Some(10)),
    );
    let store = MockStore::with(running.clone());
    let host = three_scripts();
    let reconciler = MockReconciler::clean();
    let layout = layout();

    let err = run_self_check(
        &host,
        &store,
        &reconciler,
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect_err("must be rejected");

    assert!(matches!(
        err.downcast_ref::<SelfCheckError>(),
        Some(SelfCheckError::AlreadyRunning)
    ));
    assert_eq!(store.snapshot(), running);
    assert!(host.calls().is_empty());
    assert_eq!(reconciler.runs(), 0);
}

#[tokio::test]
async fn test_unreachable_host_is_connection_failed() {
    let host = three_scripts().fail(PROBE, "ssh: connect to host 172.17.0.1 port 22: No route to host");
    let store = MockStore::<SelfCheckStatus>::new();
    let reconciler = MockReconciler::clean();
    let layout = layout();

    let err = run_self_check(
        &host,
        &store,
        &reconciler,
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect_err("must fail");

    assert!(matches!(
        err.downcast_ref::<SelfCheckError>(),
        Some(SelfCheckError::ConnectionUnavailable(_))
    ));
    let status = store.snapshot();
    assert_eq!(status.overall_status, OverallStatus::ConnectionFailed);
    assert!(!status.is_running);
    assert!(
        status
            .connection_error
            .as_deref()
            .is_some_and(|e| e.contains("No route to host"))
    );
    assert!(status.scripts.is_empty());
    assert_eq!(reconciler.runs(), 0);
    assert_eq!(host.calls(), vec![PROBE.to_string()]);
}

#[tokio::test]
async fn test_missing_script_list_runs_builtin_order() {
    let host = MockHost::new().fail("scripts.list", "No such file or directory");
    let store = MockStore::<SelfCheckStatus>::new();
    let layout = layout();

    let status = run_self_check(
        &host,
        &store,
        &MockReconciler::clean(),
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect("run completes");

    assert_eq!(status.overall_status, OverallStatus::Success);
    assert_eq!(status.scripts.len(), DEFAULT_SCRIPTS.len());
    let first = &host.calls_matching("execute_script_with_log.sh")[0];
    assert!(first.ends_with(&format!("/{}", DEFAULT_SCRIPTS[0])));
}

#[tokio::test]
async fn test_empty_script_list_runs_builtin_order() {
    let host = MockHost::new().ok("scripts.list", "\n# nothing here\n");
    let store = MockStore::<SelfCheckStatus>::new();
    let layout = layout();

    let status = run_self_check(
        &host,
        &store,
        &MockReconciler::clean(),
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect("run completes");

    assert_eq!(status.scripts.len(), DEFAULT_SCRIPTS.len());
}

#[tokio::test]
async fn test_script_timeout_is_recorded_as_failure() {
    let host = three_scripts().on("/s2.sh", Reply::Timeout);
    let store = MockStore::<SelfCheckStatus>::new();
    let layout = layout();

    let status = run_self_check(
        &host,
        &store,
        &MockReconciler::clean(),
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect("run completes");

    assert_eq!(status.scripts["s2.sh"].message, "Script timed out after 5s");
    assert!(status.scripts["s3.sh"].success);
    assert_eq!(status.overall_status, OverallStatus::Partial);
}

#[tokio::test]
async fn test_integrity_errors_are_recorded_but_do_not_affect_overall() {
    let report = ReconcileReport {
        fixed: vec!["config/app.yml".to_string()],
        removed: Vec::new(),
        errors: vec!["config/secret.yml: permission denied".to_string()],
    };
    let host = three_scripts();
    let store = MockStore::<SelfCheckStatus>::new();
    let layout = layout();

    let status = run_self_check(
        &host,
        &store,
        &MockReconciler::returning(report),
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect("run completes");

    let integrity = status.integrity_check.expect("integrity recorded");
    assert!(!integrity.success);
    assert!(integrity.message.contains("permission denied"));
    assert_eq!(status.overall_status, OverallStatus::Success);
}

#[tokio::test]
async fn test_new_run_clears_previous_results() {
    let mut previous = SelfCheckStatus {
        overall_status: OverallStatus::ConnectionFailed,
        connection_error: Some("timeout".to_string()),
        ..SelfCheckStatus::default()
    };
    previous.scripts.insert(
        "retired.sh".to_string(),
        ScriptResult::failed("Script failed: gone", None),
    );
    let store = MockStore::with(previous);
    let host = three_scripts();
    let layout = layout();

    let status = run_self_check(
        &host,
        &store,
        &MockReconciler::clean(),
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect("run completes");

    assert!(!status.scripts.contains_key("retired.sh"));
    assert!(status.connection_error.is_none());
    assert_eq!(status.overall_status, OverallStatus::Success);
}

#[tokio::test]
async fn test_status_read_is_not_blocked_by_running_flag() {
    let store = MockStore::with(SelfCheckStatus {
        is_running: true,
        ..SelfCheckStatus::default()
    });
    let status = get_self_check_status(&store).await.expect("read");
    assert!(status.is_running);
    assert_eq!(status.summary().total_scripts, 0);
}

#[tokio::test]
async fn test_recover_clears_run_of_exited_owner() {
    let store = MockStore::with(SelfCheckStatus {
        is_running: true,
        last_run: Some(chrono::Utc::now()),
        owner: Some(other_owner()),
        ..SelfCheckStatus::default()
    });
    let layout = layout();
    let processes = MockProcesses::exited();

    let recovered = recover_interrupted_run(&store, &processes, &opts(&layout))
        .await
        .expect("recover");
    assert!(recovered);
    let status = store.snapshot();
    assert!(!status.is_running);
    assert!(status.owner.is_none());
    assert_eq!(status.overall_status, OverallStatus::Failure);

    let again = recover_interrupted_run(&store, &processes, &opts(&layout))
        .await
        .expect("recover");
    assert!(!again);
}

#[tokio::test]
async fn test_recover_leaves_live_owner_alone() {
    let running = SelfCheckStatus {
        is_running: true,
        last_run: Some(chrono::Utc::now()),
        owner: Some(other_owner()),
        ..SelfCheckStatus::default()
    };
    let store = MockStore::with(running.clone());
    let layout = layout();

    let recovered = recover_interrupted_run(&store, &MockProcesses::alive(), &opts(&layout))
        .await
        .expect("recover");

    assert!(!recovered);
    assert_eq!(store.snapshot(), running);
}

#[tokio::test]
async fn test_recover_clears_expired_lease_even_if_owner_looks_alive() {
    let mut owner = other_owner();
    owner.expires_at = chrono::Utc::now() - chrono::TimeDelta::seconds(1);
    let store = MockStore::with(SelfCheckStatus {
        is_running: true,
        last_run: Some(owner.started_at),
        owner: Some(owner),
        ..SelfCheckStatus::default()
    });
    let layout = layout();

    let recovered = recover_interrupted_run(&store, &MockProcesses::alive(), &opts(&layout))
        .await
        .expect("recover");
    assert!(recovered);
    assert!(!store.snapshot().is_running);
}

#[tokio::test]
async fn test_run_takes_over_claim_of_exited_owner() {
    let store = MockStore::with(SelfCheckStatus {
        is_running: true,
        last_run: Some(chrono::Utc::now()),
        owner: Some(other_owner()),
        ..SelfCheckStatus::default()
    });
    let host = three_scripts();
    let layout = layout();

    let status = run_self_check(
        &host,
        &store,
        &MockReconciler::clean(),
        &MockProcesses::exited(),
        &opts(&layout),
    )
    .await
    .expect("abandoned claim is taken over");

    assert_eq!(status.overall_status, OverallStatus::Success);
    assert!(!status.is_running);
    assert!(status.owner.is_none());
}

#[tokio::test]
async fn test_live_claim_survives_a_second_store_instance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = JsonStore::<SelfCheckStatus>::open(dir.path());
    let second = JsonStore::<SelfCheckStatus>::open(dir.path());
    first
        .update(|s| {
            s.is_running = true;
            s.last_run = Some(chrono::Utc::now());
            s.owner = Some(other_owner());
        })
        .await
        .expect("seed live claim");

    let layout = layout();
    let processes = MockProcesses::alive();
    let recovered = recover_interrupted_run(&second, &processes, &opts(&layout))
        .await
        .expect("recover");
    assert!(!recovered);

    let host = three_scripts();
    let err = run_self_check(
        &host,
        &second,
        &MockReconciler::clean(),
        &processes,
        &opts(&layout),
    )
    .await
    .expect_err("live claim holds");
    assert!(matches!(
        err.downcast_ref::<SelfCheckError>(),
        Some(SelfCheckError::AlreadyRunning)
    ));
    assert!(host.calls().is_empty());

    let seen = first.read().await.expect("read");
    assert!(seen.is_running);
    assert_eq!(seen.owner.map(|o| o.run_id).as_deref(), Some("run-other"));
}

#[tokio::test]
async fn test_dead_claim_is_recovered_through_a_second_store_instance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = JsonStore::<SelfCheckStatus>::open(dir.path());
    let second = JsonStore::<SelfCheckStatus>::open(dir.path());
    first
        .update(|s| {
            s.is_running = true;
            s.last_run = Some(chrono::Utc::now());
            s.owner = Some(other_owner());
        })
        .await
        .expect("seed claim");

    let layout = layout();
    let recovered = recover_interrupted_run(&second, &MockProcesses::exited(), &opts(&layout))
        .await
        .expect("recover");
    assert!(recovered);

    let seen = first.read().await.expect("read");
    assert!(!seen.is_running);
    assert_eq!(seen.overall_status, OverallStatus::Failure);
}

#[tokio::test]
async fn test_claim_records_this_process_while_running() {
    let store = ClaimWatcher::new(MockStore::new(), None);
    let host = three_scripts();
    let layout = layout();

    run_self_check(
        &host,
        &store,
        &MockReconciler::clean(),
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect("run completes");

    let claimed = store.first_owner().expect("owner recorded at claim");
    assert_eq!(claimed.pid, MOCK_PID);
    assert_eq!(claimed.hostname, MOCK_HOST);
    assert!(claimed.expires_at > claimed.started_at);
    assert!(store.inner.snapshot().owner.is_none());
}

#[tokio::test]
async fn test_run_stops_writing_once_claim_is_taken_over() {
    // Writes: claim, list lease, integrity, first script.
    let store = ClaimWatcher::new(MockStore::new(), Some(4));
    let host = three_scripts();
    let layout = layout();

    let err = run_self_check(
        &host,
        &store,
        &MockReconciler::clean(),
        &MockProcesses::alive(),
        &opts(&layout),
    )
    .await
    .expect_err("claim lost");

    assert!(matches!(
        err.downcast_ref::<SelfCheckError>(),
        Some(SelfCheckError::Superseded)
    ));
    let status = store.inner.snapshot();
    assert!(status.is_running);
    assert_eq!(status.owner.map(|o| o.run_id).as_deref(), Some("run-other"));
    assert!(status.scripts.is_empty());
    assert!(status.integrity_check.is_some());
    assert_eq!(host.calls_matching("execute_script_with_log.sh").len(), 1);
}

/// Store wrapper that remembers the owner written by the first update and
/// can hand the claim to another process just before the n-th update.
struct ClaimWatcher {
    inner: MockStore<SelfCheckStatus>,
    hijack_at: Option<usize>,
    first_owner: Mutex<Option<RunOwner>>,
}

impl ClaimWatcher {
    fn new(inner: MockStore<SelfCheckStatus>, hijack_at: Option<usize>) -> Self {
        Self {
            inner,
            hijack_at,
            first_owner: Mutex::new(None),
        }
    }

    fn first_owner(&self) -> Option<RunOwner> {
        self.first_owner.lock().expect("lock").clone()
    }
}

impl DocumentStore<SelfCheckStatus> for ClaimWatcher {
    async fn read(&self) -> anyhow::Result<SelfCheckStatus> {
        self.inner.read().await
    }

    async fn update<R, F>(&self, mutate: F) -> anyhow::Result<R>
    where
        F: FnOnce(&mut SelfCheckStatus) -> R,
    {
        if self.hijack_at == Some(self.inner.update_count() + 1) {
            self.inner
                .update(|s| s.owner = Some(other_owner()))
                .await?;
        }
        let out = self.inner.update(mutate).await?;
        let mut first = self.first_owner.lock().expect("lock");
        if first.is_none() {
            first.clone_from(&self.inner.snapshot().owner);
        }
        Ok(out)
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.inner.reset().await
    }
}
