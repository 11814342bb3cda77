//! Unit tests for reading and changing the update channel.

#![allow(clippy::expect_used)]

use stackwarden::application::services::channel::{get_update_channel, set_update_channel};
use stackwarden::domain::UpdateError;

use crate::mocks::{COMPOSE_DIR, MockHost};

const ENV_FILE: &str = "/srv/stack/.env";

#[tokio::test]
async fn test_get_reads_update_url_from_env_file() {
    let host = MockHost::new().ok(
        "cat ",
        "DOMAIN=example.com\nUPDATE_URL=https://updates.example.com/beta\n",
    );

    let url = get_update_channel(&host, COMPOSE_DIR).await.expect("get");

    assert_eq!(url.as_deref(), Some("https://updates.example.com/beta"));
    assert_eq!(host.calls_matching(ENV_FILE).len(), 1);
}

#[tokio::test]
async fn test_get_without_env_file_is_unset() {
    let host = MockHost::new();
    let url = get_update_channel(&host, COMPOSE_DIR).await.expect("get");
    assert_eq!(url, None);
}

#[tokio::test]
async fn test_get_propagates_host_failure() {
    let host = MockHost::new().fail("cat ", "connection reset");
    assert!(get_update_channel(&host, COMPOSE_DIR).await.is_err());
}

#[tokio::test]
async fn test_set_replaces_entry_and_keeps_other_lines() {
    let host = MockHost::new().ok("cat ", "A=1\nUPDATE_URL=https://old\nB=2\n");

    set_update_channel(&host, COMPOSE_DIR, "https://new")
        .await
        .expect("set");

    let writes = host.calls_matching("printf");
    assert_eq!(writes.len(), 1);
    assert!(writes[0].contains("A=1\nUPDATE_URL=https://new\nB=2\n"));
    assert!(writes[0].contains("mkdir -p /srv/stack"));
    assert!(writes[0].ends_with(&format!("> {ENV_FILE}")));
}

#[tokio::test]
async fn test_set_creates_env_file_when_missing() {
    let host = MockHost::new();

    set_update_channel(&host, COMPOSE_DIR, "https://updates.example.com/stable")
        .await
        .expect("set");

    let writes = host.calls_matching("printf");
    assert_eq!(writes.len(), 1);
    assert!(writes[0].contains("UPDATE_URL=https://updates.example.com/stable\n"));
}

#[tokio::test]
async fn test_set_rejects_multi_line_url_without_touching_host() {
    let host = MockHost::new();

    let err = set_update_channel(&host, COMPOSE_DIR, "https://x\nEVIL=1")
        .await
        .expect_err("must reject");

    assert!(matches!(
        err.downcast_ref::<UpdateError>(),
        Some(UpdateError::InvalidChannelUrl)
    ));
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_set_does_not_write_when_read_fails() {
    let host = MockHost::new().fail("cat ", "permission denied");

    assert!(
        set_update_channel(&host, COMPOSE_DIR, "https://new")
            .await
            .is_err()
    );
    assert!(host.calls_matching("printf").is_empty());
}
