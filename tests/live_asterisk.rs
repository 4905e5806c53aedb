//! Integration tests against a live Asterisk instance.
//!
//! These tests read AMI_HOST, AMI_PORT, AMI_USER and AMI_PASSWORD (defaults:
//! localhost:5038, empty credentials) and need a manager.conf user allowed to
//! run `CoreStatus` and `Ping`.
//! Run with: cargo test --test live_asterisk -- --ignored

use std::time::Duration;

use asterisk_ami_tokio::{AmiAction, AmiAdapter, AmiConfig, AmiEvent, ConnectionState};
use tokio::time::timeout;

async fn connect(events: bool) -> AmiAdapter {
    let config = AmiConfig {
        events,
        ..AmiConfig::from_env().expect("invalid AMI_* environment")
    };
    let adapter = AmiAdapter::new(config).unwrap();
    adapter.connect();
    timeout(
        Duration::from_secs(10),
        adapter
            .state_changes()
            .wait_for(|s| *s == ConnectionState::Ready),
    )
    .await
    .expect("login did not complete")
    .unwrap();
    adapter
}

#[tokio::test]
#[ignore]
async fn live_login_and_core_status() {
    let adapter = connect(false).await;

    let reply = adapter
        .request(AmiAction::new("CoreStatus"))
        .await
        .unwrap();
    assert!(reply.is_success());
    assert!(
        reply
            .get("CoreCurrentCalls")
            .is_some(),
        "unexpected CoreStatus reply: {}",
        reply.to_json()
    );

    adapter
        .disconnect()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_ping_with_explicit_action_id() {
    let adapter = connect(false).await;

    let reply = adapter
        .request(AmiAction::new("Ping").with_action_id("live-ping-1"))
        .await
        .unwrap();
    assert_eq!(reply.action_id(), Some("live-ping-1"));
    assert_eq!(reply.get("Ping"), Some("Pong"));

    adapter
        .disconnect()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_unknown_action_fails() {
    let adapter = connect(false).await;

    let err = adapter
        .request(AmiAction::new("NoSuchActionHere"))
        .await
        .unwrap_err();
    assert!(err.is_remote_failure(), "unexpected error: {}", err);

    adapter
        .disconnect()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_events_arrive_when_enabled() {
    let adapter = connect(true).await;
    let mut events = adapter.subscribe();

    // UserEvent is echoed back to every manager session with events on.
    adapter
        .request(AmiAction::new("UserEvent").set("UserEvent", "ami-live-test"))
        .await
        .unwrap();

    let found = timeout(Duration::from_secs(10), async {
        while let Some(Ok(event)) = events.recv().await {
            if let AmiEvent::Data(message) = event {
                if message.get("UserEvent") == Some("ami-live-test") {
                    return true;
                }
            }
        }
        false
    })
    .await
    .expect("timeout waiting for UserEvent");
    assert!(found);

    adapter
        .disconnect()
        .await;
}
