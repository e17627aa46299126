//! Failure tests for the poll loop and the sinks
//!
//! These tests verify that failures stay where they happen:
//! - Every sink of a notificator down
//! - Store outage and recovery between cycles
//! - Missing indices next to healthy ones
//! - Records that cannot be marked
//! - Unreachable mail relay

use std::sync::Arc;
use std::time::Duration;

use alert_relay::actors::poller::PollerHandle;
use alert_relay::config::{EmailMethod, MonitorTarget, SmtpConfig};
use alert_relay::sinks::DeliverySink;
use alert_relay::sinks::email::{EmailSink, MailTransport, SmtpRelay};
use alert_relay::store::AlertSource;
use pretty_assertions::assert_eq;
use tokio::sync::{Mutex, watch};

use crate::helpers::*;

fn spawn_poller(
    store: Arc<alert_relay::store::MemoryStore>,
    router: Arc<alert_relay::router::Router>,
    targets: Vec<MonitorTarget>,
) -> (PollerHandle, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (handle, _task) = PollerHandle::spawn(
        AlertSource::new(store),
        router,
        targets,
        Duration::from_secs(60),
        shutdown_rx,
    );
    (handle, shutdown_tx)
}

#[tokio::test]
async fn test_total_channel_outage_still_marks_records() {
    let store = seeded_store("alerts", 2).await;
    let mail = RecordingSink::new("mail", false);
    let chat = RecordingSink::new("chat", false);
    let router = router_with("ops", &[mail.clone(), chat.clone()]);

    let (handle, _shutdown) = spawn_poller(
        store.clone(),
        router,
        vec![MonitorTarget::new("alerts", "ops")],
    );

    assert!(eventually(Duration::from_secs(2), || chat.received().len() == 2).await);
    // waits behind the first cycle
    handle.poll_now().await.unwrap();

    assert_eq!(mail.received().len(), 2);
    assert_eq!(store.unprocessed_count("alerts").await, 0);
}

#[tokio::test]
async fn test_store_outage_skips_cycles_until_it_recovers() {
    let store = seeded_store("alerts", 0).await;
    let sink = RecordingSink::new("hook", true);
    let router = router_with("ops", &[sink.clone()]);

    let (handle, _shutdown) = spawn_poller(
        store.clone(),
        router,
        vec![MonitorTarget::new("alerts", "ops")],
    );
    handle.poll_now().await.unwrap();

    store.set_online(false);
    store
        .insert("alerts", "late", alert("written during outage", "2024-03-01T10:00:00Z"))
        .await;

    let report = handle.poll_now().await.unwrap();
    assert!(report.store_unavailable);
    assert!(sink.received().is_empty());

    store.set_online(true);

    let report = handle.poll_now().await.unwrap();
    assert!(!report.store_unavailable);
    assert_eq!(report.processed, 1);
    assert_eq!(sink.received().len(), 1);
}

#[tokio::test]
async fn test_missing_index_does_not_block_other_monitors() {
    let store = seeded_store("alerts", 1).await;
    let sink = RecordingSink::new("hook", true);
    let router = router_with("ops", &[sink.clone()]);

    let (handle, _shutdown) = spawn_poller(
        store.clone(),
        router,
        vec![
            MonitorTarget::new("missing-index", "ops"),
            MonitorTarget::new("alerts", "ops"),
        ],
    );

    handle.poll_now().await.unwrap();

    assert_eq!(sink.received().len(), 1);
    assert_eq!(store.unprocessed_count("alerts").await, 0);
}

#[tokio::test]
async fn test_unmarkable_record_is_redelivered_next_cycle() {
    let store = seeded_store("alerts", 0).await;
    store.reject_marks(true);
    let sink = RecordingSink::new("hook", true);
    let router = router_with("ops", &[sink.clone()]);

    let (handle, _shutdown) = spawn_poller(
        store.clone(),
        router,
        vec![MonitorTarget::new("alerts", "ops")],
    );
    handle.poll_now().await.unwrap();

    store
        .insert("alerts", "sticky", alert("cannot be marked", "2024-03-01T10:00:00Z"))
        .await;

    let report = handle.poll_now().await.unwrap();
    assert_eq!(report.unmarked, 1);
    assert_eq!(sink.received().len(), 1);

    store.reject_marks(false);

    let report = handle.poll_now().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(sink.received().len(), 2);
    assert_eq!(store.unprocessed_count("alerts").await, 0);
}

#[tokio::test]
async fn test_unreachable_mail_relay_is_a_sink_failure() {
    let relay: Box<dyn MailTransport> = Box::new(SmtpRelay::new(SmtpConfig {
        host: "127.0.0.1".to_string(),
        port: 9,
        username: None,
        password: None,
        sender: "relay@example.com".to_string(),
        starttls: false,
    }));

    let sink = EmailSink::new(
        "mail",
        EmailMethod {
            to_emails: vec!["ops@example.com".to_string()],
            subject_prefix: "[Alert]".to_string(),
        },
        Arc::new(Mutex::new(relay)),
    );

    let outcome = sink.send("disk full").await;

    assert!(!outcome.ok);
    assert!(outcome.error.is_some());
}
