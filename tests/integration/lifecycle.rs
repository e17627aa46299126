//! Service lifecycle and shared-resource tests

use std::sync::Arc;
use std::time::Duration;

use alert_relay::config::{BotConfig, MonitorTarget, StoreConfig};
use alert_relay::router::Router;
use alert_relay::service::{AlertService, ServiceState};
use alert_relay::sinks::bot::{BotConnection, BotSink};
use alert_relay::sinks::{DeliverySink, send_detached};
use alert_relay::store::ElasticStore;
use assert_matches::assert_matches;
use serde_json::json;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_unreachable_store_at_startup_is_fatal() {
    let store = ElasticStore::new(StoreConfig {
        host: "127.0.0.1".to_string(),
        port: 9,
        timeout: 2,
        ..StoreConfig::default()
    });

    let service = AlertService::new(
        Arc::new(store),
        Arc::new(Router::default()),
        &[],
        Duration::from_secs(1),
    );
    let state = service.subscribe_state();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let result = service.run(shutdown_rx).await;

    assert_matches!(result, Err(e) if e.to_string().contains("initial connection"));
    assert_eq!(*state.borrow(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_shutdown_during_long_interval_is_prompt() {
    let store = seeded_store("alerts", 1).await;
    let sink = RecordingSink::new("hook", true);

    let service = AlertService::new(
        store.clone(),
        router_with("ops", &[sink.clone()]),
        &[MonitorTarget::new("alerts", "ops")],
        Duration::from_secs(3600),
    );
    let mut state = service.subscribe_state();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(service.run(shutdown_rx));

    assert!(eventually(Duration::from_secs(2), || sink.received().len() == 1).await);

    let started = tokio::time::Instant::now();
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("service did not stop within one second")
        .unwrap()
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    state
        .wait_for(|s| *s == ServiceState::Stopped)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_in_flight_send_finishes_before_stop() {
    let store = seeded_store("alerts", 2).await;
    let sink = RecordingSink::slow("hook", Duration::from_millis(300));

    let service = AlertService::new(
        store.clone(),
        router_with("ops", &[sink.clone()]),
        &[MonitorTarget::new("alerts", "ops")],
        Duration::from_secs(60),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(service.run(shutdown_rx));

    // shut down while the first send is sleeping
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();
    running.await.unwrap().unwrap();

    assert_eq!(sink.received().len(), 1);
    assert_eq!(store.unprocessed_count("alerts").await, 1);
}

#[tokio::test]
async fn test_bot_sinks_share_one_session() {
    let chat = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "100", "username": "relay" }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&chat)
        .await;

    for channel in [11u64, 12] {
        Mock::given(method("GET"))
            .and(path(format!("/channels/{channel}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": channel.to_string(), "type": 0 })),
            )
            .mount(&chat)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/channels/{channel}/messages")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1" })))
            .mount(&chat)
            .await;
    }

    let connection = Arc::new(BotConnection::new(BotConfig {
        token: Some("bot-token".to_string()),
        api_base: chat.uri(),
    }));

    let handles: Vec<_> = (0..6)
        .map(|n| {
            let channel = if n % 2 == 0 { 11 } else { 12 };
            let sink: Arc<dyn DeliverySink> = Arc::new(BotSink::new(
                &format!("bot-{n}"),
                channel,
                connection.clone(),
            ));
            send_detached(sink, format!("message {n}"))
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().ok);
    }

    connection.close().await;
    assert!(connection.is_closed());
    chat.verify().await;
}
