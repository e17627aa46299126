//! End-to-end pipeline tests
//!
//! Search index and chat webhook are mock servers; everything in between is the
//! real configuration, sink, router, poller and service code.

use std::sync::Arc;
use std::time::Duration;

use alert_relay::config::{MonitorTarget, parse_config};
use alert_relay::router::Router;
use alert_relay::service::{AlertService, ServiceState};
use alert_relay::sinks::{SinkResources, build_sinks};
use alert_relay::store::ElasticStore;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::watch;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn mount_search_index(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "version": { "number": "8.11.1" } })),
        )
        .mount(server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;

    // first search returns the backlog, later ones find nothing
    Mock::given(method("POST"))
        .and(path("/alerts/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": { "hits": [
                { "_index": "alerts-2024.03", "_id": "a1", "_source": {
                    "message": "disk /var at 97%", "timestamp": "2024-03-01T08:00:00Z", "processed": false
                } },
                { "_index": "alerts-2024.03", "_id": "a2", "_source": {
                    "timestamp": "2024-03-01T08:01:00Z", "processed": false
                } }
            ] }
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/alerts/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": { "hits": [] } })))
        .mount(server)
        .await;

    for id in ["a1", "a2"] {
        Mock::given(method("POST"))
            .and(path(format!("/alerts-2024.03/_update/{id}")))
            .and(body_partial_json(json!({ "doc": { "processed": true } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "updated" })))
            .expect(1)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_index_to_webhook_end_to_end() {
    let index = MockServer::start().await;
    mount_search_index(&index).await;

    let chat = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "embeds": [{ "description": "**Alert from index: alerts**\n**Time:** 2024-03-01T08:00:00Z\n\ndisk /var at 97%" }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&chat)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "embeds": [{ "description": "**Alert from index: alerts**\n**Time:** 2024-03-01T08:01:00Z\n\nNo message provided" }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&chat)
        .await;

    let config = parse_config(&format!(
        r#"{{
            "polling_interval": 60,
            "notification_methods": [
                {{ "id": "ops-hook", "type": "chat_webhook", "config": {{ "webhook_url": "{}/hook" }} }}
            ],
            "notificators": [ {{ "id": "ops", "notification_methods": ["ops-hook"] }} ],
            "monitors": [ {{ "index": "alerts", "notificator_id": "ops" }} ]
        }}"#,
        chat.uri()
    ))
    .unwrap();

    let resources = SinkResources::from_config(&config);
    let sinks = build_sinks(&config.notification_methods, &resources);
    let router = Arc::new(Router::from_notificators(&config.notificators, &sinks));

    let service = AlertService::new(
        Arc::new(ElasticStore::new(store_config_for(&index))),
        router,
        &config.monitors,
        Duration::from_secs(config.polling_interval),
    );
    let mut state = service.subscribe_state();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(service.run(shutdown_rx));

    state
        .wait_for(|s| *s == ServiceState::Running)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    shutdown_tx.send(true).unwrap();
    running.await.unwrap().unwrap();

    index.verify().await;
    chat.verify().await;
}

#[tokio::test]
async fn test_fan_out_marks_even_when_one_webhook_is_down() {
    let chat = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/healthy"))
        .respond_with(ResponseTemplate::new(204))
        .expect(3)
        .mount(&chat)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&chat)
        .await;

    let config = parse_config(&format!(
        r#"{{
            "notification_methods": [
                {{ "id": "broken", "type": "discordWebhook", "config": {{ "webhook_url": "{uri}/broken" }} }},
                {{ "id": "healthy", "type": "chat_webhook", "config": {{ "webhook_url": "{uri}/healthy" }} }}
            ],
            "notificators": [ {{ "id": "ops", "notification_methods": ["broken", "healthy"] }} ]
        }}"#,
        uri = chat.uri()
    ))
    .unwrap();

    let sinks = build_sinks(
        &config.notification_methods,
        &SinkResources::from_config(&config),
    );
    let router = Arc::new(Router::from_notificators(&config.notificators, &sinks));
    let store = seeded_store("alerts", 3).await;

    let service = AlertService::new(
        store.clone(),
        router,
        &[MonitorTarget::new("alerts", "ops")],
        Duration::from_secs(60),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(service.run(shutdown_rx));

    let mut drained = false;
    for _ in 0..100 {
        if store.unprocessed_count("alerts").await == 0 {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(drained, "records were not marked processed");

    shutdown_tx.send(true).unwrap();
    running.await.unwrap().unwrap();

    chat.verify().await;
}

#[tokio::test]
async fn test_backlog_larger_than_batch_drains_over_cycles() {
    let store = seeded_store("alerts", 150).await;
    let sink = RecordingSink::new("hook", true);
    let router = router_with("ops", &[sink.clone()]);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (handle, _task) = alert_relay::actors::poller::PollerHandle::spawn(
        alert_relay::store::AlertSource::new(store.clone()),
        router,
        vec![MonitorTarget::new("alerts", "ops")],
        Duration::from_secs(60),
        shutdown_rx,
    );

    // the first cycle runs on spawn and takes one batch
    assert!(
        eventually(Duration::from_secs(2), || sink.received().len() == 100).await,
        "first batch was not delivered"
    );

    let report = handle.poll_now().await.unwrap();
    assert_eq!(report.processed, 50);
    assert_eq!(store.unprocessed_count("alerts").await, 0);

    let received = sink.received();
    assert!(received[0].ends_with("alert #0"));
    assert!(received[149].ends_with("alert #149"));

    handle.shutdown().await.unwrap();
}
