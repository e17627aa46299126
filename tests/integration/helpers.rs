//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alert_relay::config::StoreConfig;
use alert_relay::router::{Notificator, Router};
use alert_relay::sinks::{DeliveryOutcome, DeliverySink};
use alert_relay::store::{AlertStore, MemoryStore};
use async_trait::async_trait;
use serde_json::{Value, json};
use wiremock::MockServer;

/// Sink that records every message and answers with a fixed outcome
pub struct RecordingSink {
    id: String,
    ok: bool,
    delay: Duration,
    pub messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn new(id: &str, ok: bool) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            ok,
            delay: Duration::ZERO,
            messages: Arc::default(),
        })
    }

    pub fn slow(id: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            ok: true,
            delay,
            messages: Arc::default(),
        })
    }

    pub fn received(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: &str) -> DeliveryOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.messages.lock().unwrap().push(message.to_string());

        if self.ok {
            DeliveryOutcome::delivered()
        } else {
            DeliveryOutcome::failed("simulated outage")
        }
    }
}

/// Router with one notificator over the given sinks
pub fn router_with(id: &str, sinks: &[Arc<RecordingSink>]) -> Arc<Router> {
    Arc::new(Router::new([Notificator {
        id: id.to_string(),
        sinks: sinks
            .iter()
            .map(|sink| sink.clone() as Arc<dyn DeliverySink>)
            .collect(),
    }]))
}

pub fn alert(message: &str, timestamp: &str) -> Value {
    json!({ "message": message, "timestamp": timestamp, "processed": false })
}

/// Connected memory store seeded with `count` alerts in `index`
pub async fn seeded_store(index: &str, count: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.connect().await.unwrap();
    store.create_index(index).await;

    for n in 0..count {
        let timestamp = format!("2024-03-01T{:02}:{:02}:00Z", n / 60, n % 60);
        store
            .insert(index, &format!("alert-{n:04}"), alert(&format!("alert #{n}"), &timestamp))
            .await;
    }

    store
}

/// Store settings pointing at a mock search index
pub fn store_config_for(server: &MockServer) -> StoreConfig {
    StoreConfig {
        host: server.address().ip().to_string(),
        port: server.address().port(),
        password: Some("changeme".to_string()),
        ..StoreConfig::default()
    }
}

/// Poll `condition` until it holds or the timeout passes
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
