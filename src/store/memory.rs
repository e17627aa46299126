//! In-memory alert store (no persistence)
//!
//! Mirrors the search index semantics the poller relies on: unprocessed records
//! come back oldest first, a missing index is `IndexNotFound`, and the store can be
//! taken offline to exercise reconnect paths.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::AlertStore;
use super::error::{StoreError, StoreResult};
use crate::AlertRecord;

#[derive(Default)]
pub struct MemoryStore {
    indices: RwLock<HashMap<String, Vec<AlertRecord>>>,
    online: AtomicBool,
    connected: AtomicBool,
    reject_marks: AtomicBool,
    connects: AtomicUsize,
    marks: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store that accepts connections
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Create an empty index so searches against it succeed
    pub async fn create_index(&self, index: &str) {
        self.indices
            .write()
            .await
            .entry(index.to_string())
            .or_default();
    }

    /// Add a document, creating the index if needed
    pub async fn insert(&self, index: &str, id: &str, payload: Value) {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("message".to_string(), other);
                map
            }
        };

        self.indices
            .write()
            .await
            .entry(index.to_string())
            .or_default()
            .push(AlertRecord::new(index, id, payload));
    }

    pub async fn record(&self, index: &str, id: &str) -> Option<AlertRecord> {
        self.indices
            .read()
            .await
            .get(index)?
            .iter()
            .find(|record| record.id == id)
            .cloned()
    }

    pub async fn unprocessed_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .await
            .get(index)
            .map(|records| records.iter().filter(|r| !r.processed).count())
            .unwrap_or(0)
    }

    /// Simulate the server going away (or coming back). Going offline drops the
    /// current connection.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        if !online {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    /// Make every `mark_processed` call fail
    pub fn reject_marks(&self, reject: bool) {
        self.reject_marks.store(reject, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn mark_count(&self) -> usize {
        self.marks.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> StoreResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::NotConnected)
        }
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn connect(&self) -> StoreResult<String> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if !self.online.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionFailed("memory store is offline".into()));
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok("memory".to_string())
    }

    async fn ping(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.online.load(Ordering::SeqCst)
    }

    async fn search_unprocessed(
        &self,
        index: &str,
        limit: usize,
    ) -> StoreResult<Vec<AlertRecord>> {
        self.ensure_connected()?;

        let indices = self.indices.read().await;
        let records = indices
            .get(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;

        let mut unprocessed: Vec<AlertRecord> =
            records.iter().filter(|r| !r.processed).cloned().collect();

        unprocessed.sort_by(|a, b| {
            compare_timestamps(a.payload.get("timestamp"), b.payload.get("timestamp"))
        });
        unprocessed.truncate(limit);

        debug!("memory store: {} unprocessed in {}", unprocessed.len(), index);
        Ok(unprocessed)
    }

    async fn mark_processed(&self, index: &str, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        self.ensure_connected()?;
        self.marks.fetch_add(1, Ordering::SeqCst);

        if self.reject_marks.load(Ordering::SeqCst) {
            return Err(StoreError::QueryFailed("update rejected".into()));
        }

        let mut indices = self.indices.write().await;
        let record = indices
            .get_mut(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| StoreError::QueryFailed(format!("document {id} not found")))?;

        record.processed = true;
        record.processed_at = Some(at);
        record.payload.insert("processed".into(), Value::Bool(true));
        record
            .payload
            .insert("processed_at".into(), Value::String(at.to_rfc3339()));

        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// Ascending timestamp order as the search index sorts it: numbers by value,
/// strings lexically (RFC 3339 sorts chronologically), missing values last.
fn compare_timestamps(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Greater,
        (Some(_), None) => CmpOrdering::Less,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => CmpOrdering::Less,
            (None, Some(_)) => CmpOrdering::Greater,
            (None, None) => match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => a.to_string().cmp(&b.to_string()),
            },
        },
    }
}
