pub mod actors;
pub mod api;
pub mod config;
pub mod router;
pub mod service;
pub mod sinks;
pub mod store;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const MISSING_MESSAGE: &str = "No message provided";

const MISSING_TIMESTAMP: &str = "Unknown time";

/// A single alert document living in a monitored index.
///
/// Records are created by whatever writes alerts into the index. This crate only
/// flips `processed` and stamps `processed_at`; it never deletes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Document id inside the index
    pub id: String,

    /// Concrete index the document lives in
    pub index: String,

    /// Raw document body
    pub payload: Map<String, Value>,

    pub processed: bool,

    pub processed_at: Option<DateTime<Utc>>,
}

impl AlertRecord {
    pub fn new(index: impl ToString, id: impl ToString, payload: Map<String, Value>) -> Self {
        let processed = payload
            .get("processed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let processed_at = payload
            .get("processed_at")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc));

        Self {
            id: id.to_string(),
            index: index.to_string(),
            payload,
            processed,
            processed_at,
        }
    }

    /// Human readable alert text, or a placeholder when the document has none.
    pub fn message(&self) -> String {
        self.field_text("message")
            .unwrap_or_else(|| MISSING_MESSAGE.to_string())
    }

    /// Alert timestamp as stored in the document, or a placeholder.
    pub fn timestamp(&self) -> String {
        self.field_text("timestamp")
            .unwrap_or_else(|| MISSING_TIMESTAMP.to_string())
    }

    /// Message text sent to notificators for an alert picked up from `index`.
    pub fn render(&self, index: &str) -> String {
        format!(
            "**Alert from index: {}**\n**Time:** {}\n\n{}",
            index,
            self.timestamp(),
            self.message()
        )
    }

    fn field_text(&self, key: &str) -> Option<String> {
        match self.payload.get(key)? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}
