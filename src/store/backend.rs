//! Alert store trait definition
//!
//! This module defines the `AlertStore` trait every backing store implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StoreResult;
use crate::AlertRecord;

/// Trait for the search index holding alert documents
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; the poller and the service share one
/// store behind an `Arc`.
///
/// ## Error Handling
///
/// Methods return `StoreResult<T>`. Implementations convert client errors into
/// `StoreError` variants; a missing index must surface as
/// `StoreError::IndexNotFound` so callers can treat it as an empty batch.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Establish the connection and return a short description of the server
    /// (version string or similar).
    async fn connect(&self) -> StoreResult<String>;

    /// Is the connection alive right now?
    async fn ping(&self) -> bool;

    /// Unprocessed records of `index`, oldest first, at most `limit` of them.
    async fn search_unprocessed(&self, index: &str, limit: usize)
    -> StoreResult<Vec<AlertRecord>>;

    /// Set `processed = true` and `processed_at = at` on one record.
    ///
    /// Marking an already processed record only refreshes `processed_at`.
    async fn mark_processed(&self, index: &str, id: &str, at: DateTime<Utc>) -> StoreResult<()>;

    /// Release the connection
    async fn close(&self) -> StoreResult<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &str;
}
