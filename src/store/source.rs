use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use super::backend::AlertStore;
use super::error::{StoreError, StoreResult};
use crate::AlertRecord;

/// Records fetched per index per cycle
pub const BATCH_SIZE: usize = 100;

/// The poller's view of the alert store.
///
/// Fetch and mark never fail: errors are logged and turned into "nothing this
/// cycle" or `false` so one bad index or record cannot stop the loop.
#[derive(Clone)]
pub struct AlertSource {
    store: Arc<dyn AlertStore>,
    batch_size: usize,
}

impl AlertSource {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self {
            store,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn AlertStore> {
        &self.store
    }

    pub async fn connect(&self) -> StoreResult<String> {
        self.store.connect().await
    }

    /// Check the connection and try one reconnect if it is gone.
    pub async fn ensure_connected(&self) -> bool {
        if self.store.ping().await {
            return true;
        }

        warn!(
            "lost connection to {}, attempting to reconnect",
            self.store.backend_name()
        );

        match self.store.connect().await {
            Ok(version) => {
                info!("reconnected to {} ({})", self.store.backend_name(), version);
                true
            }
            Err(e) => {
                error!("reconnect failed: {e}");
                false
            }
        }
    }

    /// Oldest unprocessed records of `index`, at most one batch.
    #[instrument(skip(self), fields(index = %index))]
    pub async fn fetch_unprocessed(&self, index: &str) -> Vec<AlertRecord> {
        match self.store.search_unprocessed(index, self.batch_size).await {
            Ok(records) => records,
            Err(StoreError::IndexNotFound(_)) => {
                warn!("index '{}' not found", index);
                Vec::new()
            }
            Err(e) => {
                error!("error querying index '{}': {e}", index);
                Vec::new()
            }
        }
    }

    /// Flag one record processed, stamped with the current time.
    pub async fn mark_processed(&self, index: &str, id: &str) -> bool {
        match self.store.mark_processed(index, id, Utc::now()).await {
            Ok(()) => true,
            Err(e) => {
                error!("error marking document {} in '{}' as processed: {e}", id, index);
                false
            }
        }
    }

    pub async fn close(&self) {
        if let Err(e) = self.store.close().await {
            warn!("error closing {}: {e}", self.store.backend_name());
        }
    }
}
