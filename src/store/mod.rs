//! Alert store layer
//!
//! The store is the search index alert documents are written to. The poller only
//! needs three things from it: unprocessed records in timestamp order, a way to
//! flag a record processed, and a liveness check.
//!
//! ## Architecture
//!
//! - [`AlertStore`] trait: the backend seam
//! - [`ElasticStore`]: search index over its REST API
//! - [`MemoryStore`]: in-process store for tests and dry runs
//! - [`AlertSource`]: wraps a store with batch size, reconnect and error
//!   containment so a store problem never stops the poll loop

pub mod backend;
pub mod elastic;
pub mod error;
pub mod memory;
pub mod source;

pub use backend::AlertStore;
pub use elastic::ElasticStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use source::{AlertSource, BATCH_SIZE};
