//! Actor-based poll worker
//!
//! The poll loop runs as an independent async task and is controlled through a
//! command channel plus a shared shutdown flag.
//!
//! ## Architecture Overview
//!
//! ```text
//!   AlertService ── shutdown flag (watch) ──┐
//!        │                                  ▼
//!        └── PollerHandle ── commands ──► PollerActor
//!                                           │
//!                     fetch / mark ◄────────┼────────► Router::dispatch
//!                     (AlertSource)         │          (sinks)
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: `PollNow` and `Shutdown` over mpsc
//! 2. **Request/Response**: `PollNow` replies with a `CycleReport` over oneshot
//! 3. **Shutdown flag**: a `watch::Receiver<bool>` observed between every step

pub mod messages;
pub mod poller;
