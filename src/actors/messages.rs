//! Message types for actor communication
//!
//! Commands are sent to a specific actor via mpsc; replies travel back on oneshot
//! channels carried inside the command.

use tokio::sync::oneshot;

/// Summary of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records dispatched and marked processed
    pub processed: usize,

    /// Records that were dispatched (or not) but could not be marked; they are
    /// picked up again next cycle
    pub unmarked: usize,

    /// The store was unreachable and the cycle did nothing
    pub store_unavailable: bool,

    /// A shutdown request cut the cycle short
    pub interrupted: bool,
}

/// Commands that can be sent to a PollerActor
#[derive(Debug)]
pub enum PollerCommand {
    /// Run one cycle right away, without waiting for the interval
    PollNow {
        /// Channel to send the cycle summary back
        respond_to: oneshot::Sender<CycleReport>,
    },

    /// Stop after the current step
    ///
    /// An in-flight send or store call finishes first.
    Shutdown,
}
