//! PollerActor - turns unprocessed alert records into notifications
//!
//! ## Message Flow
//!
//! ```text
//! Interval → ensure store → for each monitor: fetch batch → render → dispatch → mark
//!     ↑
//!     └─── Commands (PollNow, Shutdown) and the shutdown flag
//! ```
//!
//! One record is handled at a time and monitors are polled in configured order.
//! The shutdown flag is checked before every monitor and every record, and the
//! wait between cycles wakes up as soon as the flag flips.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, instrument, warn};

use crate::config::MonitorTarget;
use crate::router::Router;
use crate::store::AlertSource;

use super::messages::{CycleReport, PollerCommand};

/// Actor that drives the poll, dispatch, mark sequence
pub struct PollerActor {
    source: AlertSource,

    router: Arc<Router>,

    /// Monitors whose notificator resolved, in configured order
    targets: Vec<MonitorTarget>,

    interval: Duration,

    command_rx: mpsc::Receiver<PollerCommand>,

    shutdown_rx: watch::Receiver<bool>,
}

impl PollerActor {
    pub fn new(
        source: AlertSource,
        router: Arc<Router>,
        targets: Vec<MonitorTarget>,
        interval: Duration,
        command_rx: mpsc::Receiver<PollerCommand>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            router,
            targets,
            interval,
            command_rx,
            shutdown_rx,
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Run the actor's main loop
    ///
    /// Runs until the shutdown flag is set (or its sender is dropped) or a
    /// `Shutdown` command arrives.
    #[instrument(skip(self), fields(monitors = self.targets.len()))]
    pub async fn run(mut self) {
        info!(
            "starting poller with {} monitor(s), interval {:?}",
            self.targets.len(),
            self.interval
        );

        let mut commands_open = true;

        'outer: loop {
            if self.shutdown_requested() {
                break;
            }

            let report = self.run_cycle().await;
            if report.processed > 0 {
                info!("processed {} alert(s) this cycle", report.processed);
            }

            let deadline = Instant::now() + self.interval;

            loop {
                tokio::select! {
                    _ = sleep_until(deadline) => break,

                    changed = self.shutdown_rx.changed() => {
                        if changed.is_err() || *self.shutdown_rx.borrow() {
                            debug!("shutdown flag raised while waiting");
                            break 'outer;
                        }
                    }

                    cmd = self.command_rx.recv(), if commands_open => {
                        match cmd {
                            Some(PollerCommand::PollNow { respond_to }) => {
                                debug!("received PollNow command");
                                let report = self.run_cycle().await;
                                let _ = respond_to.send(report);
                            }

                            Some(PollerCommand::Shutdown) => {
                                debug!("received shutdown command");
                                break 'outer;
                            }

                            None => {
                                debug!("command channel closed, waiting for shutdown flag");
                                commands_open = false;
                            }
                        }
                    }
                }
            }
        }

        info!("poller stopped");
    }

    /// One pass over every monitor.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        if !self.source.ensure_connected().await {
            warn!("store unavailable, skipping this cycle");
            report.store_unavailable = true;
            return report;
        }

        'targets: for target in &self.targets {
            if self.shutdown_requested() {
                report.interrupted = true;
                break;
            }

            let records = self.source.fetch_unprocessed(&target.index).await;
            if !records.is_empty() {
                debug!(
                    "found {} unprocessed alert(s) in '{}'",
                    records.len(),
                    target.index
                );
            }

            for record in records {
                if self.shutdown_requested() {
                    report.interrupted = true;
                    break 'targets;
                }

                let message = record.render(&target.index);

                if let Err(e) = self.router.dispatch(&target.notificator_id, &message).await {
                    error!(
                        "could not dispatch alert {} from '{}': {e}",
                        record.id, target.index
                    );
                    report.unmarked += 1;
                    continue;
                }

                if self.source.mark_processed(&record.index, &record.id).await {
                    report.processed += 1;
                } else {
                    report.unmarked += 1;
                }
            }
        }

        report
    }
}

/// Handle for controlling a PollerActor
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,
}

impl PollerHandle {
    /// Spawn a new poller actor
    ///
    /// Returns the handle and the actor's task, which finishes once the actor stops.
    pub fn spawn(
        source: AlertSource,
        router: Arc<Router>,
        targets: Vec<MonitorTarget>,
        interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = PollerActor::new(source, router, targets, interval, cmd_rx, shutdown_rx);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    /// Run a cycle now and wait for its summary
    pub async fn poll_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive cycle report")
    }

    /// Ask the poller to stop
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
