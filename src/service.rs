//! Service lifecycle: connect, run the poller, drain, release
//!
//! ```text
//! Stopped ──start──► Connecting ──ok──► Running ──shutdown──► Draining ──► Stopped
//!                         │
//!                         └──fail──► Stopped (run returns Err)
//! ```
//!
//! The initial store connection is a hard precondition: there is no retry before
//! the first successful connect. Once running, lost connections are handled by the
//! poller one cycle at a time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::actors::poller::PollerHandle;
use crate::config::MonitorTarget;
use crate::router::Router;
use crate::sinks::bot::BotConnection;
use crate::store::{AlertSource, AlertStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Connecting,
    Running,
    Draining,
}

pub struct AlertService {
    source: AlertSource,
    router: Arc<Router>,
    targets: Vec<MonitorTarget>,
    interval: Duration,
    bot_connection: Option<Arc<BotConnection>>,
    state_tx: watch::Sender<ServiceState>,
}

impl AlertService {
    /// Monitors whose notificator is unknown are dropped here, with a warning.
    pub fn new(
        store: Arc<dyn AlertStore>,
        router: Arc<Router>,
        monitors: &[MonitorTarget],
        interval: Duration,
    ) -> Self {
        let targets = router.resolve_targets(monitors);
        let (state_tx, _) = watch::channel(ServiceState::Stopped);

        Self {
            source: AlertSource::new(store),
            router,
            targets,
            interval,
            bot_connection: None,
            state_tx,
        }
    }

    /// Hand over the shared bot connection so it is closed on shutdown.
    pub fn with_bot_connection(mut self, connection: Option<Arc<BotConnection>>) -> Self {
        self.bot_connection = connection;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.source = self.source.with_batch_size(batch_size);
        self
    }

    pub fn targets(&self) -> &[MonitorTarget] {
        &self.targets
    }

    pub fn state(&self) -> ServiceState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ServiceState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ServiceState) {
        self.state_tx.send_replace(state);
        info!("service state: {:?}", state);
    }

    /// Run until `shutdown_rx` turns `true` (or its sender goes away).
    ///
    /// Fails only when the initial store connection cannot be established.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        self.set_state(ServiceState::Connecting);

        match self.source.connect().await {
            Ok(version) => info!(
                "connected to {} ({})",
                self.source.store().backend_name(),
                version
            ),
            Err(e) => {
                self.set_state(ServiceState::Stopped);
                return Err(anyhow::Error::new(e)
                    .context("initial connection to the alert store failed"));
            }
        }

        self.set_state(ServiceState::Running);

        let (_poller, mut task) = PollerHandle::spawn(
            self.source.clone(),
            self.router.clone(),
            self.targets.clone(),
            self.interval,
            shutdown_rx.clone(),
        );

        let finished = tokio::select! {
            result = &mut task => Some(result),
            _ = wait_for_shutdown(shutdown_rx) => None,
        };

        self.set_state(ServiceState::Draining);

        let result = match finished {
            Some(result) => result,
            None => task.await,
        };
        if let Err(e) = result {
            error!("poller task ended abnormally: {e}");
        }

        self.source.close().await;
        if let Some(connection) = &self.bot_connection {
            connection.close().await;
        }

        self.set_state(ServiceState::Stopped);
        Ok(())
    }
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    // a dropped sender counts as shutdown
    let _ = shutdown_rx.wait_for(|flag| *flag).await;
}

/// Wait for SIGTERM or SIGINT.
pub async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        let mut interrupt =
            signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

        tokio::select! {
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
            _ = interrupt.recv() => info!("received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("received ctrl-c, shutting down");
    }

    Ok(())
}

/// Raise the shutdown flag once a termination signal arrives.
pub fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("{e:#}");
        }
        shutdown_tx.send_replace(true);
    })
}
