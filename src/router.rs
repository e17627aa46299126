//! Notificator routing and fan-out
//!
//! A [`Notificator`] is a named, ordered list of sinks. [`Router::dispatch`] sends a
//! message through every sink of one notificator. Each sink is invoked on its own:
//! a failed or panicking sink is logged and the next sink still runs. Dispatch has
//! no aggregate failure signal beyond [`RouterError::NotFound`].

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{MonitorTarget, NotificatorConfig};
use crate::sinks::DeliverySink;

/// Errors reported by [`Router::dispatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// No notificator with this id exists
    NotFound(String),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::NotFound(id) => write!(f, "notificator '{}' not found", id),
        }
    }
}

impl std::error::Error for RouterError {}

/// Named fan-out target
#[derive(Clone)]
pub struct Notificator {
    pub id: String,
    pub sinks: Vec<Arc<dyn DeliverySink>>,
}

impl fmt::Debug for Notificator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sink_ids: Vec<&str> = self.sinks.iter().map(|sink| sink.id()).collect();
        f.debug_struct("Notificator")
            .field("id", &self.id)
            .field("sinks", &sink_ids)
            .finish()
    }
}

/// Read-only map from notificator id to notificator, shared by the poller and the API
#[derive(Debug, Default, Clone)]
pub struct Router {
    notificators: HashMap<String, Notificator>,
}

impl Router {
    pub fn new(notificators: impl IntoIterator<Item = Notificator>) -> Self {
        let notificators = notificators
            .into_iter()
            .map(|notificator| (notificator.id.clone(), notificator))
            .collect();

        Self { notificators }
    }

    /// Resolve notificator definitions against the built sinks.
    ///
    /// Method ids without a sink are dropped with a warning. A notificator left with
    /// no sinks is kept and dispatches to nothing.
    pub fn from_notificators(
        configs: &[NotificatorConfig],
        sinks: &HashMap<String, Arc<dyn DeliverySink>>,
    ) -> Self {
        let notificators = configs.iter().map(|config| {
            let resolved: Vec<Arc<dyn DeliverySink>> = config
                .notification_methods
                .iter()
                .filter_map(|method_id| match sinks.get(method_id) {
                    Some(sink) => Some(sink.clone()),
                    None => {
                        warn!(
                            "notificator '{}' references unknown notification method '{}', skipping it",
                            config.id, method_id
                        );
                        None
                    }
                })
                .collect();

            if resolved.is_empty() {
                warn!("notificator '{}' has no usable notification methods", config.id);
            } else {
                debug!(
                    "notificator '{}' resolved {} notification method(s)",
                    config.id,
                    resolved.len()
                );
            }

            Notificator {
                id: config.id.clone(),
                sinks: resolved,
            }
        });

        Self::new(notificators)
    }

    pub fn notificator(&self, id: &str) -> Option<&Notificator> {
        self.notificators.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.notificators.contains_key(id)
    }

    /// Known notificator ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.notificators.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.notificators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notificators.is_empty()
    }

    /// Keep the monitor targets whose notificator exists, in configured order.
    pub fn resolve_targets(&self, targets: &[MonitorTarget]) -> Vec<MonitorTarget> {
        targets
            .iter()
            .filter(|target| {
                let known = self.contains(&target.notificator_id);
                if !known {
                    warn!(
                        "monitor for index '{}' references unknown notificator '{}', it will be skipped",
                        target.index, target.notificator_id
                    );
                }
                known
            })
            .cloned()
            .collect()
    }

    /// Send `message` through every sink of notificator `id`, in order.
    #[instrument(skip(self, message))]
    pub async fn dispatch(&self, id: &str, message: &str) -> Result<(), RouterError> {
        let notificator = self
            .notificators
            .get(id)
            .ok_or_else(|| RouterError::NotFound(id.to_string()))?;

        for sink in &notificator.sinks {
            match AssertUnwindSafe(sink.send(message)).catch_unwind().await {
                Ok(outcome) if outcome.ok => {
                    debug!("sink '{}' delivered for notificator '{}'", sink.id(), id);
                }
                Ok(outcome) => {
                    warn!(
                        "sink '{}' ({}) failed for notificator '{}': {}",
                        sink.id(),
                        sink.kind(),
                        id,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
                Err(_) => {
                    error!(
                        "sink '{}' ({}) panicked for notificator '{}'",
                        sink.id(),
                        sink.kind(),
                        id
                    );
                }
            }
        }

        info!("notification sent via notificator '{}'", id);
        Ok(())
    }
}
