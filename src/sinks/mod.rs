//! Delivery sinks - one implementation per channel family
//!
//! A sink accepts an already formatted message and tries to deliver it. Sinks never
//! fail loudly: every transport problem is captured in the returned [`DeliveryOutcome`]
//! and logged with the sink id, so the router can keep fanning out.
//!
//! ## Channel Families
//!
//! - **Email** ([`email::EmailSink`]): SMTP relay, one retry with a fresh session
//! - **Chat webhook** ([`webhook::WebhookSink`]): stateless embed post
//! - **Chat bot** ([`bot::BotSink`]): posts through one shared bot session
//!
//! ## Waiting vs. Detached Sends
//!
//! [`DeliverySink::send`] completes the delivery before it resolves. Callers that do
//! not want to wait use [`send_detached`], which spawns the send and hands back a
//! [`JoinHandle`]. A detached send may outlive its caller; delivery has not
//! necessarily happened when `send_detached` returns.

pub mod bot;
pub mod email;
pub mod webhook;

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{BotConfig, Config, MethodKind, NotificationMethodSpec};

use bot::{BotConnection, BotSink};
use email::{EmailSink, SharedMailTransport, SmtpRelay};
use webhook::WebhookSink;

/// Result of one delivery attempt through one sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub ok: bool,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(detail: impl Display) -> Self {
        Self {
            ok: false,
            error: Some(detail.to_string()),
        }
    }
}

/// A single delivery channel
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Configured method id, used in every log line about this sink
    fn id(&self) -> &str;

    /// Channel family name
    fn kind(&self) -> &'static str;

    /// Deliver `message` and report how it went. Must not panic.
    async fn send(&self, message: &str) -> DeliveryOutcome;
}

/// Spawn a send without waiting for it.
pub fn send_detached(
    sink: Arc<dyn DeliverySink>,
    message: impl Into<String>,
) -> JoinHandle<DeliveryOutcome> {
    let message = message.into();
    tokio::spawn(async move { sink.send(&message).await })
}

/// Shared resources handed to sinks at construction
#[derive(Default)]
pub struct SinkResources {
    pub mail_transport: Option<SharedMailTransport>,
    pub bot_connection: Option<Arc<BotConnection>>,
}

impl SinkResources {
    /// Create the shared transports the configuration asks for.
    ///
    /// The bot connection is only created (not connected) when at least one bot
    /// method exists; it connects lazily on first send.
    pub fn from_config(config: &Config) -> Self {
        let mail_transport = config.smtp.clone().map(|smtp| {
            let relay: Box<dyn email::MailTransport> = Box::new(SmtpRelay::new(smtp));
            Arc::new(Mutex::new(relay))
        });

        let wants_bot = config
            .notification_methods
            .iter()
            .any(|method| matches!(method.kind, MethodKind::ChatBot(_)));
        let bot_connection = wants_bot.then(|| {
            let bot_config = config.bot.clone().unwrap_or_else(BotConfig::default);
            Arc::new(BotConnection::new(bot_config))
        });

        Self {
            mail_transport,
            bot_connection,
        }
    }
}

/// Build one sink per configured notification method, keyed by method id.
///
/// Methods whose shared resource is missing are dropped with a warning.
pub fn build_sinks(
    methods: &[NotificationMethodSpec],
    resources: &SinkResources,
) -> HashMap<String, Arc<dyn DeliverySink>> {
    let mut sinks: HashMap<String, Arc<dyn DeliverySink>> = HashMap::new();

    for method in methods {
        let sink: Arc<dyn DeliverySink> = match &method.kind {
            MethodKind::EmailSmtp(email) => {
                let Some(transport) = &resources.mail_transport else {
                    warn!(
                        "email method '{}' has no smtp configuration, skipping it",
                        method.id
                    );
                    continue;
                };
                Arc::new(EmailSink::new(&method.id, email.clone(), transport.clone()))
            }
            MethodKind::ChatWebhook(webhook) => {
                Arc::new(WebhookSink::new(&method.id, &webhook.webhook_url))
            }
            MethodKind::ChatBot(bot) => {
                let Some(connection) = &resources.bot_connection else {
                    warn!("bot method '{}' has no bot connection, skipping it", method.id);
                    continue;
                };
                Arc::new(BotSink::new(&method.id, bot.channel_id, connection.clone()))
            }
        };

        debug!("built {} sink '{}'", sink.kind(), method.id);

        if sinks.insert(method.id.clone(), sink).is_some() {
            warn!("duplicate notification method id '{}', keeping the last one", method.id);
        }
    }

    sinks
}
