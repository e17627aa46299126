//! Email delivery through an SMTP relay
//!
//! All email sinks share one [`MailTransport`] behind a mutex, so only one SMTP
//! conversation is in flight at a time. Each send follows the same sequence:
//!
//! ```text
//! lock transport → connect if needed → send ──ok──────────────────────→ disconnect
//!                                         └─err→ reconnect → send once → disconnect
//! ```
//!
//! The session is always closed after a send so no authenticated connection idles
//! between poll cycles.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{EmailMethod, SmtpConfig};
use crate::util::truncate_with_ellipsis;

use super::{DeliveryOutcome, DeliverySink};

/// Characters of the message body that make it into the subject line
pub const SUBJECT_PREVIEW_LEN: usize = 50;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A fully addressed plain text email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Session oriented mail transport
#[async_trait]
pub trait MailTransport: Send {
    /// Whether a live session exists
    fn is_connected(&self) -> bool;

    /// Open (or reopen) the session
    async fn connect(&mut self) -> Result<()>;

    /// Send over the current session
    async fn send(&mut self, mail: &OutgoingMail) -> Result<()>;

    /// Close the session; a no-op when there is none
    async fn disconnect(&mut self);
}

pub type SharedMailTransport = Arc<Mutex<Box<dyn MailTransport>>>;

/// [`MailTransport`] backed by a lettre SMTP client
pub struct SmtpRelay {
    config: SmtpConfig,
    session: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpRelay {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = if self.config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                .context("invalid smtp relay host")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.host)
        };

        builder = builder.port(self.config.port).timeout(Some(SMTP_TIMEOUT));

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(builder.build())
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message> {
        let from: Mailbox = self
            .config
            .sender
            .parse()
            .context("invalid sender address")?;

        let mut builder = Message::builder()
            .from(from)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN);

        for recipient in &mail.to {
            let mailbox: Mailbox = recipient
                .parse()
                .with_context(|| format!("invalid recipient address '{recipient}'"))?;
            builder = builder.to(mailbox);
        }

        builder
            .body(mail.body.clone())
            .context("failed to build email")
    }
}

#[async_trait]
impl MailTransport for SmtpRelay {
    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        self.session = None;

        let transport = self.build_transport()?;
        let reachable = transport
            .test_connection()
            .await
            .with_context(|| format!("failed to reach smtp relay {}", self.config.host))?;

        if !reachable {
            anyhow::bail!("smtp relay {} refused the connection", self.config.host);
        }

        debug!("smtp session established with {}", self.config.host);
        self.session = Some(transport);
        Ok(())
    }

    async fn send(&mut self, mail: &OutgoingMail) -> Result<()> {
        let message = self.build_message(mail)?;
        let Some(session) = &self.session else {
            anyhow::bail!("smtp session is not initialized, check host and credentials");
        };

        session
            .send(message)
            .await
            .context("smtp relay rejected the email")?;
        Ok(())
    }

    async fn disconnect(&mut self) {
        // dropping the transport closes its pooled connections
        if self.session.take().is_some() {
            debug!("smtp session with {} closed", self.config.host);
        }
    }
}

/// Subject line for `message`: prefix plus a bounded preview of the body.
pub fn subject_line(prefix: &str, message: &str) -> String {
    format!(
        "{prefix} {}",
        truncate_with_ellipsis(message, SUBJECT_PREVIEW_LEN)
    )
}

pub struct EmailSink {
    id: String,
    recipients: Vec<String>,
    subject_prefix: String,
    transport: SharedMailTransport,
}

impl EmailSink {
    pub fn new(id: &str, method: EmailMethod, transport: SharedMailTransport) -> Self {
        Self {
            id: id.to_string(),
            recipients: method.to_emails,
            subject_prefix: method.subject_prefix,
            transport,
        }
    }

    async fn attempt(transport: &mut Box<dyn MailTransport>, mail: &OutgoingMail) -> Result<()> {
        if !transport.is_connected() {
            transport.connect().await?;
        }
        transport.send(mail).await
    }

    async fn deliver(&self, mail: &OutgoingMail) -> Result<()> {
        let mut transport = self.transport.lock().await;

        let result = match Self::attempt(&mut transport, mail).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("email send failed, retrying once with a new session: {e:#}");
                transport.disconnect().await;
                match transport.connect().await {
                    Ok(()) => transport.send(mail).await,
                    Err(reconnect) => Err(reconnect.context("retry failed, smtp session unavailable")),
                }
            }
        };

        transport.disconnect().await;
        result
    }
}

#[async_trait]
impl DeliverySink for EmailSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "email_smtp"
    }

    #[instrument(skip(self, message), fields(sink = %self.id))]
    async fn send(&self, message: &str) -> DeliveryOutcome {
        if self.recipients.is_empty() {
            error!("email sink '{}' has no recipients configured", self.id);
            return DeliveryOutcome::failed("no recipients configured");
        }

        let mail = OutgoingMail {
            to: self.recipients.clone(),
            subject: subject_line(&self.subject_prefix, message),
            body: message.to_string(),
        };

        match self.deliver(&mail).await {
            Ok(()) => {
                info!(
                    "email notification sent to {} recipient(s)",
                    self.recipients.len()
                );
                DeliveryOutcome::delivered()
            }
            Err(e) => {
                error!("failed to send email notification via '{}': {e:#}", self.id);
                DeliveryOutcome::failed(format!("{e:#}"))
            }
        }
    }
}
