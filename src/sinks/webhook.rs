use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{error, info, instrument};

use super::{DeliveryOutcome, DeliverySink};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

const ALERT_COLOR: u32 = 0xFF5733;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            embeds: self.embeds,
        }
    }
}

/// Posts alerts as embeds to a chat webhook. Stateless apart from the HTTP client.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    id: String,
    url: String,
    client: Client,
    timeout: Duration,
}

impl WebhookSink {
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            client: Client::new(),
            timeout: WEBHOOK_TIMEOUT,
        }
    }

    pub fn build_alert_embed(&self, message: &str) -> Embed {
        let sent_at = Local::now().format("%Y-%m-%d %H:%M:%S");

        Embed {
            title: Some("🔔 Alert Notification".to_string()),
            description: Some(message.to_string()),
            color: Some(ALERT_COLOR),
            fields: vec![
                EmbedField {
                    name: "⚠️ Alert Status".to_string(),
                    value: "Active".to_string(),
                    inline: true,
                },
                EmbedField {
                    name: "📊 Source".to_string(),
                    value: "Elasticsearch".to_string(),
                    inline: true,
                },
            ],
            footer: Some(EmbedFooter {
                text: format!("Notification ID: {} • {sent_at}", self.id),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    async fn post(&self, message: &Message) -> Result<(), String> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "timeout while posting to webhook".to_string()
                } else {
                    format!("webhook request failed: {e}")
                }
            })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(format!("webhook answered with status {status}: {body}"))
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "chat_webhook"
    }

    #[instrument(skip(self, message), fields(sink = %self.id))]
    async fn send(&self, message: &str) -> DeliveryOutcome {
        let payload = MessageBuilder::new()
            .add_embed(self.build_alert_embed(message))
            .build();

        match self.post(&payload).await {
            Ok(()) => {
                info!("webhook message sent successfully (ID: {})", self.id);
                DeliveryOutcome::delivered()
            }
            Err(e) => {
                error!("failed to send webhook message (ID: {}): {e}", self.id);
                DeliveryOutcome::failed(e)
            }
        }
    }
}
