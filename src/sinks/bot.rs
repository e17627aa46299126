//! Chat bot delivery over one shared, lazily established bot session
//!
//! Every bot sink holds the same [`BotConnection`]. The first send logs the bot in;
//! later sends reuse that session and its channel cache. An authorization failure
//! tears the session down so the next send logs in again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use super::{DeliveryOutcome, DeliverySink};
use crate::config::BotConfig;
use crate::util::truncate_with_ellipsis;

/// Longest message body the chat service accepts
const MAX_MESSAGE_LEN: usize = 2000;

/// Upper bound for every request to the chat service
const BOT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Channel types that accept plain text messages (guild text, announcement)
const TEXT_CHANNEL_TYPES: [u8; 2] = [0, 5];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotError {
    MissingToken,
    Closed,
    Unauthorized,
    ChannelNotFound(u64),
    NotTextChannel(u64),
    Api(String),
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotError::MissingToken => write!(f, "no bot token configured"),
            BotError::Closed => write!(f, "bot connection is closed"),
            BotError::Unauthorized => write!(f, "bot token was rejected"),
            BotError::ChannelNotFound(id) => write!(f, "channel {id} not found"),
            BotError::NotTextChannel(id) => write!(f, "channel {id} is not a text channel"),
            BotError::Api(msg) => write!(f, "chat api error: {msg}"),
        }
    }
}

impl std::error::Error for BotError {}

#[derive(Debug, Clone, Deserialize)]
struct CurrentUser {
    id: String,
    username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
}

impl ChannelInfo {
    pub fn accepts_text(&self) -> bool {
        TEXT_CHANNEL_TYPES.contains(&self.kind)
    }
}

/// A logged in bot session
#[derive(Debug)]
pub struct BotSession {
    pub user_id: String,
    pub username: String,
    channels: RwLock<HashMap<u64, ChannelInfo>>,
}

/// Shared connection to the chat service, created once per process
pub struct BotConnection {
    config: BotConfig,
    client: Client,
    timeout: Duration,
    session: Mutex<Option<Arc<BotSession>>>,
    closed: AtomicBool,
}

impl BotConnection {
    pub fn new(config: BotConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            timeout: BOT_REQUEST_TIMEOUT,
            session: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_error(&self, e: reqwest::Error) -> BotError {
        if e.is_timeout() {
            BotError::Api(format!("no answer from chat api within {:?}", self.timeout))
        } else {
            BotError::Api(e.to_string())
        }
    }

    fn auth_header(&self) -> Result<String, BotError> {
        self.config
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .map(|token| format!("Bot {token}"))
            .ok_or(BotError::MissingToken)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Return the current session, logging in first if there is none.
    ///
    /// The lock is held across the login so concurrent first sends share one session.
    pub async fn session(&self) -> Result<Arc<BotSession>, BotError> {
        if self.is_closed() {
            return Err(BotError::Closed);
        }

        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let auth = self.auth_header()?;
        let response = self
            .client
            .get(self.url("/users/@me"))
            .header("Authorization", auth)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(BotError::Unauthorized),
            status if !status.is_success() => {
                return Err(BotError::Api(format!("login answered with status {status}")));
            }
            _ => {}
        }

        let user: CurrentUser = response
            .json()
            .await
            .map_err(|e| BotError::Api(format!("invalid login response: {e}")))?;

        info!("chat bot logged in as {} ({})", user.username, user.id);

        let session = Arc::new(BotSession {
            user_id: user.id,
            username: user.username,
            channels: RwLock::new(HashMap::new()),
        });
        *guard = Some(session.clone());

        Ok(session)
    }

    async fn reset(&self) {
        if self.session.lock().await.take().is_some() {
            warn!("chat bot session dropped, next send will log in again");
        }
    }

    async fn channel(&self, session: &BotSession, channel_id: u64) -> Result<ChannelInfo, BotError> {
        if let Some(channel) = session.channels.read().await.get(&channel_id) {
            return Ok(channel.clone());
        }

        let auth = self.auth_header()?;
        let response = self
            .client
            .get(self.url(&format!("/channels/{channel_id}")))
            .header("Authorization", auth)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(BotError::Unauthorized),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                return Err(BotError::ChannelNotFound(channel_id));
            }
            status if !status.is_success() => {
                return Err(BotError::Api(format!("channel lookup answered with status {status}")));
            }
            _ => {}
        }

        let channel: ChannelInfo = response
            .json()
            .await
            .map_err(|e| BotError::Api(format!("invalid channel response: {e}")))?;

        debug!("cached channel {channel_id} (type {})", channel.kind);
        session
            .channels
            .write()
            .await
            .insert(channel_id, channel.clone());

        Ok(channel)
    }

    /// Post `content` to a text channel.
    pub async fn post_message(&self, channel_id: u64, content: &str) -> Result<(), BotError> {
        let result = self.try_post(channel_id, content).await;

        if matches!(result, Err(BotError::Unauthorized)) {
            self.reset().await;
        }

        result
    }

    async fn try_post(&self, channel_id: u64, content: &str) -> Result<(), BotError> {
        let session = self.session().await?;
        let channel = self.channel(&session, channel_id).await?;

        if !channel.accepts_text() {
            return Err(BotError::NotTextChannel(channel_id));
        }

        let body = truncate_with_ellipsis(content, MAX_MESSAGE_LEN - 3);
        let auth = self.auth_header()?;
        let response = self
            .client
            .post(self.url(&format!("/channels/{channel_id}/messages")))
            .header("Authorization", auth)
            .timeout(self.timeout)
            .json(&json!({ "content": body }))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(BotError::Unauthorized),
            status if status.is_success() => Ok(()),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(BotError::Api(format!("post answered with status {status}: {detail}")))
            }
        }
    }

    /// Drop the session and refuse further sends.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.session.lock().await.take().is_some() {
            info!("chat bot session closed");
        }
    }
}

/// Sends alerts to one channel through the shared bot connection
pub struct BotSink {
    id: String,
    channel_id: u64,
    connection: Arc<BotConnection>,
}

impl BotSink {
    pub fn new(id: &str, channel_id: u64, connection: Arc<BotConnection>) -> Self {
        Self {
            id: id.to_string(),
            channel_id,
            connection,
        }
    }
}

#[async_trait]
impl DeliverySink for BotSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "chat_bot"
    }

    #[instrument(skip(self, message), fields(sink = %self.id, channel = self.channel_id))]
    async fn send(&self, message: &str) -> DeliveryOutcome {
        match self.connection.post_message(self.channel_id, message).await {
            Ok(()) => {
                info!(
                    "bot message sent to channel {} (ID: {})",
                    self.channel_id, self.id
                );
                DeliveryOutcome::delivered()
            }
            Err(e) => {
                error!("failed to send bot message (ID: {}): {e}", self.id);
                DeliveryOutcome::failed(e)
            }
        }
    }
}
