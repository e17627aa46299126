use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use tracing::{trace, warn};

use crate::util;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Seconds between two poll cycles
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,

    #[serde(default)]
    pub store: StoreConfig,

    /// Shared SMTP relay used by every email method
    pub smtp: Option<SmtpConfig>,

    /// Shared chat bot session used by every bot method
    pub bot: Option<BotConfig>,

    #[serde(default)]
    pub notification_methods: Vec<NotificationMethodSpec>,

    #[serde(default)]
    pub notificators: Vec<NotificatorConfig>,

    #[serde(default)]
    pub monitors: Vec<MonitorTarget>,

    /// Notify API; not started when absent
    pub api: Option<ApiSettings>,
}

/// Connection parameters for the search index holding the alerts.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_host")]
    pub host: String,

    #[serde(default = "default_store_port")]
    pub port: u16,

    #[serde(default = "default_store_scheme")]
    pub scheme: String,

    #[serde(default = "default_store_username")]
    pub username: String,

    pub password: Option<String>,

    #[serde(default)]
    pub verify_certs: bool,

    /// PEM bundle with additional trusted CAs
    pub ca_certs: Option<PathBuf>,

    /// Request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_store_host(),
            port: default_store_port(),
            scheme: default_store_scheme(),
            username: default_store_username(),
            password: None,
            verify_certs: false,
            ca_certs: None,
            timeout: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Address used in the `From` header
    pub sender: String,

    #[serde(default = "default_true")]
    pub starttls: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BotConfig {
    pub token: Option<String>,

    #[serde(default = "default_bot_api_base")]
    pub api_base: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_bot_api_base(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_api_bind_addr")]
    pub bind_addr: SocketAddr,

    pub auth_token: Option<String>,

    #[serde(default)]
    pub enable_cors: bool,
}

/// One configured delivery channel. Only used to build a sink at startup.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(try_from = "RawMethodSpec")]
pub struct NotificationMethodSpec {
    pub id: String,
    pub kind: MethodKind,
}

#[derive(serde::Deserialize)]
struct RawMethodSpec {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    config: serde_json::Value,
}

impl TryFrom<RawMethodSpec> for NotificationMethodSpec {
    type Error = String;

    fn try_from(raw: RawMethodSpec) -> Result<Self, Self::Error> {
        let tagged = serde_json::json!({ "type": raw.kind, "config": raw.config });
        let kind = serde_json::from_value(tagged)
            .map_err(|e| format!("notification method '{}': {e}", raw.id))?;
        Ok(Self { id: raw.id, kind })
    }
}

/// Closed set of channel families. Unknown `type` values fail config loading.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum MethodKind {
    #[serde(alias = "emailSMTP")]
    EmailSmtp(EmailMethod),

    #[serde(alias = "discordWebhook")]
    ChatWebhook(WebhookMethod),

    #[serde(alias = "discordBot")]
    ChatBot(BotMethod),
}

impl MethodKind {
    pub fn name(&self) -> &'static str {
        match self {
            MethodKind::EmailSmtp(_) => "email_smtp",
            MethodKind::ChatWebhook(_) => "chat_webhook",
            MethodKind::ChatBot(_) => "chat_bot",
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EmailMethod {
    pub to_emails: Vec<String>,

    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookMethod {
    pub webhook_url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BotMethod {
    #[serde(deserialize_with = "numeric_id")]
    pub channel_id: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotificatorConfig {
    pub id: String,

    /// Method ids in delivery order
    #[serde(default)]
    pub notification_methods: Vec<String>,
}

/// A (collection, notificator) pairing watched by the poller.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct MonitorTarget {
    pub index: String,
    pub notificator_id: String,
}

impl MonitorTarget {
    pub fn new(index: impl ToString, notificator_id: impl ToString) -> Self {
        Self {
            index: index.to_string(),
            notificator_id: notificator_id.to_string(),
        }
    }
}

fn numeric_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn default_polling_interval() -> u64 {
    15
}

fn default_store_host() -> String {
    "localhost".to_string()
}

fn default_store_port() -> u16 {
    9200
}

fn default_store_scheme() -> String {
    "http".to_string()
}

fn default_store_username() -> String {
    "elastic".to_string()
}

fn default_store_timeout() -> u64 {
    60
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_bot_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_api_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_subject_prefix() -> String {
    "[Notification]".to_string()
}

impl Config {
    /// Let environment variables override store parameters and secrets.
    pub fn apply_env_overrides(&mut self) {
        if let Some(host) = util::get_store_host() {
            self.store.host = host;
        }
        if let Some(port) = util::get_store_port() {
            self.store.port = port;
        }
        if let Some(username) = util::get_store_username() {
            self.store.username = username;
        }
        if let Some(password) = util::get_store_password() {
            self.store.password = Some(password);
        }
        if let Some(verify) = util::get_store_verify_certs() {
            self.store.verify_certs = verify;
        }
        if let Some(path) = util::get_store_ca_certs() {
            self.store.ca_certs = Some(path);
        }
        if let Some(interval) = util::get_polling_interval() {
            self.polling_interval = interval;
        }

        if let Some(smtp) = self.smtp.as_mut() {
            if let Some(username) = util::get_smtp_username() {
                smtp.username = Some(username);
            }
            if let Some(password) = util::get_smtp_password() {
                smtp.password = Some(password);
            }
        }

        if let Some(token) = util::get_bot_token() {
            self.bot.get_or_insert_with(BotConfig::default).token = Some(token);
        }

        if self.polling_interval == 0 {
            warn!("polling interval of 0s is not allowed, falling back to 1s");
            self.polling_interval = 1;
        }
    }
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&file_content)?;
    config.apply_env_overrides();
    Ok(config)
}
