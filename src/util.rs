use std::path::PathBuf;

const ELASTICSEARCH_HOST: &str = "ELASTICSEARCH_HOST";

const ELASTICSEARCH_PORT: &str = "ELASTICSEARCH_PORT";

const ELASTICSEARCH_USERNAME: &str = "ELASTICSEARCH_USERNAME";

const ELASTICSEARCH_PASSWORD: &str = "ELASTICSEARCH_PASSWORD";

const ELASTICSEARCH_VERIFY_CERTS: &str = "ELASTICSEARCH_VERIFY_CERTS";

const ELASTICSEARCH_CA_CERTS: &str = "ELASTICSEARCH_CA_CERTS";

const POLLING_INTERVAL: &str = "POLLING_INTERVAL";

const SMTP_USERNAME: &str = "SMTP_USERNAME";

const SMTP_PASSWORD: &str = "SMTP_PASSWORD";

const DISCORD_BOT_TOKEN: &str = "DISCORD_BOT_TOKEN";

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub fn get_store_host() -> Option<String> {
    non_empty(ELASTICSEARCH_HOST)
}

pub fn get_store_port() -> Option<u16> {
    non_empty(ELASTICSEARCH_PORT).and_then(|port| port.parse().ok())
}

pub fn get_store_username() -> Option<String> {
    non_empty(ELASTICSEARCH_USERNAME)
}

pub fn get_store_password() -> Option<String> {
    non_empty(ELASTICSEARCH_PASSWORD)
}

pub fn get_store_verify_certs() -> Option<bool> {
    non_empty(ELASTICSEARCH_VERIFY_CERTS).map(|flag| flag.eq_ignore_ascii_case("true"))
}

pub fn get_store_ca_certs() -> Option<PathBuf> {
    non_empty(ELASTICSEARCH_CA_CERTS).map(PathBuf::from)
}

pub fn get_polling_interval() -> Option<u64> {
    non_empty(POLLING_INTERVAL).and_then(|interval| interval.parse().ok())
}

pub fn get_smtp_username() -> Option<String> {
    non_empty(SMTP_USERNAME)
}

pub fn get_smtp_password() -> Option<String> {
    non_empty(SMTP_PASSWORD)
}

pub fn get_bot_token() -> Option<String> {
    non_empty(DISCORD_BOT_TOKEN)
}

/// Cut `text` down to `max` characters, appending `...` when something was cut.
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
