use serde::Deserialize;
use std::time::Duration;
use url::Url;

const DEFAULT_USERS_URL: &str = "https://users.roblox.com";

fn default_users_base_url() -> Url {
    Url::parse(DEFAULT_USERS_URL).expect("default users url is valid")
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    10
}

fn default_base_delay_ms() -> u64 {
    2500
}

fn default_max_jitter_ms() -> u64 {
    500
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct NotifierConfig {
    /// Receives a message after every successful rank change.
    pub ranking_webhook: Option<Url>,
    /// Receives a single status message at startup.
    pub status_webhook: Option<Url>,
    /// Prepended to the startup status message, e.g. a role mention.
    pub developer_ping: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Bounds each individual webhook or username request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_users_base_url")]
    pub users_base_url: Url,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        NotifierConfig {
            ranking_webhook: None,
            status_webhook: None,
            developer_ping: None,
            retry: RetryConfig::default(),
            timeout_secs: default_timeout_secs(),
            users_base_url: default_users_base_url(),
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
