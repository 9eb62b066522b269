use notifier::config::NotifierConfig;
use resolver::config::{CacheConfig, UpstreamConfig};
use resolver::types::GroupId;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Group id cannot be 0")]
    InvalidGroupId,

    #[error("Empty {0} key")]
    EmptyKey(&'static str),

    #[error("Cache purge interval cannot be 0")]
    InvalidPurgeInterval,

    #[error("Rate limit cannot be 0")]
    InvalidRateLimit,

    #[error("Empty webhook system name")]
    EmptySystemName,

    #[error("Duplicate webhook system name: {0}")]
    DuplicateSystem(String),
}

fn default_rate_limit_per_minute() -> u32 {
    40
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    /// The single group whose members are ranked
    pub group_id: GroupId,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    pub auth: AuthConfig,
    /// Webhook targets for the proxy route, keyed by system name.
    ///
    /// Names are matched case-insensitively.
    #[serde(default)]
    pub proxy_webhooks: HashMap<String, Url>,
    /// Global request budget, shared by every client
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.auth.validate()?;

        if self.group_id == 0 {
            return Err(ValidationError::InvalidGroupId);
        }

        if self.cache.purge_interval_secs == 0 {
            return Err(ValidationError::InvalidPurgeInterval);
        }

        if self.rate_limit_per_minute == 0 {
            return Err(ValidationError::InvalidRateLimit);
        }

        let mut systems = HashSet::new();
        for name in self.proxy_webhooks.keys() {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptySystemName);
            }
            if !systems.insert(name.to_uppercase()) {
                return Err(ValidationError::DuplicateSystem(name.clone()));
            }
        }

        Ok(())
    }

    /// Proxy targets keyed by upper-cased system name.
    pub fn proxy_targets(&self) -> HashMap<String, Url> {
        self.proxy_webhooks
            .iter()
            .map(|(name, url)| (name.to_uppercase(), url.clone()))
            .collect()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 3080,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Shared secrets expected in the `x-access-key` and `x-admin-key` headers.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub access_key: String,
    pub admin_key: String,
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.access_key.is_empty() {
            return Err(ValidationError::EmptyKey("access"));
        }
        if self.admin_key.is_empty() {
            return Err(ValidationError::EmptyKey("admin"));
        }
        Ok(())
    }
}
