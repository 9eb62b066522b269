use serde::Deserialize;
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://apis.roblox.com/cloud/v2";

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base url is valid")
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_membership_ttl_secs() -> u64 {
    300
}

fn default_role_ttl_secs() -> u64 {
    600
}

fn default_purge_interval_secs() -> u64 {
    60
}

/// Connection settings for the groups API.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    pub api_key: String,
    /// Applies to each outbound call individually.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_membership_ttl_secs")]
    pub membership_ttl_secs: u64,
    #[serde(default = "default_role_ttl_secs")]
    pub role_ttl_secs: u64,
    /// How often expired entries are swept out of both stores.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            membership_ttl_secs: default_membership_ttl_secs(),
            role_ttl_secs: default_role_ttl_secs(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn membership_ttl(&self) -> Duration {
        Duration::from_secs(self.membership_ttl_secs)
    }

    pub fn role_ttl(&self) -> Duration {
        Duration::from_secs(self.role_ttl_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}
