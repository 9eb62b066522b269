use crate::transport::{DeliveryError, WebhookTransport};
use crate::users::UserDirectory;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use tokio::time::Instant;
use url::Url;

struct Attempt {
    url: Url,
    payload: Value,
    at: Instant,
}

/// Records every post and fails a configurable number of them first.
pub struct RecordingTransport {
    failures_left: Mutex<Option<usize>>,
    attempts: Mutex<Vec<Attempt>>,
}

impl RecordingTransport {
    /// Fails the first `failures` posts, then succeeds.
    pub fn failing_first(failures: usize) -> Self {
        RecordingTransport {
            failures_left: Mutex::new(Some(failures)),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        RecordingTransport {
            failures_left: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().iter().map(|a| a.at).collect()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.attempts.lock().iter().map(|a| a.payload.clone()).collect()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.attempts.lock().iter().map(|a| a.url.clone()).collect()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn post(&self, url: &Url, payload: &Value) -> Result<(), DeliveryError> {
        self.attempts.lock().push(Attempt {
            url: url.clone(),
            payload: payload.clone(),
            at: Instant::now(),
        });

        let mut failures_left = self.failures_left.lock();
        match failures_left.as_mut() {
            Some(0) => Ok(()),
            Some(n) => {
                *n -= 1;
                Err(DeliveryError::Status(StatusCode::SERVICE_UNAVAILABLE))
            }
            None => Err(DeliveryError::Status(StatusCode::SERVICE_UNAVAILABLE)),
        }
    }
}

/// Fixed user id to username table.
#[derive(Default)]
pub struct StaticUserDirectory {
    names: HashMap<u64, String>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: u64, name: &str) -> Self {
        self.names.insert(user_id, name.to_string());
        self
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn username(&self, user_id: u64) -> Option<String> {
        self.names.get(&user_id).cloned()
    }
}
