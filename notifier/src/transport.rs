use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook returned {0}")]
    Status(StatusCode),
}

/// A single attempt at posting a JSON payload to a webhook.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &Url, payload: &Value) -> Result<(), DeliveryError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, url: &Url, payload: &Value) -> Result<(), DeliveryError> {
        let response = self.client.post(url.clone()).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status))
        }
    }
}
