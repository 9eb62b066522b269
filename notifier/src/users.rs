use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Resolves a user id to a display username for notification messages.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns `None` when the name cannot be looked up for any reason.
    async fn username(&self, user_id: u64) -> Option<String>;
}

/// Name to show for a user, falling back to the numeric id.
pub fn display_name(user_id: u64, username: Option<String>) -> String {
    username.unwrap_or_else(|| format!("UserId {user_id}"))
}

#[derive(Deserialize)]
struct UserResponse {
    name: String,
}

pub struct UsersClient {
    client: reqwest::Client,
    base_url: Url,
}

impl UsersClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(UsersClient { client, base_url })
    }

    async fn fetch(&self, user_id: u64) -> Result<String, reqwest::Error> {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", "users", &user_id.to_string()]);
        }

        let user = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<UserResponse>()
            .await?;
        Ok(user.name)
    }
}

#[async_trait]
impl UserDirectory for UsersClient {
    async fn username(&self, user_id: u64) -> Option<String> {
        match self.fetch(user_id).await {
            Ok(name) => Some(name),
            Err(err) => {
                tracing::warn!(user_id, error = %err, "Failed to fetch username");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_username_lookup() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/users/111"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 111,
                "name": "builderman",
                "displayName": "Builderman"
            })))
            .mount(&server)
            .await;

        let users =
            UsersClient::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5)).unwrap();
        assert_eq!(users.username(111).await.as_deref(), Some("builderman"));
    }

    #[tokio::test]
    async fn test_failed_lookup_falls_back_to_id() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let users =
            UsersClient::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5)).unwrap();
        let username = users.username(111).await;
        assert_eq!(username, None);
        assert_eq!(display_name(111, username), "UserId 111");
    }
}
