use crate::config::UpstreamConfig;
use crate::metrics_defs::UPSTREAM_REQUEST_DURATION;
use crate::page_token::{PageToken, deserialize_next_token};
use crate::types::{GroupId, UserId};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Deserializer, Serialize};
use shared::histogram;
use tokio::time::Instant;

const API_KEY_HEADER: &str = "x-api-key";
const ROLES_PAGE_SIZE: &str = "100";

/// A membership as returned by the groups API, before its references are parsed.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MembershipResource {
    /// `groups/{group_id}/memberships/{membership_id}`
    pub path: String,
    /// `users/{user_id}`
    pub user: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembershipsPage {
    #[serde(default)]
    group_memberships: Vec<MembershipResource>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleResource {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub display_name: String,
    pub rank: u32,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RolesPage {
    #[serde(default)]
    pub group_roles: Vec<RoleResource>,
    #[serde(default, deserialize_with = "deserialize_next_token")]
    pub next_page_token: Option<PageToken>,
}

/// The upstream's view of a membership after it was updated.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReceipt {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Serialize)]
struct UpdateMembershipBody {
    user: String,
    role: String,
}

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("groups api request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("groups api returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid api key header value")]
    InvalidApiKey,
}

/// The subset of the groups API needed to change a user's rank.
#[async_trait]
pub trait GroupsApi: Send + Sync {
    /// Looks up the membership of exactly one user. Returns `None` if the user
    /// is not in the group.
    async fn fetch_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Option<MembershipResource>, UpstreamError>;

    /// Fetches one page of the group's roles. `None` requests the first page.
    async fn fetch_roles_page(
        &self,
        group_id: GroupId,
        page_token: Option<&PageToken>,
    ) -> Result<RolesPage, UpstreamError>;

    async fn update_membership(
        &self,
        group_id: GroupId,
        membership_id: &str,
        user_id: UserId,
        role_id: &str,
    ) -> Result<UpdateReceipt, UpstreamError>;
}

pub struct GroupsClient {
    client: reqwest::Client,
    base_url: Url,
}

impl GroupsClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let mut api_key =
            HeaderValue::from_str(&config.api_key).map_err(|_| UpstreamError::InvalidApiKey)?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        Ok(GroupsClient {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl GroupsApi for GroupsClient {
    async fn fetch_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Option<MembershipResource>, UpstreamError> {
        let group = group_id.to_string();
        let mut url = self.endpoint(&["groups", &group, "memberships"])?;
        url.query_pairs_mut()
            .append_pair("maxPageSize", "1")
            .append_pair("filter", &format!("user=='users/{user_id}'"));

        let start = Instant::now();
        let response = self.client.get(url).send().await;
        histogram!(UPSTREAM_REQUEST_DURATION, "operation" => "fetch_membership")
            .record(start.elapsed().as_secs_f64());

        let page = check_status(response?)
            .await?
            .json::<MembershipsPage>()
            .await?;

        Ok(page.group_memberships.into_iter().next())
    }

    async fn fetch_roles_page(
        &self,
        group_id: GroupId,
        page_token: Option<&PageToken>,
    ) -> Result<RolesPage, UpstreamError> {
        let group = group_id.to_string();
        let mut url = self.endpoint(&["groups", &group, "roles"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("maxPageSize", ROLES_PAGE_SIZE);
            if let Some(token) = page_token {
                query.append_pair("pageToken", token.as_str());
            }
        }

        let start = Instant::now();
        let response = self.client.get(url).send().await;
        histogram!(UPSTREAM_REQUEST_DURATION, "operation" => "fetch_roles_page")
            .record(start.elapsed().as_secs_f64());

        Ok(check_status(response?).await?.json::<RolesPage>().await?)
    }

    async fn update_membership(
        &self,
        group_id: GroupId,
        membership_id: &str,
        user_id: UserId,
        role_id: &str,
    ) -> Result<UpdateReceipt, UpstreamError> {
        let group = group_id.to_string();
        let url = self.endpoint(&["groups", &group, "memberships", membership_id])?;
        let body = UpdateMembershipBody {
            user: format!("users/{user_id}"),
            role: format!("groups/{group_id}/roles/{role_id}"),
        };

        let start = Instant::now();
        let response = self.client.patch(url).json(&body).send().await;
        histogram!(UPSTREAM_REQUEST_DURATION, "operation" => "update_membership")
            .record(start.elapsed().as_secs_f64());

        Ok(check_status(response?)
            .await?
            .json::<UpdateReceipt>()
            .await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status { status, message })
}

// Role ids show up as JSON strings or numbers depending on the endpoint version.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}
