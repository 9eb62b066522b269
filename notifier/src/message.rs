use crate::delivery::Notifier;
use crate::transport::WebhookTransport;
use crate::users::{UserDirectory, display_name};
use serde_json::{Value, json};
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::task::JoinHandle;
use url::Url;

/// Green side bar on the status embed.
const STATUS_COLOR: u32 = 5763719;

/// A completed rank change, as reported to the ranking webhook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub user_id: u64,
    pub group_id: u64,
    pub role_display_name: String,
}

pub fn rank_change_payload(username: &str, role_display_name: &str) -> Value {
    json!({
        "content": format!(
            "The rank of **{username}** has been changed to **{role_display_name}**"
        )
    })
}

pub fn startup_status_payload(developer_ping: Option<&str>, now: OffsetDateTime) -> Value {
    // Rfc3339 only fails for years outside 0..=9999.
    let timestamp = now.format(&Rfc3339).unwrap_or_default();
    let mut payload = json!({
        "embeds": [{
            "title": "API STATUS",
            "description": "The API has been successfully restarted.",
            "color": STATUS_COLOR,
            "timestamp": timestamp,
        }]
    });
    if let Some(ping) = developer_ping {
        payload["content"] = Value::String(ping.to_string());
    }
    payload
}

/// Posts rank change messages to the ranking webhook in the background.
#[derive(Clone)]
pub struct RankChangeNotifier {
    notifier: Notifier,
    users: Arc<dyn UserDirectory>,
    webhook: Url,
}

impl RankChangeNotifier {
    pub fn new(notifier: Notifier, users: Arc<dyn UserDirectory>, webhook: Url) -> Self {
        RankChangeNotifier {
            notifier,
            users,
            webhook,
        }
    }

    /// Looks up the username and delivers the message on a detached task.
    /// Neither step can fail the caller.
    pub fn notify(&self, outcome: NotificationOutcome) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let username = display_name(outcome.user_id, this.users.username(outcome.user_id).await);
            let payload = rank_change_payload(&username, &outcome.role_display_name);
            tracing::debug!(
                user_id = outcome.user_id,
                group_id = outcome.group_id,
                "Sending rank change notification"
            );
            this.notifier.deliver(&this.webhook, &payload).await;
        })
    }
}

/// Sends the startup status message once. Failures are logged and dropped.
pub async fn send_startup_status(
    transport: &dyn WebhookTransport,
    webhook: &Url,
    developer_ping: Option<&str>,
) {
    let payload = startup_status_payload(developer_ping, OffsetDateTime::now_utc());
    match transport.post(webhook, &payload).await {
        Ok(()) => tracing::info!("Startup status sent"),
        Err(err) => tracing::error!(error = %err, "Failed to send startup status"),
    }
}
