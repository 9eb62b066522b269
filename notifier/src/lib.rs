pub mod config;
mod delivery;
mod message;
pub mod metrics_defs;
mod retry;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;
mod transport;
mod users;

pub use delivery::{NotificationError, Notifier};
pub use message::{
    NotificationOutcome, RankChangeNotifier, rank_change_payload, send_startup_status,
    startup_status_payload,
};
pub use retry::RetryPolicy;
pub use transport::{DeliveryError, HttpTransport, WebhookTransport};
pub use users::{UserDirectory, UsersClient, display_name};
