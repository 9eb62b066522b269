//! Resolution of the membership and role identifiers needed to change a
//! user's rank, backed by a TTL cache in front of the groups API.

pub mod cache;
pub mod config;
pub mod metrics_defs;
pub mod page_token;
pub mod rank;
pub mod resolver;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;
pub mod types;
pub mod upstream;

pub use cache::ResolutionCache;
pub use rank::RankUpdater;
pub use resolver::{ResolveError, Resolver};
pub use upstream::{GroupsApi, GroupsClient, UpstreamError};
