use crate::cache::ResolutionCache;
use crate::metrics_defs::ROLE_PAGES_FETCHED;
use crate::page_token::PageToken;
use crate::types::{
    GroupId, MembershipKey, MembershipRecord, Rank, Resolution, RoleKey, RoleRecord, UserId,
};
use crate::upstream::{GroupsApi, MembershipResource, RoleResource, UpstreamError};
use shared::histogram;
use shared::metrics::{CacheCategory, Metrics};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("membership not found")]
    MembershipNotFound,

    #[error("role not found")]
    RoleNotFound,

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Resolves the identifiers needed for a rank change, consulting the cache
/// before the groups API and writing fetched records back into it.
///
/// Concurrent misses for the same key are not coalesced: each caller fetches
/// upstream and the last write wins.
#[derive(Clone)]
pub struct Resolver {
    api: Arc<dyn GroupsApi>,
    cache: Arc<ResolutionCache>,
    metrics: Metrics,
}

impl Resolver {
    pub fn new(api: Arc<dyn GroupsApi>, cache: Arc<ResolutionCache>, metrics: Metrics) -> Self {
        Resolver {
            api,
            cache,
            metrics,
        }
    }

    pub async fn resolve(
        &self,
        group_id: GroupId,
        user_id: UserId,
        rank: Rank,
    ) -> Result<Resolution, ResolveError> {
        // Membership always goes first so hit/miss counts stay comparable.
        let membership = self.resolve_membership(group_id, user_id).await?;
        let role = self.resolve_role(group_id, rank).await?;

        Ok(Resolution {
            membership_id: membership.membership_id,
            role_id: role.role_id,
            role_display_name: role.display_name,
        })
    }

    async fn resolve_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<MembershipRecord, ResolveError> {
        let key = MembershipKey { group_id, user_id };
        if let Some(record) = self.cache.get_membership(&key) {
            self.metrics.cache_hit(CacheCategory::Membership);
            return Ok(record);
        }
        self.metrics.cache_miss(CacheCategory::Membership);

        let resource = self
            .api
            .fetch_membership(group_id, user_id)
            .await?
            .ok_or(ResolveError::MembershipNotFound)?;

        let record = parse_membership(group_id, user_id, &resource).ok_or_else(|| {
            tracing::warn!(
                group_id,
                user_id,
                path = %resource.path,
                user = %resource.user,
                "Malformed membership returned by upstream"
            );
            ResolveError::MembershipNotFound
        })?;

        self.cache.set_membership(record.clone());
        Ok(record)
    }

    async fn resolve_role(&self, group_id: GroupId, rank: Rank) -> Result<RoleRecord, ResolveError> {
        let key = RoleKey { group_id, rank };
        if let Some(record) = self.cache.get_role(&key) {
            self.metrics.cache_hit(CacheCategory::Role);
            return Ok(record);
        }
        self.metrics.cache_miss(CacheCategory::Role);

        let role = self
            .find_role_by_rank(group_id, rank)
            .await?
            .ok_or(ResolveError::RoleNotFound)?;

        let record = RoleRecord {
            group_id,
            rank,
            role_id: role.id,
            display_name: role.display_name,
        };
        self.cache.set_role(record.clone());
        Ok(record)
    }

    /// Walks the role listing one page at a time, in token order, until a
    /// role with `rank` is found or the listing ends.
    async fn find_role_by_rank(
        &self,
        group_id: GroupId,
        rank: Rank,
    ) -> Result<Option<RoleResource>, UpstreamError> {
        let mut page_token: Option<PageToken> = None;
        let mut pages = 0_u32;

        let found = loop {
            let page = self
                .api
                .fetch_roles_page(group_id, page_token.as_ref())
                .await?;
            pages += 1;

            if let Some(role) = page
                .group_roles
                .into_iter()
                .find(|role| role.rank == u32::from(rank))
            {
                break Some(role);
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break None,
            }
        };

        histogram!(ROLE_PAGES_FETCHED).record(f64::from(pages));
        tracing::debug!(group_id, rank, pages, found = found.is_some(), "Walked role pages");
        Ok(found)
    }
}

/// Extracts the membership id from `groups/{g}/memberships/{m}` and checks that
/// `users/{u}` refers to the requested user.
fn parse_membership(
    group_id: GroupId,
    user_id: UserId,
    resource: &MembershipResource,
) -> Option<MembershipRecord> {
    let parsed_user_id = resource
        .user
        .strip_prefix("users/")?
        .parse::<UserId>()
        .ok()?;

    if parsed_user_id != user_id {
        return None;
    }

    let membership_id = resource
        .path
        .rsplit_once("/memberships/")
        .map(|(_, id)| id)
        .filter(|id| !id.is_empty() && !id.contains('/'))?;

    Some(MembershipRecord {
        group_id,
        user_id: parsed_user_id,
        membership_id: membership_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::testutils::{MockGroupsApi, role};
    use reqwest::StatusCode;
    use shared::metrics::CacheStats;
    use std::time::Duration;

    struct Fixture {
        api: Arc<MockGroupsApi>,
        cache: Arc<ResolutionCache>,
        metrics: Metrics,
        resolver: Resolver,
    }

    fn fixture() -> Fixture {
        let api = Arc::new(MockGroupsApi::new());
        let cache = Arc::new(ResolutionCache::new(&CacheConfig::default()));
        let metrics = Metrics::new();
        let resolver = Resolver::new(api.clone(), cache.clone(), metrics.clone());
        Fixture {
            api,
            cache,
            metrics,
            resolver,
        }
    }

    fn officer_on_page_two(api: &MockGroupsApi) {
        api.set_role_pages(
            42,
            vec![
                vec![role("1", "Guest", 0), role("2", "Member", 1)],
                vec![role("777", "Officer", 5), role("778", "Admin", 200)],
            ],
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_resolution_and_cached_repeat() {
        let f = fixture();
        f.api.add_membership(42, 111, "999");
        officer_on_page_two(&f.api);

        let expected = Resolution {
            membership_id: "999".into(),
            role_id: "777".into(),
            role_display_name: "Officer".into(),
        };

        assert_eq!(f.resolver.resolve(42, 111, 5).await.unwrap(), expected);
        assert_eq!(f.api.membership_calls(), 1);
        assert_eq!(f.api.role_page_calls(), 2);
        assert!(
            f.cache
                .get_membership(&MembershipKey {
                    group_id: 42,
                    user_id: 111
                })
                .is_some()
        );
        assert!(
            f.cache
                .get_role(&RoleKey {
                    group_id: 42,
                    rank: 5
                })
                .is_some()
        );

        let calls_before = f.api.upstream_calls();
        assert_eq!(f.resolver.resolve(42, 111, 5).await.unwrap(), expected);
        assert_eq!(f.api.upstream_calls(), calls_before);

        assert_eq!(
            f.metrics.snapshot().cache,
            CacheStats {
                membership_hits: 1,
                membership_misses: 1,
                role_hits: 1,
                role_misses: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_membership_miss_after_ttl() {
        let f = fixture();
        f.api.add_membership(42, 111, "999");
        officer_on_page_two(&f.api);

        f.resolver.resolve(42, 111, 5).await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        f.resolver.resolve(42, 111, 5).await.unwrap();
        assert_eq!(f.api.membership_calls(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        f.resolver.resolve(42, 111, 5).await.unwrap();
        assert_eq!(f.api.membership_calls(), 2);

        let stats = f.metrics.snapshot().cache;
        assert_eq!(stats.membership_hits, 1);
        assert_eq!(stats.membership_misses, 2);
        // Role entries live longer and are still cached.
        assert_eq!(stats.role_misses, 1);
        assert_eq!(stats.role_hits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_walks_every_page_when_rank_missing() {
        let f = fixture();
        f.api.add_membership(42, 111, "999");
        f.api.set_role_pages(
            42,
            vec![
                vec![role("1", "Guest", 0)],
                vec![role("2", "Member", 1)],
                vec![role("3", "Admin", 200)],
            ],
        );

        let err = f.resolver.resolve(42, 111, 5).await.unwrap_err();
        assert!(matches!(err, ResolveError::RoleNotFound));
        assert_eq!(f.api.role_page_calls(), 3);
        assert_eq!(
            f.api.requested_tokens(),
            vec![None, Some("page-1".into()), Some("page-2".into())]
        );
        assert_eq!(
            f.cache.get_role(&RoleKey {
                group_id: 42,
                rank: 5
            }),
            None
        );
        assert_eq!(f.cache.sizes().roles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_stops_at_match() {
        let f = fixture();
        f.api.add_membership(42, 111, "999");
        f.api.set_role_pages(
            42,
            vec![
                vec![role("1", "Guest", 0)],
                vec![role("777", "Officer", 5)],
                vec![role("3", "Admin", 200)],
            ],
        );

        f.resolver.resolve(42, 111, 5).await.unwrap();
        assert_eq!(f.api.role_page_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_page_listing() {
        let f = fixture();
        f.api.add_membership(42, 111, "999");
        f.api.set_role_pages(42, vec![vec![role("1", "Guest", 0)]]);

        let err = f.resolver.resolve(42, 111, 9).await.unwrap_err();
        assert!(matches!(err, ResolveError::RoleNotFound));
        assert_eq!(f.api.role_page_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_membership_not_found_skips_role_lookup() {
        let f = fixture();
        officer_on_page_two(&f.api);

        let err = f.resolver.resolve(42, 111, 5).await.unwrap_err();
        assert!(matches!(err, ResolveError::MembershipNotFound));
        assert_eq!(f.api.role_page_calls(), 0);
        assert_eq!(f.cache.sizes().memberships, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_membership_is_not_found() {
        let malformed = [
            ("groups/42/memberships/999", "members/111"),
            ("groups/42/memberships/999", "users/abc"),
            ("groups/42/memberships/", "users/111"),
            ("groups/42/roles/3", "users/111"),
            ("groups/42/memberships/999", "users/112"),
        ];

        for (path, user) in malformed {
            let f = fixture();
            f.api.add_raw_membership(
                42,
                111,
                MembershipResource {
                    path: path.into(),
                    user: user.into(),
                    role: None,
                },
            );
            officer_on_page_two(&f.api);

            let err = f.resolver.resolve(42, 111, 5).await.unwrap_err();
            assert!(
                matches!(err, ResolveError::MembershipNotFound),
                "{path} / {user} should be treated as not found"
            );
            assert_eq!(f.cache.sizes().memberships, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_failure_is_surfaced() {
        let f = fixture();
        f.api.fail_lookups(StatusCode::SERVICE_UNAVAILABLE);

        let err = f.resolver.resolve(42, 111, 5).await.unwrap_err();
        match err {
            ResolveError::Upstream(UpstreamError::Status { status, .. }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE)
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Not retried at this layer.
        assert_eq!(f.api.membership_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_cache_refetches_but_keeps_metrics() {
        let f = fixture();
        f.api.add_membership(42, 111, "999");
        officer_on_page_two(&f.api);

        f.resolver.resolve(42, 111, 5).await.unwrap();
        f.cache.clear();
        f.resolver.resolve(42, 111, 5).await.unwrap();

        assert_eq!(f.api.membership_calls(), 2);
        assert_eq!(f.api.role_page_calls(), 4);
        let stats = f.metrics.snapshot().cache;
        assert_eq!(stats.membership_misses, 2);
        assert_eq!(stats.role_misses, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_both_fetch_and_converge() {
        let f = fixture();
        f.api.add_membership(42, 111, "999");
        officer_on_page_two(&f.api);

        let (a, b) = tokio::join!(
            f.resolver.resolve(42, 111, 5),
            f.resolver.resolve(42, 111, 5)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(f.api.membership_calls(), 2);
        assert_eq!(f.cache.sizes().memberships, 1);
    }

    #[test]
    fn test_parse_membership() {
        let record = parse_membership(
            42,
            111,
            &MembershipResource {
                path: "groups/42/memberships/NTYxNjc4".into(),
                user: "users/111".into(),
                role: Some("groups/42/roles/1".into()),
            },
        )
        .unwrap();
        assert_eq!(record.membership_id, "NTYxNjc4");
        assert_eq!(record.user_id, 111);
    }
}
