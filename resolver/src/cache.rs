//! Two independent TTL stores backing the cache-aside resolution path.
//!
//! Membership entries are keyed by (group, user) and role entries by
//! (group, rank). Entries are replaced wholesale and expire a fixed duration
//! after insertion. An expired entry is never returned; it stays in memory
//! until the purge task sweeps it out.
use crate::config::CacheConfig;
use crate::types::{MembershipKey, MembershipRecord, RoleKey, RoleRecord};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Expiry used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct TtlStore<K, V> {
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn new() -> Self {
        TtlStore {
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &K, now: Instant) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    fn set(&mut self, key: K, value: V, ttl: Duration, now: Instant) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now
                    .checked_add(ttl)
                    .unwrap_or_else(|| now + FAR_FUTURE),
            },
        );
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct Stores {
    memberships: TtlStore<MembershipKey, MembershipRecord>,
    roles: TtlStore<RoleKey, RoleRecord>,
}

/// Number of entries held by each store, expired ones included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSizes {
    pub memberships: usize,
    pub roles: usize,
}

/// Both stores sit behind one lock so that `clear` is observed atomically.
/// The lock is never held across an `.await`.
pub struct ResolutionCache {
    stores: RwLock<Stores>,
    membership_ttl: Duration,
    role_ttl: Duration,
}

impl ResolutionCache {
    pub fn new(config: &CacheConfig) -> Self {
        ResolutionCache {
            stores: RwLock::new(Stores {
                memberships: TtlStore::new(),
                roles: TtlStore::new(),
            }),
            membership_ttl: config.membership_ttl(),
            role_ttl: config.role_ttl(),
        }
    }

    pub fn get_membership(&self, key: &MembershipKey) -> Option<MembershipRecord> {
        self.stores.read().memberships.get(key, Instant::now())
    }

    pub fn set_membership(&self, record: MembershipRecord) {
        self.set_membership_with_ttl(record, self.membership_ttl);
    }

    pub fn set_membership_with_ttl(&self, record: MembershipRecord, ttl: Duration) {
        let key = record.key();
        self.stores
            .write()
            .memberships
            .set(key, record, ttl, Instant::now());
    }

    pub fn get_role(&self, key: &RoleKey) -> Option<RoleRecord> {
        self.stores.read().roles.get(key, Instant::now())
    }

    pub fn set_role(&self, record: RoleRecord) {
        self.set_role_with_ttl(record, self.role_ttl);
    }

    pub fn set_role_with_ttl(&self, record: RoleRecord, ttl: Duration) {
        let key = record.key();
        self.stores
            .write()
            .roles
            .set(key, record, ttl, Instant::now());
    }

    pub fn clear(&self) {
        let mut stores = self.stores.write();
        stores.memberships.clear();
        stores.roles.clear();
    }

    /// Drops expired entries from both stores and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut stores = self.stores.write();
        stores.memberships.purge_expired(now) + stores.roles.purge_expired(now)
    }

    pub fn sizes(&self) -> CacheSizes {
        let stores = self.stores.read();
        CacheSizes {
            memberships: stores.memberships.len(),
            roles: stores.roles.len(),
        }
    }
}

/// Periodically sweeps expired entries. `period` must be non-zero.
pub fn spawn_purge_task(cache: Arc<ResolutionCache>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, "Purged expired cache entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            membership_ttl_secs: 300,
            role_ttl_secs: 600,
            purge_interval_secs: 60,
        }
    }

    fn membership(group_id: u64, user_id: u64, membership_id: &str) -> MembershipRecord {
        MembershipRecord {
            group_id,
            user_id,
            membership_id: membership_id.into(),
        }
    }

    fn role(group_id: u64, rank: u8, role_id: &str) -> RoleRecord {
        RoleRecord {
            group_id,
            rank,
            role_id: role_id.into(),
            display_name: format!("Rank {rank}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_membership_expires_after_ttl() {
        let cache = ResolutionCache::new(&config());
        let record = membership(42, 111, "999");
        cache.set_membership(record.clone());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get_membership(&record.key()), Some(record.clone()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get_membership(&record.key()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_role_ttl_outlives_membership_ttl() {
        let cache = ResolutionCache::new(&config());
        let member = membership(42, 111, "999");
        let officer = role(42, 5, "777");
        cache.set_membership(member.clone());
        cache.set_role(officer.clone());

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.get_membership(&member.key()), None);
        assert_eq!(cache.get_role(&officer.key()), Some(officer.clone()));

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(cache.get_role(&officer.key()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_entry_and_ttl() {
        let cache = ResolutionCache::new(&config());
        cache.set_membership_with_ttl(membership(1, 2, "old"), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.set_membership_with_ttl(membership(1, 2, "new"), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;

        let key = MembershipKey {
            group_id: 1,
            user_id: 2,
        };
        assert_eq!(cache.get_membership(&key).unwrap().membership_id, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_saturates() {
        let cache = ResolutionCache::new(&CacheConfig {
            membership_ttl_secs: u64::MAX,
            role_ttl_secs: u64::MAX,
            purge_interval_secs: 60,
        });
        let member = membership(42, 111, "999");
        let officer = role(42, 5, "777");
        cache.set_membership(member.clone());
        cache.set_role_with_ttl(officer.clone(), Duration::MAX);

        tokio::time::advance(Duration::from_secs(86400 * 365)).await;
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.get_membership(&member.key()), Some(member));
        assert_eq!(cache.get_role(&officer.key()), Some(officer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_do_not_collide_across_groups() {
        let cache = ResolutionCache::new(&config());
        cache.set_membership(membership(1, 23, "a"));
        cache.set_membership(membership(12, 3, "b"));

        let first = MembershipKey {
            group_id: 1,
            user_id: 23,
        };
        let second = MembershipKey {
            group_id: 12,
            user_id: 3,
        };
        assert_eq!(cache.get_membership(&first).unwrap().membership_id, "a");
        assert_eq!(cache.get_membership(&second).unwrap().membership_id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_empties_both_stores() {
        let cache = ResolutionCache::new(&config());
        let member = membership(42, 111, "999");
        let officer = role(42, 5, "777");
        cache.set_membership(member.clone());
        cache.set_role(officer.clone());

        cache.clear();

        assert_eq!(cache.get_membership(&member.key()), None);
        assert_eq!(cache.get_role(&officer.key()), None);
        assert_eq!(
            cache.sizes(),
            CacheSizes {
                memberships: 0,
                roles: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_removes_only_expired_entries() {
        let cache = ResolutionCache::new(&config());
        cache.set_membership(membership(42, 1, "a"));
        cache.set_role(role(42, 5, "777"));

        tokio::time::advance(Duration::from_secs(400)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(
            cache.sizes(),
            CacheSizes {
                memberships: 0,
                roles: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_task_sweeps_periodically() {
        let cache = Arc::new(ResolutionCache::new(&config()));
        cache.set_membership_with_ttl(membership(42, 1, "a"), Duration::from_secs(5));
        let handle = spawn_purge_task(cache.clone(), Duration::from_secs(60));

        // Expired but not yet swept.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.sizes().memberships, 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(cache.sizes().memberships, 0);

        handle.abort();
    }
}
