//! Cache for directory listings.
//!
//! Listings are keyed by scope (everyone, or one campus) and expire after a
//! fixed TTL. The workflow invalidates affected scopes after every committed
//! mutation; entries are never consulted on the decision path.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::capacity::CapacitySnapshot;

/// Which part of the directory a listing covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DirectoryScope {
    All,
    Campus(String),
}

impl DirectoryScope {
    pub fn campus(name: impl Into<String>) -> Self {
        Self::Campus(name.into())
    }
}

struct CachedListing {
    snapshots: Vec<CapacitySnapshot>,
    stored_at: Instant,
}

/// TTL cache of capacity listings.
pub struct CapacityCache {
    ttl: Duration,
    entries: RwLock<HashMap<DirectoryScope, CachedListing>>,
}

impl CapacityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh listing for `scope`, if any.
    pub async fn get(&self, scope: &DirectoryScope) -> Option<Vec<CapacitySnapshot>> {
        let entries = self.entries.read().await;
        entries
            .get(scope)
            .filter(|cached| cached.stored_at.elapsed() < self.ttl)
            .map(|cached| cached.snapshots.clone())
    }

    pub async fn put(&self, scope: DirectoryScope, snapshots: Vec<CapacitySnapshot>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            scope,
            CachedListing {
                snapshots,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop the listing for one scope.
    pub async fn invalidate(&self, scope: &DirectoryScope) {
        let removed = self.entries.write().await.remove(scope).is_some();
        if removed {
            log::debug!("[directory] Invalidated cached listing for {:?}", scope);
        }
    }

    /// Drop every listing.
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
        log::debug!("[directory] Invalidated all cached listings");
    }

    /// Number of stored listings, fresh or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for CapacityCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::config::DEFAULT_DIRECTORY_CACHE_TTL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::capacity::SlotLimit;

    fn snapshot(reviewer_id: i64) -> CapacitySnapshot {
        CapacitySnapshot {
            reviewer_id,
            reviewer_name: format!("R{}", reviewer_id),
            campus: None,
            current: 0,
            max: SlotLimit::Limited(2),
            available: SlotLimit::Limited(2),
            reviewee_ids: vec![],
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = CapacityCache::new(Duration::from_secs(60));
        assert!(cache.get(&DirectoryScope::All).await.is_none());

        cache.put(DirectoryScope::All, vec![snapshot(1)]).await;
        let cached = cache.get(&DirectoryScope::All).await.unwrap();
        assert_eq!(cached, vec![snapshot(1)]);
        assert!(cache.get(&DirectoryScope::campus("north")).await.is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_never_serves() {
        let cache = CapacityCache::new(Duration::ZERO);
        cache.put(DirectoryScope::All, vec![snapshot(1)]).await;
        assert!(cache.get(&DirectoryScope::All).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_one_scope() {
        let cache = CapacityCache::new(Duration::from_secs(60));
        cache.put(DirectoryScope::All, vec![snapshot(1)]).await;
        cache
            .put(DirectoryScope::campus("north"), vec![snapshot(2)])
            .await;

        cache.invalidate(&DirectoryScope::campus("north")).await;
        assert!(cache.get(&DirectoryScope::campus("north")).await.is_none());
        assert!(cache.get(&DirectoryScope::All).await.is_some());

        cache.invalidate_all().await;
        assert_eq!(cache.len().await, 0);
    }
}
