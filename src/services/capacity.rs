//! Reviewer capacity directory.
//!
//! Computes how many learners each person reviews, how many they may review,
//! and how many slots remain. Any person may act as a reviewer. Listings are
//! built from a single read of the person table grouped in memory, never from
//! one membership query per person.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::pool::DbPool;
use crate::db::{persons, with_timeout};
use crate::error::AppError;
use crate::models::Person;

use super::capacity_cache::{CapacityCache, DirectoryScope};

/// A slot count that may be unbounded (super reviewers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SlotLimit {
    Unbounded,
    Limited(i64),
}

impl SlotLimit {
    /// The bound, `None` when unbounded.
    pub fn limit(&self) -> Option<i64> {
        match self {
            Self::Unbounded => None,
            Self::Limited(n) => Some(*n),
        }
    }

    /// No slot left.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Limited(n) if *n <= 0)
    }
}

/// Load and availability of one reviewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacitySnapshot {
    pub reviewer_id: i64,
    pub reviewer_name: String,
    pub campus: Option<String>,

    /// Learners currently pointing at this reviewer.
    pub current: i64,
    pub max: SlotLimit,

    /// `max - current`, floored at 0.
    pub available: SlotLimit,
    pub reviewee_ids: Vec<i64>,
}

impl CapacitySnapshot {
    pub fn has_room(&self) -> bool {
        !self.available.is_exhausted()
    }

    pub fn is_reviewee(&self, person_id: i64) -> bool {
        self.reviewee_ids.contains(&person_id)
    }
}

/// Capacity of `reviewer`: unbounded for super reviewers, else the override or
/// the default.
pub fn max_capacity(reviewer: &Person, default_capacity: i64) -> SlotLimit {
    match reviewer.capacity_limit(default_capacity) {
        None => SlotLimit::Unbounded,
        Some(n) => SlotLimit::Limited(n),
    }
}

/// Build a snapshot from a reviewer and their current reviewees.
pub fn compute_snapshot(
    reviewer: &Person,
    reviewee_ids: Vec<i64>,
    default_capacity: i64,
) -> CapacitySnapshot {
    let current = reviewee_ids.len() as i64;
    let max = max_capacity(reviewer, default_capacity);
    let available = match max {
        SlotLimit::Unbounded => SlotLimit::Unbounded,
        SlotLimit::Limited(n) => SlotLimit::Limited((n - current).max(0)),
    };

    CapacitySnapshot {
        reviewer_id: reviewer.id,
        reviewer_name: reviewer.name.clone(),
        campus: reviewer.campus.clone(),
        current,
        max,
        available,
        reviewee_ids,
    }
}

/// Group every person's ID under their current reviewer.
pub fn group_by_mentor(people: &[Person]) -> BTreeMap<i64, Vec<i64>> {
    let mut groups: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for person in people {
        if let Some(mentor) = person.mentor_link {
            groups.entry(mentor).or_default().push(person.id);
        }
    }
    groups
}

/// Read side of reviewer capacity.
pub struct CapacityDirectory {
    pool: DbPool,
    cache: Arc<CapacityCache>,
    config: EngineConfig,
}

impl CapacityDirectory {
    pub fn new(pool: DbPool, cache: Arc<CapacityCache>, config: EngineConfig) -> Self {
        Self {
            pool,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<CapacityCache> {
        &self.cache
    }

    /// Capacity snapshot of one reviewer, read fresh from the store.
    pub async fn capacity_of(&self, reviewer_id: i64) -> Result<CapacitySnapshot, AppError> {
        with_timeout(self.config.store_timeout(), "capacity_of", async {
            // One read transaction so the person and their reviewees agree.
            let mut tx = self.pool.begin().await?;
            let reviewer = persons::require_person(&mut *tx, reviewer_id).await?;
            let reviewees = persons::list_persons_by_mentor(&mut *tx, reviewer_id).await?;
            tx.commit().await?;

            Ok::<_, AppError>(compute_snapshot(
                &reviewer,
                reviewees.iter().map(|p| p.id).collect(),
                self.config.default_capacity,
            ))
        })
        .await
    }

    /// Capacity snapshot of every person in `scope`, ordered by ID.
    ///
    /// Served from the cache while fresh; may be slightly stale.
    pub async fn list_all_with_capacity(
        &self,
        scope: DirectoryScope,
    ) -> Result<Vec<CapacitySnapshot>, AppError> {
        if let Some(cached) = self.cache.get(&scope).await {
            return Ok(cached);
        }

        let people = with_timeout(
            self.config.store_timeout(),
            "list_all_with_capacity",
            persons::list_persons(&self.pool),
        )
        .await?;

        let mut groups = group_by_mentor(&people);
        let snapshots: Vec<CapacitySnapshot> = people
            .iter()
            .filter(|p| match &scope {
                DirectoryScope::All => true,
                DirectoryScope::Campus(campus) => p.campus.as_deref() == Some(campus.as_str()),
            })
            .map(|p| {
                let reviewees = groups.remove(&p.id).unwrap_or_default();
                compute_snapshot(p, reviewees, self.config.default_capacity)
            })
            .collect();

        self.cache.put(scope, snapshots.clone()).await;
        Ok(snapshots)
    }

    /// Drop cached listings touched by a change to the given campuses.
    pub async fn invalidate_campuses<I>(&self, campuses: I)
    where
        I: IntoIterator<Item = Option<String>>,
    {
        self.cache.invalidate(&DirectoryScope::All).await;
        for campus in campuses.into_iter().flatten() {
            self.cache.invalidate(&DirectoryScope::Campus(campus)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CAPACITY;
    use crate::db::test_support::setup_test_db;
    use crate::models::{Capability, CapabilitySet, NewPerson};
    use std::time::Duration;

    fn person(id: i64, caps: &[Capability], capacity_override: Option<i64>) -> Person {
        Person {
            id,
            name: format!("P{}", id),
            capabilities: caps.iter().copied().collect::<CapabilitySet>(),
            campus: None,
            mentor_link: None,
            pending_mentor_link: None,
            capacity_override,
            created_at: 0,
        }
    }

    fn directory(pool: DbPool, ttl: Duration) -> CapacityDirectory {
        CapacityDirectory::new(
            pool,
            Arc::new(CapacityCache::new(ttl)),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_default_capacity_is_two() {
        let snapshot = compute_snapshot(&person(1, &[Capability::Reviewer], None), vec![5], 2);
        assert_eq!(snapshot.max, SlotLimit::Limited(2));
        assert_eq!(snapshot.available, SlotLimit::Limited(1));
        assert!(snapshot.has_room());
    }

    #[test]
    fn test_available_never_negative() {
        // Override lowered below the current load.
        let snapshot = compute_snapshot(
            &person(1, &[Capability::Reviewer], Some(1)),
            vec![5, 6, 7],
            2,
        );
        assert_eq!(snapshot.current, 3);
        assert_eq!(snapshot.available, SlotLimit::Limited(0));
        assert!(!snapshot.has_room());
    }

    #[test]
    fn test_super_reviewer_is_unbounded() {
        let snapshot = compute_snapshot(
            &person(1, &[Capability::SuperReviewer], Some(1)),
            vec![5, 6, 7],
            2,
        );
        assert_eq!(snapshot.max, SlotLimit::Unbounded);
        assert_eq!(snapshot.available, SlotLimit::Unbounded);
        assert!(snapshot.has_room());
    }

    #[test]
    fn test_group_by_mentor() {
        let mut a = person(1, &[], None);
        let mut b = person(2, &[], None);
        let c = person(3, &[], None);
        a.mentor_link = Some(3);
        b.mentor_link = Some(3);

        let groups = group_by_mentor(&[a, b, c]);
        assert_eq!(groups.get(&3), Some(&vec![1, 2]));
        assert_eq!(groups.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_of_reads_store() {
        let pool = setup_test_db().await;
        let reviewer = persons::insert_person(
            &pool,
            &NewPerson::named("R").with_capability(Capability::Reviewer),
            DEFAULT_CAPACITY,
        )
        .await
        .unwrap();
        let learner = persons::insert_person(
            &pool,
            &NewPerson::named("L").mentored_by(reviewer.id),
            DEFAULT_CAPACITY,
        )
        .await
        .unwrap();

        let dir = directory(pool, Duration::from_secs(60));
        let snapshot = dir.capacity_of(reviewer.id).await.unwrap();
        assert_eq!(snapshot.current, 1);
        assert_eq!(snapshot.reviewee_ids, vec![learner.id]);
        assert_eq!(snapshot.available, SlotLimit::Limited(1));

        let err = dir.capacity_of(9_999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_listing_scopes_and_cache_invalidation() {
        let pool = setup_test_db().await;
        let north = persons::insert_person(
            &pool,
            &NewPerson::named("N").on_campus("north"),
            DEFAULT_CAPACITY,
        )
        .await
        .unwrap();
        let south = persons::insert_person(
            &pool,
            &NewPerson::named("S").on_campus("south"),
            DEFAULT_CAPACITY,
        )
        .await
        .unwrap();
        let learner = persons::insert_person(
            &pool,
            &NewPerson::named("L").on_campus("south").mentored_by(north.id),
            DEFAULT_CAPACITY,
        )
        .await
        .unwrap();

        let dir = directory(pool.clone(), Duration::from_secs(60));

        let all = dir.list_all_with_capacity(DirectoryScope::All).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].reviewee_ids, vec![learner.id]);

        let south_only = dir
            .list_all_with_capacity(DirectoryScope::campus("south"))
            .await
            .unwrap();
        assert_eq!(
            south_only.iter().map(|s| s.reviewer_id).collect::<Vec<_>>(),
            vec![south.id, learner.id]
        );

        // A write behind the cache's back is not visible until invalidation.
        persons::clear_mentor_link(&pool, learner.id).await.unwrap();
        let stale = dir.list_all_with_capacity(DirectoryScope::All).await.unwrap();
        assert_eq!(stale[0].current, 1);

        dir.invalidate_campuses([north.campus.clone()]).await;
        let fresh = dir.list_all_with_capacity(DirectoryScope::All).await.unwrap();
        assert_eq!(fresh[0].current, 0);
    }
}
