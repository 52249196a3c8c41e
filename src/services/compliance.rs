//! Per-reviewer review compliance for one cycle.
//!
//! A reviewee counts as reviewed when a review by their reviewer, about them,
//! is filed under the cycle. Unreviewed reviewees are pending until the
//! deadline passes and overdue after it.

use futures::future::try_join;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::config::EngineConfig;
use crate::db::pool::DbPool;
use crate::db::{persons, reviews, with_timeout};
use crate::error::AppError;
use crate::models::Person;

use super::capacity::group_by_mentor;
use super::review_cycle::ReviewCycleWindow;

/// Review state of one reviewee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevieweeStatus {
    Reviewed,
    Pending,
    Overdue,
}

/// Review state of a reviewer across all their reviewees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Completed,
    Pending,
    Overdue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevieweeCompliance {
    pub subject_id: i64,
    pub subject_name: String,
    pub status: RevieweeStatus,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSnapshot {
    pub reviewer_id: i64,
    pub reviewer_name: String,
    pub campus: Option<String>,
    pub window: ReviewCycleWindow,
    pub reviewed_count: usize,

    /// Unreviewed reviewees, overdue or not.
    pub pending_count: usize,
    pub overdue_count: usize,
    pub status: ComplianceStatus,
    pub reviewee_details: Vec<RevieweeCompliance>,
}

impl ComplianceSnapshot {
    /// Share of reviewees already reviewed. A reviewer with no reviewees is
    /// fully compliant.
    pub fn completion_ratio(&self) -> f64 {
        let total = self.reviewed_count + self.pending_count;
        if total == 0 {
            return 1.0;
        }
        self.reviewed_count as f64 / total as f64
    }

    pub fn is_overdue(&self) -> bool {
        self.status == ComplianceStatus::Overdue
    }

    pub fn overdue_subject_ids(&self) -> Vec<i64> {
        self.reviewee_details
            .iter()
            .filter(|d| d.status == RevieweeStatus::Overdue)
            .map(|d| d.subject_id)
            .collect()
    }
}

/// Dashboard orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceOrder {
    /// Reviewer name, A to Z.
    Name,
    /// Most overdue reviewees first.
    OverdueCount,
    /// Least complete first.
    CompletionRatio,
}

/// Sort snapshots in place. Ties fall back to reviewer ID.
pub fn sort_snapshots(snapshots: &mut [ComplianceSnapshot], order: ComplianceOrder) {
    snapshots.sort_by(|a, b| {
        let primary = match order {
            ComplianceOrder::Name => a.reviewer_name.cmp(&b.reviewer_name),
            ComplianceOrder::OverdueCount => b.overdue_count.cmp(&a.overdue_count),
            ComplianceOrder::CompletionRatio => a
                .completion_ratio()
                .partial_cmp(&b.completion_ratio())
                .unwrap_or(Ordering::Equal),
        };
        primary.then(a.reviewer_id.cmp(&b.reviewer_id))
    });
}

/// Classify `reviewees` of `reviewer` against the pairs reviewed in `window`.
pub fn classify(
    reviewer: &Person,
    reviewees: &[&Person],
    reviewed_pairs: &HashSet<(i64, i64)>,
    window: ReviewCycleWindow,
) -> ComplianceSnapshot {
    let past_deadline = window.is_past_deadline();
    let days_overdue = window.days_overdue();

    let reviewee_details: Vec<RevieweeCompliance> = reviewees
        .iter()
        .map(|subject| {
            let reviewed = reviewed_pairs.contains(&(reviewer.id, subject.id));
            let status = match (reviewed, past_deadline) {
                (true, _) => RevieweeStatus::Reviewed,
                (false, false) => RevieweeStatus::Pending,
                (false, true) => RevieweeStatus::Overdue,
            };
            RevieweeCompliance {
                subject_id: subject.id,
                subject_name: subject.name.clone(),
                status,
                days_overdue: if status == RevieweeStatus::Overdue {
                    days_overdue
                } else {
                    0
                },
            }
        })
        .collect();

    let reviewed_count = reviewee_details
        .iter()
        .filter(|d| d.status == RevieweeStatus::Reviewed)
        .count();
    let pending_count = reviewee_details.len() - reviewed_count;
    let overdue_count = if past_deadline { pending_count } else { 0 };

    let status = if pending_count == 0 {
        ComplianceStatus::Completed
    } else if past_deadline {
        ComplianceStatus::Overdue
    } else {
        ComplianceStatus::Pending
    };

    ComplianceSnapshot {
        reviewer_id: reviewer.id,
        reviewer_name: reviewer.name.clone(),
        campus: reviewer.campus.clone(),
        window,
        reviewed_count,
        pending_count,
        overdue_count,
        status,
        reviewee_details,
    }
}

/// Read-only compliance reports over the store.
pub struct ComplianceAggregator {
    pool: DbPool,
    config: EngineConfig,
}

impl ComplianceAggregator {
    pub fn new(pool: DbPool, config: EngineConfig) -> Self {
        Self { pool, config }
    }

    /// Compliance of one reviewer. Unknown reviewers are `NotFound`.
    pub async fn snapshot_for(
        &self,
        reviewer_id: i64,
        window: ReviewCycleWindow,
    ) -> Result<ComplianceSnapshot, AppError> {
        with_timeout(self.config.store_timeout(), "compliance_snapshot", async {
            let reviewer = persons::require_person(&self.pool, reviewer_id).await?;
            let (reviewees, subjects) = try_join(
                persons::list_persons_by_mentor(&self.pool, reviewer_id),
                reviews::reviewed_subjects_in_cycle(
                    &self.pool,
                    reviewer_id,
                    window.week_start_unix(),
                ),
            )
            .await?;

            let reviewed: HashSet<(i64, i64)> =
                subjects.into_iter().map(|s| (reviewer_id, s)).collect();
            let reviewees: Vec<&Person> = reviewees.iter().collect();
            Ok::<_, AppError>(classify(&reviewer, &reviewees, &reviewed, window))
        })
        .await
    }

    /// Compliance of every person who holds a reviewer role or currently
    /// has reviewees, ordered by ID.
    pub async fn snapshot_all(
        &self,
        window: ReviewCycleWindow,
    ) -> Result<Vec<ComplianceSnapshot>, AppError> {
        let (people, pairs) = with_timeout(
            self.config.store_timeout(),
            "compliance_snapshot_all",
            try_join(
                persons::list_persons(&self.pool),
                reviews::reviewed_pairs_in_cycle(&self.pool, window.week_start_unix()),
            ),
        )
        .await?;

        let reviewed: HashSet<(i64, i64)> = pairs.into_iter().collect();
        let groups = group_by_mentor(&people);
        let by_id: HashMap<i64, &Person> =
            people.iter().map(|p| (p.id, p)).collect();

        let snapshots: Vec<ComplianceSnapshot> = people
            .iter()
            .filter(|p| p.is_reviewer() || groups.contains_key(&p.id))
            .map(|reviewer| {
                let reviewees: Vec<&Person> = groups
                    .get(&reviewer.id)
                    .map(|ids| ids.iter().filter_map(|id| by_id.get(id).copied()).collect())
                    .unwrap_or_default();
                classify(reviewer, &reviewees, &reviewed, window)
            })
            .collect();

        let overdue = snapshots.iter().filter(|s| s.is_overdue()).count();
        if overdue > 0 {
            log::info!(
                "[compliance] {} of {} reviewers overdue for cycle starting {}",
                overdue,
                snapshots.len(),
                window.cycle_start.date_naive()
            );
        }
        Ok(snapshots)
    }
}
