//! Overdue review signals.
//!
//! Reminder delivery lives outside this crate; a dispatcher polls
//! [`collect`] and forwards each payload under [`REVIEW_OVERDUE_EVENT`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;

use super::compliance::{ComplianceAggregator, ComplianceSnapshot};
use super::review_cycle::ReviewCycleWindow;

/// Event: review-overdue
/// One per reviewer with at least one overdue reviewee.
pub const REVIEW_OVERDUE_EVENT: &str = "review-overdue";

/// Payload for review-overdue events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOverduePayload {
    pub reviewer_id: i64,
    pub reviewer_name: String,
    pub cycle_start: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub days_overdue: i64,

    /// Reviewees still missing a review.
    pub overdue_subject_ids: Vec<i64>,
}

impl ReviewOverduePayload {
    /// `None` unless the snapshot has overdue reviewees.
    pub fn from_snapshot(snapshot: &ComplianceSnapshot) -> Option<Self> {
        if snapshot.overdue_count == 0 {
            return None;
        }
        Some(Self {
            reviewer_id: snapshot.reviewer_id,
            reviewer_name: snapshot.reviewer_name.clone(),
            cycle_start: snapshot.window.cycle_start,
            deadline: snapshot.window.deadline,
            days_overdue: snapshot.window.days_overdue(),
            overdue_subject_ids: snapshot.overdue_subject_ids(),
        })
    }
}

/// Overdue payloads for every reviewer in `window`, ordered by reviewer ID.
pub async fn collect(
    aggregator: &ComplianceAggregator,
    window: ReviewCycleWindow,
) -> Result<Vec<ReviewOverduePayload>, AppError> {
    let payloads: Vec<ReviewOverduePayload> = aggregator
        .snapshot_all(window)
        .await?
        .iter()
        .filter_map(ReviewOverduePayload::from_snapshot)
        .collect();

    for payload in &payloads {
        log::info!(
            "[compliance] Reviewer {} is {} day(s) overdue on {} review(s)",
            payload.reviewer_id,
            payload.days_overdue,
            payload.overdue_subject_ids.len()
        );
    }
    Ok(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, DEFAULT_CAPACITY};
    use crate::db::persons::insert_person;
    use crate::db::test_support::setup_test_db;
    use crate::models::{Capability, NewPerson};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_collect_only_reports_overdue_reviewers() {
        let pool = setup_test_db().await;
        let late = insert_person(
            &pool,
            &NewPerson::named("Late").with_capability(Capability::Reviewer),
            DEFAULT_CAPACITY,
        )
        .await
        .unwrap();
        let idle = insert_person(
            &pool,
            &NewPerson::named("Idle").with_capability(Capability::Reviewer),
            DEFAULT_CAPACITY,
        )
        .await
        .unwrap();
        let learner = insert_person(
            &pool,
            &NewPerson::named("L").mentored_by(late.id),
            DEFAULT_CAPACITY,
        )
        .await
        .unwrap();

        let aggregator = ComplianceAggregator::new(pool, EngineConfig::default());
        let cycle = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();

        let before = ReviewCycleWindow::for_cycle(cycle, Utc.with_ymd_and_hms(2025, 1, 12, 9, 0, 0).unwrap());
        assert!(collect(&aggregator, before).await.unwrap().is_empty());

        let after = ReviewCycleWindow::for_cycle(cycle, Utc.with_ymd_and_hms(2025, 1, 14, 0, 0, 0).unwrap());
        let payloads = collect(&aggregator, after).await.unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].reviewer_id, late.id);
        assert_eq!(payloads[0].days_overdue, 2);
        assert_eq!(payloads[0].overdue_subject_ids, vec![learner.id]);
        assert!(payloads.iter().all(|p| p.reviewer_id != idle.id));

        let json = serde_json::to_value(&payloads[0]).unwrap();
        assert_eq!(json["reviewerName"], "Late");
        assert_eq!(json["daysOverdue"], 2);
    }
}
