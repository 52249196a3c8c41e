//! Review submission and queries.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::pool::DbPool;
use crate::db::reviews::{self, CreatedRange};
use crate::db::{persons, with_timeout};
use crate::error::AppError;
use crate::models::{NewReviewRecord, ReviewDirection, ReviewRecord};

use super::authorization::AuthorizationPolicy;
use super::review_cycle::week_start_unix;
use super::scoring::{summarize, ScoreSummary};

pub struct ReviewLedger {
    pool: DbPool,
    policy: Arc<AuthorizationPolicy>,
    config: EngineConfig,
}

impl ReviewLedger {
    pub fn new(pool: DbPool, policy: Arc<AuthorizationPolicy>, config: EngineConfig) -> Self {
        Self {
            pool,
            policy,
            config,
        }
    }

    /// Record a review written by `actor_id`.
    ///
    /// Downward reviews need review rights over the subject; upward reviews
    /// may only target the actor's current reviewer. The review is filed under
    /// the cycle containing its `created_at`.
    pub async fn submit_review(
        &self,
        actor_id: i64,
        review: NewReviewRecord,
    ) -> Result<ReviewRecord, AppError> {
        review.validate()?;
        if review.reviewer_id != actor_id {
            return Err(AppError::unauthorized(format!(
                "Person {} cannot file a review as person {}",
                actor_id, review.reviewer_id
            )));
        }
        let week_start = week_start_unix(review.created_at)?;

        with_timeout(self.config.store_timeout(), "submit_review", async {
            let actor = persons::require_person(&self.pool, actor_id).await?;

            let allowed = match review.direction {
                ReviewDirection::Downward => self.policy.can_review(&actor, review.subject_id).await?,
                ReviewDirection::Upward => {
                    persons::require_person(&self.pool, review.subject_id).await?;
                    actor.mentor_link == Some(review.subject_id)
                }
            };
            if !allowed {
                log::warn!(
                    "[reviews] Person {} denied {} review of {}",
                    actor.id,
                    review.direction,
                    review.subject_id
                );
                return Err(AppError::unauthorized(format!(
                    "Person {} may not review person {}",
                    actor.id, review.subject_id
                )));
            }

            let record = reviews::insert_review(&self.pool, &review, week_start).await?;
            log::info!(
                "[reviews] {} review {} filed: {} -> {}",
                record.direction,
                record.id,
                record.reviewer_id,
                record.subject_id
            );
            Ok::<_, AppError>(record)
        })
        .await
    }

    /// Reviews written by a person, newest first.
    pub async fn reviews_by_reviewer(
        &self,
        reviewer_id: i64,
        range: CreatedRange,
    ) -> Result<Vec<ReviewRecord>, AppError> {
        with_timeout(
            self.config.store_timeout(),
            "reviews_by_reviewer",
            reviews::list_reviews_by_reviewer(&self.pool, reviewer_id, range),
        )
        .await
    }

    /// Reviews about a person, newest first.
    pub async fn reviews_for_subject(
        &self,
        subject_id: i64,
        range: CreatedRange,
    ) -> Result<Vec<ReviewRecord>, AppError> {
        with_timeout(
            self.config.store_timeout(),
            "reviews_for_subject",
            reviews::list_reviews_for_subject(&self.pool, subject_id, range),
        )
        .await
    }

    /// Score statistics for reviews of `subject_id` in one direction.
    pub async fn subject_summary(
        &self,
        subject_id: i64,
        direction: ReviewDirection,
        now: DateTime<Utc>,
    ) -> Result<ScoreSummary, AppError> {
        let records: Vec<ReviewRecord> = with_timeout(
            self.config.store_timeout(),
            "subject_summary",
            async {
                persons::require_person(&self.pool, subject_id).await?;
                reviews::list_reviews_for_subject(&self.pool, subject_id, CreatedRange::all()).await
            },
        )
        .await?
        .into_iter()
        .filter(|r| r.direction == direction)
        .collect();

        Ok(summarize(
            &records,
            now.timestamp(),
            self.config.score_window_days,
            self.config.trend_threshold,
        ))
    }
}
