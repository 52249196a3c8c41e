//! Role-based authorization.
//!
//! Capabilities are not exclusive: a person holding several roles is granted
//! an action if any of their roles grants it. Acting on oneself is always
//! denied, whatever the roles.
//!
//! Reviewing and deciding are deliberately asymmetric. A plain reviewer may
//! review their own reviewees but may never decide a reassignment request,
//! not even one from their own reviewee. A super reviewer may decide a request
//! only to release one of their current reviewees; it cannot grant arbitrary
//! new assignments.

use std::sync::Arc;

use sqlx::SqliteConnection;

use crate::db::pool::DbPool;
use crate::db::{persons, with_timeout};
use crate::error::AppError;
use crate::models::{Person, ReassignmentRequest};

use super::capacity::CapacityDirectory;

/// May `actor` write a review about `subject`?
///
/// `actor_reviewee_ids` are the people currently reporting to `actor`.
pub fn can_review(actor: &Person, subject: &Person, actor_reviewee_ids: &[i64]) -> bool {
    if actor.id == subject.id {
        return false;
    }
    if actor.is_administrator() {
        return true;
    }
    if actor.is_academic_associate() && actor.shares_campus_with(subject) {
        return true;
    }
    actor.is_reviewer() && actor_reviewee_ids.contains(&subject.id)
}

/// May `actor` approve or reject `request`?
///
/// `learner` is the request's learner; `actor_reviewee_ids` are the people
/// currently reporting to `actor`.
pub fn can_decide_reassignment(
    actor: &Person,
    request: &ReassignmentRequest,
    learner: &Person,
    actor_reviewee_ids: &[i64],
) -> bool {
    if learner.id != request.learner_id || actor.id == request.learner_id {
        return false;
    }
    if actor.is_administrator() {
        return true;
    }
    if actor.is_academic_associate() && actor.shares_campus_with(learner) {
        return true;
    }
    // Plain reviewers get nothing here.
    actor.is_super_reviewer() && actor_reviewee_ids.contains(&request.learner_id)
}

/// Store-backed evaluation of the predicates above.
pub struct AuthorizationPolicy {
    pool: DbPool,
    directory: Arc<CapacityDirectory>,
    store_timeout: std::time::Duration,
}

impl AuthorizationPolicy {
    pub fn new(
        pool: DbPool,
        directory: Arc<CapacityDirectory>,
        store_timeout: std::time::Duration,
    ) -> Self {
        Self {
            pool,
            directory,
            store_timeout,
        }
    }

    async fn reviewees_of(&self, actor: &Person) -> Result<Vec<i64>, AppError> {
        if !actor.is_reviewer() {
            return Ok(Vec::new());
        }
        Ok(self.directory.capacity_of(actor.id).await?.reviewee_ids)
    }

    /// [`can_review`] for a subject ID. Unknown subjects are `NotFound`.
    pub async fn can_review(&self, actor: &Person, subject_id: i64) -> Result<bool, AppError> {
        if actor.id == subject_id {
            return Ok(false);
        }
        let subject = with_timeout(
            self.store_timeout,
            "can_review",
            persons::require_person(&self.pool, subject_id),
        )
        .await?;
        let reviewees = self.reviewees_of(actor).await?;

        Ok(can_review(actor, &subject, &reviewees))
    }
}

/// [`can_decide_reassignment`] evaluated on `conn`.
///
/// Run inside the deciding transaction, after its first write, so the learner
/// and the actor's reviewees are the rows the decision then changes.
pub async fn can_decide_reassignment_in(
    conn: &mut SqliteConnection,
    actor: &Person,
    request: &ReassignmentRequest,
) -> Result<bool, AppError> {
    if actor.id == request.learner_id {
        return Ok(false);
    }
    let learner = persons::require_person(&mut *conn, request.learner_id).await?;
    let reviewees: Vec<i64> = if actor.is_super_reviewer() {
        persons::list_persons_by_mentor(&mut *conn, actor.id)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect()
    } else {
        Vec::new()
    };

    Ok(can_decide_reassignment(actor, request, &learner, &reviewees))
}
