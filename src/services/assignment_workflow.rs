//! Reassignment request workflow.
//!
//! A request starts `pending` and ends `approved`, `rejected` (via [`decide`])
//! or `cancelled` (via [`cancel`]). Terminal requests never change again.
//!
//! Each command is one transaction: the request row and the learner's
//! `mentor_link`/`pending_mentor_link` change together or not at all. The
//! request's own state is the concurrency guard (a `pending`-only update), and
//! the reviewer's slot count is checked in the same statement that writes the
//! new `mentor_link`, so concurrent approvals cannot overrun capacity.
//!
//! [`decide`]: AssignmentWorkflow::decide
//! [`cancel`]: AssignmentWorkflow::cancel

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::pool::DbPool;
use crate::db::requests::{self, Transition};
use crate::db::{now_unix, persons, with_timeout};
use crate::error::AppError;
use crate::models::{Decision, NewReassignmentRequest, ReassignmentRequest, RequestState};

use super::authorization;
use super::capacity::{max_capacity, CapacityDirectory};

/// Input for [`AssignmentWorkflow::request_change`].
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    pub learner_id: i64,
    pub requested_reviewer_id: i64,

    /// Defaults to the learner's current reviewer.
    pub current_reviewer_id: Option<i64>,
    pub reason: Option<String>,
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Request lifecycle commands.
pub struct AssignmentWorkflow {
    pool: DbPool,
    directory: Arc<CapacityDirectory>,
    config: EngineConfig,
}

impl AssignmentWorkflow {
    pub fn new(
        pool: DbPool,
        directory: Arc<CapacityDirectory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            pool,
            directory,
            config,
        }
    }

    /// Open a pending request and point the learner's pending reviewer at it.
    ///
    /// # Errors
    /// * `Validation` - learner asks for themselves or their current reviewer
    /// * `NotFound` - learner or requested reviewer does not exist
    /// * `InvalidState` - learner already has a pending request
    pub async fn request_change(&self, input: ChangeRequest) -> Result<ReassignmentRequest, AppError> {
        with_timeout(self.config.store_timeout(), "request_change", async {
            if input.learner_id == input.requested_reviewer_id {
                return Err(AppError::validation_field(
                    "A learner cannot request themselves as reviewer",
                    "requested_reviewer_id",
                ));
            }

            let learner = persons::require_person(&self.pool, input.learner_id).await?;
            persons::require_person(&self.pool, input.requested_reviewer_id).await?;

            if learner.mentor_link == Some(input.requested_reviewer_id) {
                return Err(AppError::validation_field(
                    format!(
                        "Person {} is already reviewed by {}",
                        learner.id, input.requested_reviewer_id
                    ),
                    "requested_reviewer_id",
                ));
            }

            let new_request = NewReassignmentRequest {
                learner_id: learner.id,
                current_reviewer_id: input.current_reviewer_id.or(learner.mentor_link),
                requested_reviewer_id: input.requested_reviewer_id,
                reason: non_empty(input.reason),
                created_at: now_unix(),
            };

            let mut tx = self.pool.begin().await?;
            let request = requests::insert_request(&mut *tx, &new_request).await?;
            if !persons::set_pending_mentor_link(&mut *tx, learner.id, Some(request.requested_reviewer_id))
                .await?
            {
                return Err(AppError::not_found_with_id("Person", learner.id));
            }
            tx.commit().await?;

            log::info!(
                "[workflow] Request {} opened: learner {} -> reviewer {}",
                request.id,
                request.learner_id,
                request.requested_reviewer_id
            );
            Ok::<_, AppError>(request)
        })
        .await
    }

    /// Approve or reject a pending request.
    ///
    /// Capacity is checked at decision time inside the transaction, never at
    /// submission time.
    ///
    /// # Errors
    /// * `NotFound` - request or actor does not exist
    /// * `InvalidState` - request is not pending (including losing a race)
    /// * `Unauthorized` - actor may not decide this request
    /// * `CapacityExceeded` - approval with no free slot; request stays pending
    pub async fn decide(
        &self,
        request_id: i64,
        actor_id: i64,
        decision: Decision,
        notes: Option<String>,
    ) -> Result<ReassignmentRequest, AppError> {
        with_timeout(self.config.store_timeout(), "decide", async {
            let request = requests::require_request(&self.pool, request_id).await?;
            if !request.is_pending() {
                return Err(AppError::invalid_state(format!(
                    "Request {} is already {}",
                    request.id, request.state
                )));
            }

            let notes = non_empty(notes);
            let mut tx = self.pool.begin().await?;

            // Writing first takes the database write lock for the whole transaction.
            if !persons::touch_person(&mut *tx, actor_id).await? {
                return Err(AppError::not_found_with_id("Person", actor_id));
            }
            let transition = Transition {
                to: decision.resulting_state(),
                decided_at: now_unix(),
                decided_by: actor_id,
                decision_notes: notes.as_deref(),
            };
            if !requests::transition_from_pending(&mut *tx, request.id, &transition).await? {
                return Err(AppError::invalid_state(format!(
                    "Request {} is no longer pending",
                    request.id
                )));
            }

            // Roles and reviewees are read under the lock; a denial rolls back.
            let actor = persons::require_person(&mut *tx, actor_id).await?;
            if !authorization::can_decide_reassignment_in(&mut *tx, &actor, &request).await? {
                log::warn!(
                    "[workflow] Person {} denied deciding request {}",
                    actor.id,
                    request.id
                );
                return Err(AppError::unauthorized(format!(
                    "Person {} may not decide request {}",
                    actor.id, request.id
                )));
            }

            let mut touched_campuses = Vec::new();
            match decision {
                Decision::Approve => {
                    let reviewer =
                        persons::require_person(&mut *tx, request.requested_reviewer_id).await?;
                    let learner = persons::require_person(&mut *tx, request.learner_id).await?;
                    let capacity = max_capacity(&reviewer, self.config.default_capacity).limit();

                    let assigned = persons::assign_mentor_within_capacity(
                        &mut *tx,
                        learner.id,
                        reviewer.id,
                        capacity,
                    )
                    .await?;
                    if !assigned {
                        log::warn!(
                            "[workflow] Request {} not approved: reviewer {} is full",
                            request.id,
                            reviewer.id
                        );
                        return Err(AppError::capacity_exceeded(
                            reviewer.id,
                            capacity.unwrap_or_default(),
                        ));
                    }

                    touched_campuses.push(reviewer.campus);
                    if let Some(previous) = learner.mentor_link {
                        if let Some(previous) = persons::get_person(&mut *tx, previous).await? {
                            touched_campuses.push(previous.campus);
                        }
                    }
                }
                Decision::Reject => {
                    persons::set_pending_mentor_link(&mut *tx, request.learner_id, None).await?;
                }
            }

            let decided = requests::require_request(&mut *tx, request.id).await?;
            tx.commit().await?;

            if decision == Decision::Approve {
                self.directory.invalidate_campuses(touched_campuses).await;
            }

            log::info!(
                "[workflow] Request {} {} by person {}",
                decided.id,
                decided.state,
                actor.id
            );
            Ok::<_, AppError>(decided)
        })
        .await
    }

    /// Withdraw a pending request. Only the requesting learner may cancel.
    ///
    /// The request is kept as `cancelled`.
    ///
    /// # Errors
    /// * `NotFound` - request does not exist
    /// * `Unauthorized` - actor is not the request's learner
    /// * `InvalidState` - request is not pending (including losing a race)
    pub async fn cancel(&self, request_id: i64, actor_id: i64) -> Result<ReassignmentRequest, AppError> {
        with_timeout(self.config.store_timeout(), "cancel", async {
            let request = requests::require_request(&self.pool, request_id).await?;
            if actor_id != request.learner_id {
                return Err(AppError::unauthorized(format!(
                    "Only learner {} may cancel request {}",
                    request.learner_id, request.id
                )));
            }
            if !request.is_pending() {
                return Err(AppError::invalid_state(format!(
                    "Request {} is already {}",
                    request.id, request.state
                )));
            }

            let mut tx = self.pool.begin().await?;
            let transition = Transition {
                to: RequestState::Cancelled,
                decided_at: now_unix(),
                decided_by: actor_id,
                decision_notes: None,
            };
            if !requests::transition_from_pending(&mut *tx, request.id, &transition).await? {
                return Err(AppError::invalid_state(format!(
                    "Request {} is no longer pending",
                    request.id
                )));
            }
            persons::set_pending_mentor_link(&mut *tx, request.learner_id, None).await?;
            let cancelled = requests::require_request(&mut *tx, request.id).await?;
            tx.commit().await?;

            log::info!("[workflow] Request {} cancelled by learner", cancelled.id);
            Ok::<_, AppError>(cancelled)
        })
        .await
    }

    /// Delete a terminal request. Administrators only.
    ///
    /// # Errors
    /// * `NotFound` - request or actor does not exist
    /// * `Unauthorized` - actor is not an administrator
    /// * `InvalidState` - request is still pending
    pub async fn purge(&self, request_id: i64, actor_id: i64) -> Result<(), AppError> {
        with_timeout(self.config.store_timeout(), "purge", async {
            let actor = persons::require_person(&self.pool, actor_id).await?;
            if !actor.is_administrator() {
                return Err(AppError::unauthorized(format!(
                    "Person {} may not delete requests",
                    actor.id
                )));
            }

            let request = requests::require_request(&self.pool, request_id).await?;
            if !requests::delete_terminal_request(&self.pool, request.id).await? {
                return Err(AppError::invalid_state(format!(
                    "Request {} is still pending",
                    request.id
                )));
            }

            log::info!("[workflow] Request {} deleted by person {}", request.id, actor.id);
            Ok::<_, AppError>(())
        })
        .await
    }

    /// A learner's requests, newest first.
    pub async fn requests_for_learner(
        &self,
        learner_id: i64,
    ) -> Result<Vec<ReassignmentRequest>, AppError> {
        with_timeout(
            self.config.store_timeout(),
            "requests_for_learner",
            requests::list_requests_for_learner(&self.pool, learner_id),
        )
        .await
    }

    /// Every pending request, oldest first.
    pub async fn pending_requests(&self) -> Result<Vec<ReassignmentRequest>, AppError> {
        with_timeout(
            self.config.store_timeout(),
            "pending_requests",
            requests::list_requests_by_state(&self.pool, RequestState::Pending),
        )
        .await
    }
}
