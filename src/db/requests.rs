//! Database queries for reassignment requests.

use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::Row;

use crate::error::AppError;
use crate::models::{NewReassignmentRequest, ReassignmentRequest, RequestState};

const REQUEST_COLUMNS: &str = "id, learner_id, current_reviewer_id, requested_reviewer_id, state, reason, decision_notes, created_at, decided_at, decided_by";

fn request_from_row(row: &SqliteRow) -> Result<ReassignmentRequest, AppError> {
    let state: String = row.try_get("state")?;
    Ok(ReassignmentRequest {
        id: row.try_get("id")?,
        learner_id: row.try_get("learner_id")?,
        current_reviewer_id: row.try_get("current_reviewer_id")?,
        requested_reviewer_id: row.try_get("requested_reviewer_id")?,
        state: RequestState::try_from(state.as_str())?,
        reason: row.try_get("reason")?,
        decision_notes: row.try_get("decision_notes")?,
        created_at: row.try_get("created_at")?,
        decided_at: row.try_get("decided_at")?,
        decided_by: row.try_get("decided_by")?,
    })
}

/// Insert a new request in the `pending` state.
///
/// Fails with `InvalidState` if the learner already has a pending request.
pub async fn insert_request<'e, E>(
    executor: E,
    input: &NewReassignmentRequest,
) -> Result<ReassignmentRequest, AppError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        INSERT INTO reassignment_requests
            (learner_id, current_reviewer_id, requested_reviewer_id, state, reason, created_at)
        VALUES (?, ?, ?, 'pending', ?, ?)
        RETURNING {}
        "#,
        REQUEST_COLUMNS
    );

    let row = sqlx::query(&sql)
        .bind(input.learner_id)
        .bind(input.current_reviewer_id)
        .bind(input.requested_reviewer_id)
        .bind(&input.reason)
        .bind(input.created_at)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if crate::db::is_unique_violation(&e) {
                AppError::invalid_state(format!(
                    "Learner {} already has a pending reassignment request",
                    input.learner_id
                ))
            } else {
                e.into()
            }
        })?;

    request_from_row(&row)
}

/// Get a request by ID.
pub async fn get_request<'e, E>(
    executor: E,
    id: i64,
) -> Result<Option<ReassignmentRequest>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM reassignment_requests WHERE id = ?",
        REQUEST_COLUMNS
    );
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;

    row.as_ref().map(request_from_row).transpose()
}

/// Get a request by ID, failing with `NotFound`.
pub async fn require_request<'e, E>(executor: E, id: i64) -> Result<ReassignmentRequest, AppError>
where
    E: SqliteExecutor<'e>,
{
    get_request(executor, id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("ReassignmentRequest", id))
}

/// Terminal transition fields.
#[derive(Debug, Clone)]
pub struct Transition<'a> {
    pub to: RequestState,
    pub decided_at: i64,
    pub decided_by: i64,
    pub decision_notes: Option<&'a str>,
}

/// Move a request out of `pending`, guarded by its current state.
///
/// The `state = 'pending'` guard makes this a compare-and-swap: when two
/// actors race on the same request, exactly one update matches.
///
/// # Returns
/// `false` when the request was no longer pending (nothing was written)
pub async fn transition_from_pending<'e, E>(
    executor: E,
    id: i64,
    transition: &Transition<'_>,
) -> Result<bool, AppError>
where
    E: SqliteExecutor<'e>,
{
    if !transition.to.is_terminal() {
        return Err(AppError::internal("A request can only leave pending for a terminal state"));
    }

    let result = sqlx::query(
        r#"
        UPDATE reassignment_requests
        SET state = ?, decided_at = ?, decided_by = ?, decision_notes = ?
        WHERE id = ? AND state = 'pending'
        "#,
    )
    .bind(transition.to.as_str())
    .bind(transition.decided_at)
    .bind(transition.decided_by)
    .bind(transition.decision_notes)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a terminal request.
///
/// # Returns
/// `false` when no terminal request with this ID exists
pub async fn delete_terminal_request<'e, E>(executor: E, id: i64) -> Result<bool, AppError>
where
    E: SqliteExecutor<'e>,
{
    let result =
        sqlx::query("DELETE FROM reassignment_requests WHERE id = ? AND state != 'pending'")
            .bind(id)
            .execute(executor)
            .await?;

    Ok(result.rows_affected() > 0)
}

/// All requests made by a learner, newest first.
pub async fn list_requests_for_learner<'e, E>(
    executor: E,
    learner_id: i64,
) -> Result<Vec<ReassignmentRequest>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM reassignment_requests WHERE learner_id = ? ORDER BY created_at DESC, id DESC",
        REQUEST_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(learner_id).fetch_all(executor).await?;

    rows.iter().map(request_from_row).collect()
}

/// All requests in a given state, oldest first.
pub async fn list_requests_by_state<'e, E>(
    executor: E,
    state: RequestState,
) -> Result<Vec<ReassignmentRequest>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM reassignment_requests WHERE state = ? ORDER BY created_at ASC, id ASC",
        REQUEST_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(state.as_str())
        .fetch_all(executor)
        .await?;

    rows.iter().map(request_from_row).collect()
}
