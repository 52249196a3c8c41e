//! Database queries for persons.
//!
//! Functions that take an executor run equally against the pool (snapshot
//! reads) or inside a workflow transaction.

use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::Row;

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{CapabilitySet, NewPerson, Person, ProfileUpdate};

const PERSON_COLUMNS: &str =
    "id, name, capabilities, campus, mentor_link, pending_mentor_link, capacity_override, created_at";

fn person_from_row(row: &SqliteRow) -> Result<Person, AppError> {
    let capabilities: String = row.try_get("capabilities")?;
    Ok(Person {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        capabilities: CapabilitySet::from_json(&capabilities)?,
        campus: row.try_get("campus")?,
        mentor_link: row.try_get("mentor_link")?,
        pending_mentor_link: row.try_get("pending_mentor_link")?,
        capacity_override: row.try_get("capacity_override")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert a person and return the stored row.
///
/// A `mentor_link` is applied through [`assign_mentor_within_capacity`] in the
/// same transaction, so registering a reviewee never overfills a bounded
/// reviewer. `default_capacity` applies to mentors without an override.
pub async fn insert_person(
    pool: &DbPool,
    input: &NewPerson,
    default_capacity: i64,
) -> Result<Person, AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::validation_field("Name must not be empty", "name"));
    }
    if input.capacity_override.is_some_and(|c| c < 0) {
        return Err(AppError::validation_field(
            "Capacity override must not be negative",
            "capacity_override",
        ));
    }

    let mut tx = pool.begin().await?;

    let sql = format!(
        r#"
        INSERT INTO persons (name, capabilities, campus, capacity_override, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        PERSON_COLUMNS
    );

    let row = sqlx::query(&sql)
        .bind(&input.name)
        .bind(input.capabilities.to_json()?)
        .bind(&input.campus)
        .bind(input.capacity_override)
        .bind(crate::db::now_unix())
        .fetch_one(&mut *tx)
        .await?;
    let inserted = person_from_row(&row)?;

    let Some(mentor_id) = input.mentor_link else {
        tx.commit().await?;
        return Ok(inserted);
    };

    let mentor = require_person(&mut *tx, mentor_id).await?;
    let limit = mentor.capacity_limit(default_capacity);
    if !assign_mentor_within_capacity(&mut *tx, inserted.id, mentor_id, limit).await? {
        log::warn!(
            "[db] Refused to register {:?} under full reviewer {}",
            input.name,
            mentor_id
        );
        return Err(AppError::capacity_exceeded(mentor_id, limit.unwrap_or_default()));
    }

    let stored = require_person(&mut *tx, inserted.id).await?;
    tx.commit().await?;

    Ok(stored)
}

/// Get a person by ID.
pub async fn get_person<'e, E>(executor: E, id: i64) -> Result<Option<Person>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {} FROM persons WHERE id = ?", PERSON_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;

    row.as_ref().map(person_from_row).transpose()
}

/// Get a person by ID, failing with `NotFound`.
pub async fn require_person<'e, E>(executor: E, id: i64) -> Result<Person, AppError>
where
    E: SqliteExecutor<'e>,
{
    get_person(executor, id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("Person", id))
}

/// List every person, ordered by ID.
pub async fn list_persons<'e, E>(executor: E) -> Result<Vec<Person>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {} FROM persons ORDER BY id", PERSON_COLUMNS);
    let rows = sqlx::query(&sql).fetch_all(executor).await?;

    rows.iter().map(person_from_row).collect()
}

/// List the persons whose current reviewer is `mentor_id`.
pub async fn list_persons_by_mentor<'e, E>(
    executor: E,
    mentor_id: i64,
) -> Result<Vec<Person>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM persons WHERE mentor_link = ? ORDER BY id",
        PERSON_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(mentor_id).fetch_all(executor).await?;

    rows.iter().map(person_from_row).collect()
}

/// Count the persons whose current reviewer is `mentor_id`.
pub async fn count_reviewees<'e, E>(executor: E, mentor_id: i64) -> Result<i64, AppError>
where
    E: SqliteExecutor<'e>,
{
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM persons WHERE mentor_link = ?")
        .bind(mentor_id)
        .fetch_one(executor)
        .await?;

    Ok(count.0)
}

/// Set or clear the pending reviewer of a person.
///
/// # Returns
/// Whether a row was updated
pub async fn set_pending_mentor_link<'e, E>(
    executor: E,
    person_id: i64,
    pending: Option<i64>,
) -> Result<bool, AppError>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE persons SET pending_mentor_link = ? WHERE id = ?")
        .bind(pending)
        .bind(person_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Point a learner at a reviewer, but only while the reviewer has a free slot.
///
/// The slot count and the write happen in one statement, so two concurrent
/// approvals can never both take the last slot. `capacity = None` means
/// unbounded. Also clears the learner's pending reviewer.
///
/// # Returns
/// `false` when the reviewer is full (nothing was written)
pub async fn assign_mentor_within_capacity<'e, E>(
    executor: E,
    learner_id: i64,
    reviewer_id: i64,
    capacity: Option<i64>,
) -> Result<bool, AppError>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE persons
        SET mentor_link = ?, pending_mentor_link = NULL
        WHERE id = ?
          AND (
            ? IS NULL
            OR (SELECT COUNT(*) FROM persons WHERE mentor_link = ? AND id != ?) < ?
          )
        "#,
    )
    .bind(reviewer_id)
    .bind(learner_id)
    .bind(capacity)
    .bind(reviewer_id)
    .bind(learner_id)
    .bind(capacity)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// No-op write on a person's row.
///
/// Used as the first statement of a transaction that reads before it writes,
/// so the write lock is held from the start.
///
/// # Returns
/// Whether the person exists
pub async fn touch_person<'e, E>(executor: E, person_id: i64) -> Result<bool, AppError>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE persons SET name = name WHERE id = ?")
        .bind(person_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Detach a person from their current reviewer.
///
/// # Returns
/// Whether a link was cleared
pub async fn clear_mentor_link<'e, E>(executor: E, person_id: i64) -> Result<bool, AppError>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE persons SET mentor_link = NULL WHERE id = ? AND mentor_link IS NOT NULL",
    )
    .bind(person_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Apply a profile edit (name, capabilities, campus, capacity override).
///
/// Fails with `CapacityExceeded` when the edited roles or override would leave
/// the person with fewer slots than current reviewees.
pub async fn update_profile(
    pool: &DbPool,
    person_id: i64,
    update: &ProfileUpdate,
    default_capacity: i64,
) -> Result<Person, AppError> {
    if update.capacity_override.flatten().is_some_and(|c| c < 0) {
        return Err(AppError::validation_field(
            "Capacity override must not be negative",
            "capacity_override",
        ));
    }

    let mut tx = pool.begin().await?;

    // Touch the row first so the transaction holds the write lock before reading.
    if !touch_person(&mut *tx, person_id).await? {
        return Err(AppError::not_found_with_id("Person", person_id));
    }

    let current = require_person(&mut *tx, person_id).await?;

    let merged = Person {
        name: update.name.clone().unwrap_or(current.name),
        capabilities: update.capabilities.clone().unwrap_or(current.capabilities),
        campus: update.campus.clone().unwrap_or(current.campus),
        capacity_override: update.capacity_override.unwrap_or(current.capacity_override),
        ..current
    };

    // The new limit must still hold everyone already assigned.
    if let Some(limit) = merged.capacity_limit(default_capacity) {
        let assigned = count_reviewees(&mut *tx, person_id).await?;
        if assigned > limit {
            log::warn!(
                "[db] Refused to set capacity {} for person {} holding {} reviewees",
                limit,
                person_id,
                assigned
            );
            return Err(AppError::capacity_exceeded(person_id, limit));
        }
    }

    sqlx::query(
        r#"
        UPDATE persons
        SET name = ?, capabilities = ?, campus = ?, capacity_override = ?
        WHERE id = ?
        "#,
    )
    .bind(&merged.name)
    .bind(merged.capabilities.to_json()?)
    .bind(&merged.campus)
    .bind(merged.capacity_override)
    .bind(person_id)
    .execute(&mut *tx)
    .await?;

    let updated = require_person(&mut *tx, person_id).await?;
    tx.commit().await?;

    Ok(updated)
}
