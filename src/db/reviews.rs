//! Database queries for review records.

use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::Row;

use crate::error::AppError;
use crate::models::{CategoryScores, NewReviewRecord, ReviewDirection, ReviewRecord};

const REVIEW_COLUMNS: &str =
    "id, reviewer_id, subject_id, direction, category_scores, week_start, notes, created_at";

/// Half-open `created_at` range. `None` bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreatedRange {
    /// Inclusive lower bound (Unix).
    pub from: Option<i64>,
    /// Exclusive upper bound (Unix).
    pub until: Option<i64>,
}

impl CreatedRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(from: i64) -> Self {
        Self {
            from: Some(from),
            until: None,
        }
    }

    pub fn between(from: i64, until: i64) -> Self {
        Self {
            from: Some(from),
            until: Some(until),
        }
    }
}

fn review_from_row(row: &SqliteRow) -> Result<ReviewRecord, AppError> {
    let direction: String = row.try_get("direction")?;
    let scores: String = row.try_get("category_scores")?;
    Ok(ReviewRecord {
        id: row.try_get("id")?,
        reviewer_id: row.try_get("reviewer_id")?,
        subject_id: row.try_get("subject_id")?,
        direction: ReviewDirection::try_from(direction.as_str())?,
        category_scores: serde_json::from_str::<CategoryScores>(&scores)?,
        week_start: row.try_get("week_start")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert a review. The caller supplies the normalized `week_start`.
///
/// Fails with `Validation` if the pair was already reviewed in that cycle.
pub async fn insert_review<'e, E>(
    executor: E,
    input: &NewReviewRecord,
    week_start: i64,
) -> Result<ReviewRecord, AppError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        INSERT INTO review_records
            (reviewer_id, subject_id, direction, category_scores, week_start, notes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        REVIEW_COLUMNS
    );

    let row = sqlx::query(&sql)
        .bind(input.reviewer_id)
        .bind(input.subject_id)
        .bind(input.direction.as_str())
        .bind(serde_json::to_string(&input.category_scores)?)
        .bind(week_start)
        .bind(&input.notes)
        .bind(input.created_at)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if crate::db::is_unique_violation(&e) {
                AppError::validation(format!(
                    "Person {} already submitted a {} review of person {} this cycle",
                    input.reviewer_id, input.direction, input.subject_id
                ))
            } else {
                e.into()
            }
        })?;

    review_from_row(&row)
}

/// Reviews written by `reviewer_id`, newest first.
pub async fn list_reviews_by_reviewer<'e, E>(
    executor: E,
    reviewer_id: i64,
    range: CreatedRange,
) -> Result<Vec<ReviewRecord>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {} FROM review_records
        WHERE reviewer_id = ?
          AND (? IS NULL OR created_at >= ?)
          AND (? IS NULL OR created_at < ?)
        ORDER BY created_at DESC, id DESC
        "#,
        REVIEW_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(reviewer_id)
        .bind(range.from)
        .bind(range.from)
        .bind(range.until)
        .bind(range.until)
        .fetch_all(executor)
        .await?;

    rows.iter().map(review_from_row).collect()
}

/// Reviews about `subject_id`, newest first.
pub async fn list_reviews_for_subject<'e, E>(
    executor: E,
    subject_id: i64,
    range: CreatedRange,
) -> Result<Vec<ReviewRecord>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {} FROM review_records
        WHERE subject_id = ?
          AND (? IS NULL OR created_at >= ?)
          AND (? IS NULL OR created_at < ?)
        ORDER BY created_at DESC, id DESC
        "#,
        REVIEW_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(subject_id)
        .bind(range.from)
        .bind(range.from)
        .bind(range.until)
        .bind(range.until)
        .fetch_all(executor)
        .await?;

    rows.iter().map(review_from_row).collect()
}

/// `(reviewer_id, subject_id)` pairs with at least one review in the cycle.
pub async fn reviewed_pairs_in_cycle<'e, E>(
    executor: E,
    week_start: i64,
) -> Result<Vec<(i64, i64)>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let pairs: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT DISTINCT reviewer_id, subject_id
        FROM review_records
        WHERE week_start = ?
        ORDER BY reviewer_id, subject_id
        "#,
    )
    .bind(week_start)
    .fetch_all(executor)
    .await?;

    Ok(pairs)
}

/// Subjects `reviewer_id` reviewed at least once in the cycle.
pub async fn reviewed_subjects_in_cycle<'e, E>(
    executor: E,
    reviewer_id: i64,
    week_start: i64,
) -> Result<Vec<i64>, AppError>
where
    E: SqliteExecutor<'e>,
{
    let subjects: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT subject_id
        FROM review_records
        WHERE reviewer_id = ? AND week_start = ?
        ORDER BY subject_id
        "#,
    )
    .bind(reviewer_id)
    .bind(week_start)
    .fetch_all(executor)
    .await?;

    Ok(subjects.into_iter().map(|(id,)| id).collect())
}
