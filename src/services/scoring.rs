//! Review scoring: aggregate scores, windowed averages, trends and streaks.
//!
//! Scores are kept unrounded; display layers round as they see fit.

use serde::Serialize;

use crate::config::DEFAULT_TREND_THRESHOLD;
use crate::models::{CategoryScores, ReviewRecord};

const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_CYCLE: i64 = 7 * SECONDS_PER_DAY;

/// Direction of change between a subject's two latest reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    /// Fewer than two reviews.
    Undefined,
}

/// Mean of the category scores. An empty map scores 0.
pub fn mean_score(scores: &CategoryScores) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: i64 = scores.values().sum();
    total as f64 / scores.len() as f64
}

/// Mean of a review's category scores, in [-2, 2].
pub fn aggregate_score(record: &ReviewRecord) -> f64 {
    mean_score(&record.category_scores)
}

/// Mean aggregate score of the records created in the last `window_days`.
///
/// `None` when no record falls inside the window. Windows reaching past the
/// representable range cover every record.
pub fn window_average(records: &[ReviewRecord], now: i64, window_days: i64) -> Option<f64> {
    let cutoff = now.saturating_sub(window_days.saturating_mul(SECONDS_PER_DAY));
    let in_window: Vec<f64> = records
        .iter()
        .filter(|r| r.created_at >= cutoff)
        .map(aggregate_score)
        .collect();

    if in_window.is_empty() {
        return None;
    }
    Some(in_window.iter().sum::<f64>() / in_window.len() as f64)
}

/// Classify the change from `previous` to `latest`.
pub fn classify_delta(latest: f64, previous: f64, threshold: f64) -> Trend {
    let delta = latest - previous;
    if delta > threshold {
        Trend::Improving
    } else if delta < -threshold {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Trend between the two most recent records (newest first).
pub fn trend(records_desc_by_date: &[ReviewRecord]) -> Trend {
    trend_with_threshold(records_desc_by_date, DEFAULT_TREND_THRESHOLD)
}

/// [`trend`] with an explicit threshold.
pub fn trend_with_threshold(records_desc_by_date: &[ReviewRecord], threshold: f64) -> Trend {
    match records_desc_by_date {
        [latest, previous, ..] => {
            classify_delta(aggregate_score(latest), aggregate_score(previous), threshold)
        }
        _ => Trend::Undefined,
    }
}

/// Consecutive records, newest first, whose cycles are at most 7 days apart.
pub fn streak(records_desc_by_week_start: &[ReviewRecord]) -> usize {
    if records_desc_by_week_start.is_empty() {
        return 0;
    }

    1 + records_desc_by_week_start
        .windows(2)
        .take_while(|pair| pair[0].week_start.saturating_sub(pair[1].week_start) <= SECONDS_PER_CYCLE)
        .count()
}

/// Dashboard statistics for one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub review_count: usize,
    pub latest_score: Option<f64>,
    pub window_average: Option<f64>,
    pub trend: Trend,
    pub streak: usize,
}

/// Summarise records in any order.
pub fn summarize(
    records: &[ReviewRecord],
    now: i64,
    window_days: i64,
    threshold: f64,
) -> ScoreSummary {
    let mut by_date = records.to_vec();
    by_date.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    let mut by_week = records.to_vec();
    by_week.sort_by(|a, b| b.week_start.cmp(&a.week_start).then(b.id.cmp(&a.id)));

    ScoreSummary {
        review_count: records.len(),
        latest_score: by_date.first().map(aggregate_score),
        window_average: window_average(records, now, window_days),
        trend: trend_with_threshold(&by_date, threshold),
        streak: streak(&by_week),
    }
}
