//! Review cycle time arithmetic.
//!
//! A cycle is the seven days starting Monday 00:00 UTC. Reviews for a cycle are
//! due by the end of its Sunday (23:59:59). Everything here is a pure function
//! of time.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::AppError;

/// Length of one review cycle.
pub fn cycle_length() -> Duration {
    Duration::days(7)
}

/// The most recent Monday 00:00 at or before `t`.
pub fn cycle_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let date = t.date_naive();
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    Utc.from_utc_datetime(&monday.and_time(NaiveTime::MIN))
}

/// End of the Sunday closing the cycle that starts at `cycle_start`.
pub fn deadline(cycle_start: DateTime<Utc>) -> DateTime<Utc> {
    cycle_start + cycle_length() - Duration::seconds(1)
}

/// Whole calendar days `now` lies past `deadline`; 0 while not yet past.
pub fn days_overdue(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if now <= deadline {
        return 0;
    }
    (now.date_naive() - deadline.date_naive()).num_days().max(0)
}

/// `cycle_start <= t < cycle_start + 7 days`.
pub fn in_cycle(t: DateTime<Utc>, cycle_start: DateTime<Utc>) -> bool {
    cycle_start <= t && t < cycle_start + cycle_length()
}

/// Convert a stored Unix timestamp.
pub fn from_unix(secs: i64) -> Result<DateTime<Utc>, AppError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| AppError::validation(format!("Timestamp {} is out of range", secs)))
}

/// Cycle start for a stored Unix timestamp, as a Unix timestamp.
pub fn week_start_unix(created_at: i64) -> Result<i64, AppError> {
    Ok(cycle_start(from_unix(created_at)?).timestamp())
}

/// A cycle as observed at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCycleWindow {
    pub cycle_start: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

impl ReviewCycleWindow {
    /// The cycle containing `now`.
    pub fn current(now: DateTime<Utc>) -> Self {
        Self::for_cycle(cycle_start(now), now)
    }

    /// The cycle containing `t`, observed at `now`.
    pub fn for_cycle(t: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let start = cycle_start(t);
        Self {
            cycle_start: start,
            deadline: deadline(start),
            now,
        }
    }

    /// The cycle before this one, observed at the same instant.
    pub fn previous(&self) -> Self {
        Self::for_cycle(self.cycle_start - cycle_length(), self.now)
    }

    pub fn is_past_deadline(&self) -> bool {
        self.now > self.deadline
    }

    pub fn days_overdue(&self) -> i64 {
        days_overdue(self.deadline, self.now)
    }

    pub fn week_start_unix(&self) -> i64 {
        self.cycle_start.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_cycle_start_is_previous_monday_midnight() {
        // 2025-01-06 is a Monday.
        assert_eq!(cycle_start(at("2025-01-06T00:00:00Z")), at("2025-01-06T00:00:00Z"));
        assert_eq!(cycle_start(at("2025-01-07T15:30:00Z")), at("2025-01-06T00:00:00Z"));
        assert_eq!(cycle_start(at("2025-01-12T23:59:59Z")), at("2025-01-06T00:00:00Z"));
        assert_eq!(cycle_start(at("2025-01-13T00:00:00Z")), at("2025-01-13T00:00:00Z"));
    }

    #[test]
    fn test_cycle_start_across_year_boundary() {
        // 2025-01-01 is a Wednesday; its cycle starts on 2024-12-30.
        assert_eq!(cycle_start(at("2025-01-01T08:00:00Z")), at("2024-12-30T00:00:00Z"));
    }

    #[test]
    fn test_deadline_is_sunday_end_of_day() {
        assert_eq!(deadline(at("2025-01-06T00:00:00Z")), at("2025-01-12T23:59:59Z"));
    }

    #[test]
    fn test_days_overdue() {
        let due = at("2025-01-12T23:59:59Z");
        assert_eq!(days_overdue(due, at("2025-01-10T12:00:00Z")), 0);
        assert_eq!(days_overdue(due, due), 0);
        assert_eq!(days_overdue(due, at("2025-01-13T00:00:00Z")), 1);
        assert_eq!(days_overdue(due, at("2025-01-14T00:00:00Z")), 2);
        assert_eq!(days_overdue(due, at("2025-01-20T18:00:00Z")), 8);
    }

    #[test]
    fn test_in_cycle_is_half_open() {
        let start = at("2025-01-06T00:00:00Z");
        assert!(in_cycle(start, start));
        assert!(in_cycle(at("2025-01-12T23:59:59Z"), start));
        assert!(!in_cycle(at("2025-01-13T00:00:00Z"), start));
        assert!(!in_cycle(at("2025-01-05T23:59:59Z"), start));
    }

    #[test]
    fn test_window_navigation() {
        let now = at("2025-01-14T00:00:00Z");
        let current = ReviewCycleWindow::current(now);
        assert_eq!(current.cycle_start, at("2025-01-13T00:00:00Z"));
        assert!(!current.is_past_deadline());

        let previous = current.previous();
        assert_eq!(previous.cycle_start, at("2025-01-06T00:00:00Z"));
        assert_eq!(previous.deadline, at("2025-01-12T23:59:59Z"));
        assert!(previous.is_past_deadline());
        assert_eq!(previous.days_overdue(), 2);
    }

    #[test]
    fn test_week_start_unix() {
        let created = at("2025-01-07T10:00:00Z").timestamp();
        assert_eq!(
            week_start_unix(created).unwrap(),
            at("2025-01-06T00:00:00Z").timestamp()
        );
    }
}
