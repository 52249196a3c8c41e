//! Weekly review record model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AppError;

/// Categories scored in every review.
pub const CORE_CATEGORIES: [&str; 5] = [
    "technical_skills",
    "communication",
    "problem_solving",
    "initiative",
    "collaboration",
];

/// Extra category scored only when a learner reviews their reviewer.
pub const MENTORSHIP_QUALITY: &str = "mentorship_quality";

pub const MIN_SCORE: i64 = -2;
pub const MAX_SCORE: i64 = 2;

/// Who reviews whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDirection {
    /// Learner reviews their reviewer.
    Upward,
    /// Reviewer reviews a learner.
    Downward,
}

impl ReviewDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upward => "upward",
            Self::Downward => "downward",
        }
    }

    /// The exact category set a review in this direction must score.
    pub fn categories(&self) -> Vec<&'static str> {
        let mut categories = CORE_CATEGORIES.to_vec();
        if *self == Self::Upward {
            categories.push(MENTORSHIP_QUALITY);
        }
        categories
    }
}

impl TryFrom<&str> for ReviewDirection {
    type Error = AppError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "upward" => Ok(Self::Upward),
            "downward" => Ok(Self::Downward),
            other => Err(AppError::internal(format!(
                "Unknown review direction '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ReviewDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category name to score in [-2, 2].
pub type CategoryScores = BTreeMap<String, i64>;

/// A scored weekly review. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: i64,
    pub reviewer_id: i64,
    pub subject_id: i64,
    pub direction: ReviewDirection,
    pub category_scores: CategoryScores,

    /// Start of the cycle containing `created_at` (Unix).
    pub week_start: i64,

    pub notes: Option<String>,

    /// Creation timestamp (Unix).
    pub created_at: i64,
}

/// Input for submitting a review.
#[derive(Debug, Clone)]
pub struct NewReviewRecord {
    pub reviewer_id: i64,
    pub subject_id: i64,
    pub direction: ReviewDirection,
    pub category_scores: CategoryScores,
    pub notes: Option<String>,

    /// Submission time (Unix). `week_start` is derived from it.
    pub created_at: i64,
}

impl NewReviewRecord {
    /// Check the no-self-review rule, the category set and the score range.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.reviewer_id == self.subject_id {
            return Err(AppError::validation_field(
                "A person cannot review themselves",
                "subject_id",
            ));
        }

        let expected = self.direction.categories();
        let missing: Vec<&str> = expected
            .iter()
            .copied()
            .filter(|c| !self.category_scores.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::validation_field(
                format!("Missing categories: {}", missing.join(", ")),
                "category_scores",
            ));
        }

        if let Some(extra) = self
            .category_scores
            .keys()
            .find(|k| !expected.contains(&k.as_str()))
        {
            return Err(AppError::validation_field(
                format!("Category '{}' is not scored in {} reviews", extra, self.direction),
                "category_scores",
            ));
        }

        if let Some((category, score)) = self
            .category_scores
            .iter()
            .find(|(_, score)| !(MIN_SCORE..=MAX_SCORE).contains(*score))
        {
            return Err(AppError::validation_field(
                format!(
                    "Score {} for '{}' is outside [{}, {}]",
                    score, category, MIN_SCORE, MAX_SCORE
                ),
                "category_scores",
            ));
        }

        Ok(())
    }
}

/// Build a score map from category/score pairs.
pub fn scores<'a>(pairs: impl IntoIterator<Item = (&'a str, i64)>) -> CategoryScores {
    pairs
        .into_iter()
        .map(|(category, score)| (category.to_string(), score))
        .collect()
}

/// Score every category of `direction` with the same value.
pub fn uniform_scores(direction: ReviewDirection, score: i64) -> CategoryScores {
    scores(direction.categories().into_iter().map(|c| (c, score)))
}
