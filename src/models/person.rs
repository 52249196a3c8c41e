//! Person model and the canonical capability set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::AppError;

/// A single role tag. A person may hold several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Learner,
    Reviewer,
    SuperReviewer,
    AcademicAssociate,
    Administrator,
}

impl TryFrom<&str> for Capability {
    type Error = AppError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "learner" => Ok(Self::Learner),
            "reviewer" => Ok(Self::Reviewer),
            "super_reviewer" => Ok(Self::SuperReviewer),
            "academic_associate" => Ok(Self::AcademicAssociate),
            "administrator" => Ok(Self::Administrator),
            other => Err(AppError::validation_field(
                format!("Unknown capability '{}'", other),
                "capabilities",
            )),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Learner => write!(f, "learner"),
            Self::Reviewer => write!(f, "reviewer"),
            Self::SuperReviewer => write!(f, "super_reviewer"),
            Self::AcademicAssociate => write!(f, "academic_associate"),
            Self::Administrator => write!(f, "administrator"),
        }
    }
}

/// The one source of truth for what a person may do.
///
/// Stored as a JSON array of tags, e.g. `["learner","reviewer"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the stored JSON column.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let tags: Vec<String> = serde_json::from_str(raw)?;
        tags.iter()
            .map(|tag| Capability::try_from(tag.as_str()))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    /// Serialize for the stored JSON column.
    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A learner, reviewer or staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: i64,

    /// Display name, used for sorting dashboards.
    pub name: String,

    pub capabilities: CapabilitySet,

    /// Required for academic associate scoping.
    pub campus: Option<String>,

    /// Current reviewer.
    pub mentor_link: Option<i64>,

    /// Reviewer requested in a pending reassignment.
    pub pending_mentor_link: Option<i64>,

    /// Overrides the default capacity. Ignored for super reviewers.
    pub capacity_override: Option<i64>,

    /// Creation timestamp (Unix).
    pub created_at: i64,
}

impl Person {
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn is_administrator(&self) -> bool {
        self.has(Capability::Administrator)
    }

    pub fn is_super_reviewer(&self) -> bool {
        self.has(Capability::SuperReviewer)
    }

    pub fn is_academic_associate(&self) -> bool {
        self.has(Capability::AcademicAssociate)
    }

    /// Reviewer or super reviewer.
    pub fn is_reviewer(&self) -> bool {
        self.has(Capability::Reviewer) || self.has(Capability::SuperReviewer)
    }

    /// Most reviewees this person may hold; `None` when unbounded.
    pub fn capacity_limit(&self, default_capacity: i64) -> Option<i64> {
        if self.is_super_reviewer() {
            None
        } else {
            Some(self.capacity_override.unwrap_or(default_capacity))
        }
    }

    /// Both people are on the same, known campus.
    pub fn shares_campus_with(&self, other: &Person) -> bool {
        matches!((&self.campus, &other.campus), (Some(a), Some(b)) if a == b)
    }
}

/// Input for creating a person.
#[derive(Debug, Clone, Default)]
pub struct NewPerson {
    pub name: String,
    pub capabilities: CapabilitySet,
    pub campus: Option<String>,
    pub mentor_link: Option<i64>,
    pub capacity_override: Option<i64>,
}

impl NewPerson {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities = self.capabilities.with(capability);
        self
    }

    pub fn on_campus(mut self, campus: impl Into<String>) -> Self {
        self.campus = Some(campus.into());
        self
    }

    pub fn mentored_by(mut self, reviewer_id: i64) -> Self {
        self.mentor_link = Some(reviewer_id);
        self
    }

    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity_override = Some(capacity);
        self
    }
}

/// Profile edit. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub capabilities: Option<CapabilitySet>,
    pub campus: Option<Option<String>>,
    pub capacity_override: Option<Option<i64>>,
}
