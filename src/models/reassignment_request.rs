//! Reassignment request model.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// State of a reassignment request.
///
/// `Pending` is the only state with outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl TryFrom<&str> for RequestState {
    type Error = AppError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(AppError::internal(format!(
                "Unknown request state '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome a decision-maker may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn resulting_state(&self) -> RequestState {
        match self {
            Self::Approve => RequestState::Approved,
            Self::Reject => RequestState::Rejected,
        }
    }
}

/// A learner's request to change their reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignmentRequest {
    pub id: i64,
    pub learner_id: i64,

    /// Reviewer at the time of the request, if any.
    pub current_reviewer_id: Option<i64>,

    pub requested_reviewer_id: i64,
    pub state: RequestState,
    pub reason: Option<String>,
    pub decision_notes: Option<String>,

    /// Creation timestamp (Unix).
    pub created_at: i64,

    /// Set on every terminal state.
    pub decided_at: Option<i64>,

    /// Decision-maker, or the learner for a cancellation.
    pub decided_by: Option<i64>,
}

impl ReassignmentRequest {
    pub fn is_pending(&self) -> bool {
        self.state == RequestState::Pending
    }
}

/// Input for creating a pending request.
#[derive(Debug, Clone)]
pub struct NewReassignmentRequest {
    pub learner_id: i64,
    pub current_reviewer_id: Option<i64>,
    pub requested_reviewer_id: i64,
    pub reason: Option<String>,
    pub created_at: i64,
}
