//! Data models for the mentorship engine.
//!
//! These models represent the entities stored in the record store and handed
//! to dashboards. Stored JSON columns (capabilities, category scores) are
//! parsed into typed values at the database boundary.

pub mod person;
pub mod reassignment_request;
pub mod review_record;

// Re-exports for convenient access
pub use person::{Capability, CapabilitySet, NewPerson, Person, ProfileUpdate};
pub use reassignment_request::{
    Decision, NewReassignmentRequest, ReassignmentRequest, RequestState,
};
pub use review_record::{
    CategoryScores, NewReviewRecord, ReviewDirection, ReviewRecord, CORE_CATEGORIES,
    MENTORSHIP_QUALITY,
};
