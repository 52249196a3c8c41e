//! Business logic services.
//!
//! This module contains the mentorship core: cycle arithmetic, scoring,
//! reviewer capacity, authorization, the reassignment workflow and review
//! compliance.
//!
//! Services take a `DbPool` and an `EngineConfig` and know nothing about the
//! transport that calls them.

pub mod assignment_workflow;
pub mod authorization;
pub mod capacity;
pub mod capacity_cache;
pub mod compliance;
pub mod overdue_signals;
pub mod review_cycle;
pub mod review_ledger;
pub mod scoring;

pub use assignment_workflow::{AssignmentWorkflow, ChangeRequest};
pub use authorization::AuthorizationPolicy;
pub use capacity::{CapacityDirectory, CapacitySnapshot, SlotLimit};
pub use capacity_cache::{CapacityCache, DirectoryScope};
pub use compliance::{ComplianceAggregator, ComplianceSnapshot, ComplianceStatus};
pub use review_cycle::ReviewCycleWindow;
pub use review_ledger::ReviewLedger;
pub use scoring::{ScoreSummary, Trend};
