//! Task-board domain module.
//!
//! This crate contains the rules for overdue-task penalties, implemented purely
//! as deterministic domain logic (no IO, no storage, no clocks).

pub mod member;
pub mod outcome;
pub mod task;

pub use member::BoardMember;
pub use outcome::{PenaltyOutcome, RunSummary};
pub use task::{OverdueTask, PenaltyPoints, PenaltyTarget, SkipReason, TaskStatus};
