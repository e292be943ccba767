//! Overdue task penalty enforcement.
//!
//! ## Flow
//!
//! ```text
//! PenaltyScheduler (tick / trigger)
//!   -> EnforcementJob::run
//!        -> OverdueTaskScanner::scan   (one store query)
//!        -> OverdueTask::validate      (skip tasks with missing data)
//!        -> PenaltyApplier::apply      (one atomic batch per task, concurrent)
//!   <- RunSummary
//! ```
//!
//! ## Safety under overlap
//!
//! Runs may overlap. Each batch sets `penaltyApplied` only while it is still
//! `false`, and member balances change through store-side increments, so a
//! penalty lands at most once and concurrent decrements never lose updates.

pub mod applier;
pub mod clock;
pub mod job;
pub mod records;
pub mod scanner;
pub mod scheduler;

pub use applier::PenaltyApplier;
pub use clock::{Clock, FixedClock, SystemClock};
pub use job::{EnforcementError, EnforcementJob, EnforcementJobConfig};
pub use scanner::OverdueTaskScanner;
pub use scheduler::{PenaltyScheduler, SchedulerHandle, SchedulerStats};
