//! Reservation slot scheduler.
//!
//! A pass runs in two phases. [`plan_pass`] is a pure function of the current
//! reservations, the prepared candidates, the download ledger and the clock;
//! it returns the ordered list of deletions and reservations to perform.
//! [`apply_plan`] executes that list against the platform and stops at the
//! first rejection. [`run_pass`] chains listing, preparation, planning and
//! application.
//!
//! The account holds at most [`RESERVATION_CAPACITY`] live reservations. When
//! the quota is full a candidate may take the slot of a later-opening
//! reservation, or of one whose replay was already downloaded; otherwise the
//! pass stops.

mod apply;
mod candidates;
mod error;
mod plan;

pub use apply::{PassReport, PassStop, apply_plan, run_pass};
pub use candidates::prepare_candidates;
pub use error::SchedulerError;
pub use plan::{PassPlan, PlannedAction, RESERVATION_CAPACITY, ReapReason, plan_pass, reap};
