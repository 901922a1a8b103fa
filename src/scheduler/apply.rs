//! Executing a pass plan against the platform.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use super::candidates::prepare_candidates;
use super::error::SchedulerError;
use super::plan::{PassPlan, PlannedAction, plan_pass};
use crate::ledger::Ledger;
use crate::metadata::MetadataStore;
use crate::platform::{Candidate, TimeshiftApi};

/// Why a pass ended before working through every candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassStop {
    /// No slot could be freed for this candidate.
    QuotaExhausted {
        /// First candidate left unreserved.
        program_id: String,
    },
    /// The platform refused a reservation.
    Rejected {
        /// Candidate the platform refused.
        candidate: Candidate,
        /// Platform error code (empty when none was given).
        error_code: String,
    },
}

/// What a pass actually did on the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Reaped program identifiers.
    pub reaped: Vec<String>,
    /// Reservations deleted to make room (displaced or reclaimed).
    pub evicted: Vec<String>,
    /// Candidates reserved, in order.
    pub reserved: Vec<Candidate>,
    /// Early stop, if any.
    pub stop: Option<PassStop>,
}

/// Executes `plan` in order, stopping at the first rejected reservation.
///
/// Each accepted reservation has its candidate snapshot written to `snapshots`
/// before the next action runs.
///
/// # Errors
///
/// Returns [`SchedulerError`] when a platform call fails or a snapshot cannot
/// be written; actions already executed stay executed.
#[instrument(skip_all, fields(actions = plan.actions.len()))]
pub async fn apply_plan(
    plan: PassPlan,
    api: &dyn TimeshiftApi,
    snapshots: &MetadataStore,
) -> Result<PassReport, SchedulerError> {
    let mut report = PassReport::default();

    for action in plan.actions {
        match action {
            PlannedAction::Reap { program_id, reason } => {
                info!(program_id = %program_id, %reason, "Deleting dead reservation");
                api.delete_reservation(&program_id).await?;
                report.reaped.push(program_id);
            }
            PlannedAction::Displace {
                evicted,
                for_program,
            } => {
                info!(evicted = %evicted, for_program = %for_program, "Displacing later reservation");
                api.delete_reservation(&evicted).await?;
                report.evicted.push(evicted);
            }
            PlannedAction::Reclaim {
                evicted,
                for_program,
            } => {
                info!(evicted = %evicted, for_program = %for_program, "Reclaiming downloaded reservation");
                api.delete_reservation(&evicted).await?;
                report.evicted.push(evicted);
            }
            PlannedAction::Reserve(candidate) => {
                info!(
                    program_id = %candidate.program_id,
                    title = %candidate.title,
                    channel = %candidate.provider.username,
                    "Reserving"
                );
                let answer = api.reserve(&candidate.program_id).await?;
                if !answer.accepted {
                    let error_code = answer.error_code.unwrap_or_default();
                    warn!(program_id = %candidate.program_id, error_code = %error_code, "Reservation rejected");
                    report.stop = Some(PassStop::Rejected {
                        candidate,
                        error_code,
                    });
                    return Ok(report);
                }
                info!(
                    program_id = %candidate.program_id,
                    expiry = ?answer.expiry_time,
                    "Reserved"
                );
                snapshots.write(&candidate)?;
                report.reserved.push(candidate);
            }
        }
    }

    if let Some(program_id) = plan.exhausted_at {
        info!(program_id = %program_id, "Reservation quota exhausted");
        report.stop = Some(PassStop::QuotaExhausted { program_id });
    }
    Ok(report)
}

/// Runs a full pass: list reservations, prepare `found`, plan, apply.
///
/// # Errors
///
/// Returns [`SchedulerError`] when listing or any applied action fails.
#[instrument(skip_all, fields(found = found.len()))]
pub async fn run_pass(
    api: &dyn TimeshiftApi,
    found: Vec<Candidate>,
    ledger: &dyn Ledger,
    snapshots: &MetadataStore,
    now: DateTime<Utc>,
) -> Result<PassReport, SchedulerError> {
    let reservations = api.list_reservations().await?;
    info!(
        reserved = reservations.len(),
        capacity = super::RESERVATION_CAPACITY,
        "Current reservations"
    );
    let candidates = prepare_candidates(found, &reservations);
    let plan = plan_pass(&reservations, &candidates, ledger, now);
    info!(
        candidates = candidates.len(),
        freed = plan.freed,
        planned = plan.actions.len(),
        "Pass planned"
    );
    apply_plan(plan, api, snapshots).await
}
