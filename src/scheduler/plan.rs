//! Pure planning phase of a scheduler pass.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::ledger::Ledger;
use crate::platform::{Candidate, ReplayStatus, Reservation};

/// Maximum number of live reservations the platform allows per account.
pub const RESERVATION_CAPACITY: usize = 10;

/// Why a reservation is deleted unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapReason {
    /// Ticket expiry lies in the past.
    Expired,
    /// Replay window closed.
    Closed,
}

impl fmt::Display for ReapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Expired => "expired",
            Self::Closed => "closed",
        })
    }
}

/// One step of a pass, executed in order by [`super::apply_plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Delete a dead reservation.
    Reap {
        /// Reservation to delete.
        program_id: String,
        /// Why it is dead.
        reason: ReapReason,
    },
    /// Delete a reservation that opens later than the incoming candidate.
    Displace {
        /// Reservation to delete.
        evicted: String,
        /// Candidate taking the slot.
        for_program: String,
    },
    /// Delete a reservation whose replay is already in the ledger.
    Reclaim {
        /// Reservation to delete.
        evicted: String,
        /// Candidate taking the slot.
        for_program: String,
    },
    /// Reserve a candidate.
    Reserve(Candidate),
}

/// Ordered actions of one pass plus the quota-exhaustion stop, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassPlan {
    /// Actions in execution order.
    pub actions: Vec<PlannedAction>,
    /// Candidate for which no slot could be freed; later candidates were not considered.
    pub exhausted_at: Option<String>,
    /// Number of reservations reaped.
    pub freed: usize,
}

impl PassPlan {
    /// Candidates the plan reserves, in order.
    pub fn reservations(&self) -> impl Iterator<Item = &Candidate> {
        self.actions.iter().filter_map(|action| match action {
            PlannedAction::Reserve(candidate) => Some(candidate),
            _ => None,
        })
    }

    /// Program identifiers the plan deletes, in order.
    pub fn deletions(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().filter_map(|action| match action {
            PlannedAction::Reap { program_id, .. } => Some(program_id.as_str()),
            PlannedAction::Displace { evicted, .. } | PlannedAction::Reclaim { evicted, .. } => {
                Some(evicted.as_str())
            }
            PlannedAction::Reserve(_) => None,
        })
    }
}

/// Splits reservations into live ones and reap actions for the dead ones.
///
/// Applying it again to the returned live set yields no further actions.
#[must_use]
pub fn reap(reservations: &[Reservation], now: DateTime<Utc>) -> (Vec<Reservation>, Vec<PlannedAction>) {
    let mut live = Vec::with_capacity(reservations.len());
    let mut actions = Vec::new();
    for reservation in reservations {
        if !reservation.is_reapable(now) {
            live.push(reservation.clone());
            continue;
        }
        let reason = if reservation.is_expired(now) {
            ReapReason::Expired
        } else {
            ReapReason::Closed
        };
        actions.push(PlannedAction::Reap {
            program_id: reservation.program_id.clone(),
            reason,
        });
    }
    (live, actions)
}

/// Plans one pass.
///
/// `candidates` is expected in scheduling order (see
/// [`super::prepare_candidates`]); candidates that already hold a reservation
/// or repeat an earlier identifier are skipped here as well.
#[must_use]
pub fn plan_pass(
    reservations: &[Reservation],
    candidates: &[Candidate],
    ledger: &dyn Ledger,
    now: DateTime<Utc>,
) -> PassPlan {
    let (mut live, mut actions) = reap(reservations, now);
    let freed = actions.len();
    let mut capacity = RESERVATION_CAPACITY.saturating_sub(live.len());
    let mut taken: HashSet<&str> = reservations
        .iter()
        .map(|reservation| reservation.program_id.as_str())
        .collect();
    let mut exhausted_at = None;

    for candidate in candidates {
        if !taken.insert(candidate.program_id.as_str()) {
            continue;
        }

        if capacity == 0 {
            let opens_later = candidate.start_time().and_then(|start| {
                live.iter().position(|reservation| {
                    reservation.status == ReplayStatus::BeforeOpen && reservation.open_time > start
                })
            });
            if let Some(index) = opens_later {
                let evicted = live.remove(index);
                actions.push(PlannedAction::Displace {
                    evicted: evicted.program_id,
                    for_program: candidate.program_id.clone(),
                });
            } else if let Some(index) = live
                .iter()
                .position(|reservation| ledger.contains(&reservation.program_id))
            {
                let evicted = live.remove(index);
                actions.push(PlannedAction::Reclaim {
                    evicted: evicted.program_id,
                    for_program: candidate.program_id.clone(),
                });
            } else {
                exhausted_at = Some(candidate.program_id.clone());
                break;
            }
            capacity += 1;
        }

        actions.push(PlannedAction::Reserve(candidate.clone()));
        capacity -= 1;
    }

    PassPlan {
        actions,
        exhausted_at,
        freed,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::platform::{ProgramKind, ProgramTime, Provider, Statistics};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn reservation(id: &str, status: ReplayStatus, opens_in_hours: i64) -> Reservation {
        Reservation {
            program_id: id.to_string(),
            title: id.to_string(),
            open_time: now() + Duration::hours(opens_in_hours),
            status,
            ticket_expiry: None,
        }
    }

    fn before_open(id: &str, opens_in_hours: i64) -> Reservation {
        reservation(id, ReplayStatus::BeforeOpen, opens_in_hours)
    }

    fn candidate(id: &str, starts_in_hours: Option<i64>) -> Candidate {
        Candidate {
            program_id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            kind: ProgramKind::Future,
            thumbnail_url: String::new(),
            time: starts_in_hours.map(|hours| ProgramTime {
                started_at: Some(now() + Duration::hours(hours)),
                minutes: 0,
            }),
            statistics: Statistics::default(),
            provider: Provider::default(),
        }
    }

    fn full_book(opens_in_hours: i64) -> Vec<Reservation> {
        (0..RESERVATION_CAPACITY)
            .map(|i| before_open(&format!("lv{i}"), opens_in_hours))
            .collect()
    }

    fn reserved_ids(plan: &PassPlan) -> Vec<&str> {
        plan.reservations().map(|c| c.program_id.as_str()).collect()
    }

    #[test]
    fn test_reap_expired_and_closed() {
        let mut expired = reservation("lvE", ReplayStatus::Opened, -48);
        expired.ticket_expiry = Some(now() - Duration::seconds(1));
        let closed = reservation("lvC", ReplayStatus::Closed, -48);
        let alive = reservation("lvA", ReplayStatus::Opened, -1);

        let (live, actions) = reap(&[expired, closed, alive], now());
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].program_id, "lvA");
        assert_eq!(
            actions,
            vec![
                PlannedAction::Reap {
                    program_id: "lvE".to_string(),
                    reason: ReapReason::Expired
                },
                PlannedAction::Reap {
                    program_id: "lvC".to_string(),
                    reason: ReapReason::Closed
                },
            ]
        );
    }

    #[test]
    fn test_reap_is_idempotent() {
        let mut expired = reservation("lvE", ReplayStatus::Opened, -48);
        expired.ticket_expiry = Some(now() - Duration::hours(1));
        let reservations = vec![
            expired,
            reservation("lvC", ReplayStatus::Closed, -2),
            before_open("lvB", 5),
        ];
        let (live, first) = reap(&reservations, now());
        assert_eq!(first.len(), 2);
        let (live_again, second) = reap(&live, now());
        assert!(second.is_empty());
        assert_eq!(live, live_again);
    }

    #[test]
    fn test_reserves_up_to_capacity_then_exhausts() {
        let reservations: Vec<_> = (0..8).map(|i| before_open(&format!("lv{i}"), 1)).collect();
        let candidates: Vec<_> = (0..4)
            .map(|i| candidate(&format!("lvN{i}"), Some(10)))
            .collect();
        let plan = plan_pass(&reservations, &candidates, &InMemoryLedger::default(), now());

        assert_eq!(reserved_ids(&plan), ["lvN0", "lvN1"]);
        assert_eq!(plan.exhausted_at.as_deref(), Some("lvN2"));
        assert_eq!(plan.deletions().count(), 0);
    }

    #[test]
    fn test_live_count_never_exceeds_capacity() {
        let mut expired = before_open("lvOld", -100);
        expired.ticket_expiry = Some(now() - Duration::hours(1));
        let mut reservations = full_book(1);
        reservations[3] = expired;
        let candidates: Vec<_> = (0..15)
            .map(|i| candidate(&format!("lvN{i}"), Some(-5 + i)))
            .collect();
        let ledger = InMemoryLedger::from_ids(["lv5"]);

        let plan = plan_pass(&reservations, &candidates, &ledger, now());
        let live_after = reservations.len() - plan.deletions().count() + plan.reservations().count();
        assert!(live_after <= RESERVATION_CAPACITY, "live after pass: {live_after}");
        assert_eq!(plan.freed, 1);
    }

    #[test]
    fn test_displaces_first_later_opening_reservation() {
        let mut reservations = full_book(1);
        reservations[2] = before_open("lvLate", 24);
        reservations[6] = before_open("lvLater", 48);

        let plan = plan_pass(
            &reservations,
            &[candidate("lvNew", Some(5))],
            &InMemoryLedger::default(),
            now(),
        );
        assert_eq!(
            plan.actions,
            vec![
                PlannedAction::Displace {
                    evicted: "lvLate".to_string(),
                    for_program: "lvNew".to_string()
                },
                PlannedAction::Reserve(candidate("lvNew", Some(5))),
            ]
        );
        assert!(plan.exhausted_at.is_none());
    }

    #[test]
    fn test_displacement_ignores_opened_reservations() {
        let mut reservations = full_book(1);
        reservations[0] = reservation("lvOpen", ReplayStatus::Opened, 48);

        let plan = plan_pass(
            &reservations,
            &[candidate("lvNew", Some(5))],
            &InMemoryLedger::default(),
            now(),
        );
        assert!(plan.reservations().next().is_none());
        assert_eq!(plan.exhausted_at.as_deref(), Some("lvNew"));
    }

    #[test]
    fn test_equal_open_time_does_not_displace() {
        let reservations = full_book(5);
        let plan = plan_pass(
            &reservations,
            &[candidate("lvNew", Some(5))],
            &InMemoryLedger::default(),
            now(),
        );
        assert_eq!(plan.exhausted_at.as_deref(), Some("lvNew"));
    }

    #[test]
    fn test_candidate_without_start_reclaims_downloaded() {
        let mut reservations = full_book(48);
        reservations[7] = reservation("lvDone", ReplayStatus::Opened, -24);
        let ledger = InMemoryLedger::from_ids(["lvDone"]);

        let plan = plan_pass(&reservations, &[candidate("lvNew", None)], &ledger, now());
        assert_eq!(
            plan.actions[0],
            PlannedAction::Reclaim {
                evicted: "lvDone".to_string(),
                for_program: "lvNew".to_string()
            }
        );
        assert_eq!(reserved_ids(&plan), ["lvNew"]);
    }

    #[test]
    fn test_exhaustion_stops_remaining_candidates() {
        let reservations = full_book(1);
        let ledger = InMemoryLedger::from_ids(["lv0"]);
        let candidates = vec![
            candidate("lvA", Some(10)),
            candidate("lvB", Some(11)),
            candidate("lvC", Some(0)),
        ];
        let plan = plan_pass(&reservations, &candidates, &ledger, now());

        assert_eq!(reserved_ids(&plan), ["lvA"]);
        assert_eq!(plan.exhausted_at.as_deref(), Some("lvB"));
    }

    #[test]
    fn test_skips_already_reserved_and_duplicate_candidates() {
        let reservations = vec![before_open("lv1", 1)];
        let candidates = vec![
            candidate("lv1", Some(2)),
            candidate("lv2", Some(3)),
            candidate("lv2", Some(3)),
        ];
        let plan = plan_pass(&reservations, &candidates, &InMemoryLedger::default(), now());
        assert_eq!(reserved_ids(&plan), ["lv2"]);
    }

    #[test]
    fn test_unknown_status_is_live_but_not_displaceable() {
        let mut reservations = full_book(1);
        reservations[0] = reservation("lvUnknown", ReplayStatus::Unknown, 48);
        let plan = plan_pass(
            &reservations,
            &[candidate("lvNew", Some(5))],
            &InMemoryLedger::default(),
            now(),
        );
        assert_eq!(plan.freed, 0);
        assert_eq!(plan.exhausted_at.as_deref(), Some("lvNew"));
    }
}
