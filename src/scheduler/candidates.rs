//! Candidate preparation: dedupe, drop already-reserved, order by start.

use std::collections::HashSet;

use crate::platform::{Candidate, Reservation};

/// Turns raw search results into the scheduler's candidate list.
///
/// The first occurrence of a program identifier wins, programs that already
/// have a reservation are dropped, and the rest are stable-sorted by start
/// time ascending with unknown start times last.
#[must_use]
pub fn prepare_candidates(found: Vec<Candidate>, reservations: &[Reservation]) -> Vec<Candidate> {
    let reserved: HashSet<&str> = reservations
        .iter()
        .map(|reservation| reservation.program_id.as_str())
        .collect();
    let mut seen = HashSet::new();

    let mut candidates: Vec<Candidate> = found
        .into_iter()
        .filter(|candidate| !reserved.contains(candidate.program_id.as_str()))
        .filter(|candidate| seen.insert(candidate.program_id.clone()))
        .collect();

    // `Option` orders `None` first, so sort on (missing, time) to push unknowns last.
    candidates.sort_by_key(|candidate| {
        let start = candidate.start_time();
        (start.is_none(), start)
    });
    candidates
}
