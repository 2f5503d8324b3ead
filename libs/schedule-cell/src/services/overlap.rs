// libs/schedule-cell/src/services/overlap.rs
//
// Pure interval algebra behind schedule-block conflict checking. No side
// effects, total for well-formed input.

use chrono::{DateTime, Utc};

pub type Interval = (DateTime<Utc>, DateTime<Utc>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalConflict {
    /// Candidate is byte-for-byte the same interval as an existing one.
    /// Surfaced separately so callers can give an actionable message.
    Duplicate,
    /// Candidate partially or fully overlaps an existing interval.
    Overlap,
}

/// Two half-open intervals [s1,e1) and [s2,e2) conflict iff s1 < e2 && s2 < e1.
pub fn intervals_overlap(
    s1: DateTime<Utc>,
    e1: DateTime<Utc>,
    s2: DateTime<Utc>,
    e2: DateTime<Utc>,
) -> bool {
    s1 < e2 && s2 < e1
}

/// Test a candidate interval against every existing interval for the same
/// (doctor, clinic). Exact duplicates are reported before plain overlaps.
pub fn check_interval(existing: &[Interval], candidate: Interval) -> Result<(), IntervalConflict> {
    let (cs, ce) = candidate;
    for &(s, e) in existing {
        if s == cs && e == ce {
            return Err(IntervalConflict::Duplicate);
        }
        if intervals_overlap(s, e, cs, ce) {
            return Err(IntervalConflict::Overlap);
        }
    }
    Ok(())
}

/// Half-open intervals must have positive length.
pub fn is_well_formed(start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    start < end
}
