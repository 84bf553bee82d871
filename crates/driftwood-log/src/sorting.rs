//! Total orders over entries.
//!
//! The pure comparators are infallible and compose; [`no_zeroes`] wraps a
//! comparator in the unauthored-collision guard, producing the fallible
//! shape the log carries as its configured sort.

use std::cmp::Ordering;
use std::sync::Arc;

use driftwood_types::LamportClock;

use crate::entry::Entry;
use crate::error::LogError;

/// Fallible comparator carried by a log.
pub type SortFn = Arc<dyn Fn(&Entry, &Entry) -> Result<Ordering, LogError> + Send + Sync>;

/// Compare by Lamport clock, delegating full ties to `tiebreaker`.
pub fn sort_by_clocks(
    a: &Entry,
    b: &Entry,
    tiebreaker: impl Fn(&Entry, &Entry) -> Ordering,
) -> Ordering {
    match LamportClock::compare(&a.clock, &b.clock) {
        Ordering::Equal => tiebreaker(a, b),
        ord => ord,
    }
}

/// Compare by clock id, delegating ties to `tiebreaker`.
pub fn sort_by_clock_id(
    a: &Entry,
    b: &Entry,
    tiebreaker: impl Fn(&Entry, &Entry) -> Ordering,
) -> Ordering {
    match a.clock.id.cmp(&b.clock.id) {
        Ordering::Equal => tiebreaker(a, b),
        ord => ord,
    }
}

/// Terminal tiebreak: lexicographic on content address. Never equal for
/// distinct entries.
pub fn sort_by_entry_hash(a: &Entry, b: &Entry) -> Ordering {
    a.hash.cmp(&b.hash)
}

/// The default order: clock, then content address.
pub fn last_write_wins(a: &Entry, b: &Entry) -> Ordering {
    sort_by_clocks(a, b, sort_by_entry_hash)
}

/// Wrap a comparator in the unauthored-collision guard.
///
/// Two entries with zero clock time and the same clock id were never
/// authored through `append`; ordering them is meaningless and indicates
/// forged or corrupt data, so the comparison fails instead.
pub fn no_zeroes<F>(f: F) -> impl Fn(&Entry, &Entry) -> Result<Ordering, LogError>
where
    F: Fn(&Entry, &Entry) -> Ordering,
{
    move |a, b| {
        if a.clock.time == 0 && b.clock.time == 0 && a.clock.id == b.clock.id {
            return Err(LogError::ZeroTimeCollision {
                id: a.clock.id.clone(),
            });
        }
        Ok(f(a, b))
    }
}

/// Guard an already-fallible sort with the same collision check.
pub fn no_zeroes_sort(inner: SortFn) -> SortFn {
    Arc::new(move |a: &Entry, b: &Entry| {
        if a.clock.time == 0 && b.clock.time == 0 && a.clock.id == b.clock.id {
            return Err(LogError::ZeroTimeCollision {
                id: a.clock.id.clone(),
            });
        }
        inner(a, b)
    })
}

/// The log's default sort: `NoZeroes(LastWriteWins)`.
pub fn default_sort() -> SortFn {
    Arc::new(no_zeroes(last_write_wins))
}

/// Sort entries ascending with a fallible comparator.
///
/// `sort_by` cannot carry a `Result`, so the first error is parked in a
/// cell and surfaced after the sort; the sort itself treats errored
/// comparisons as equal.
pub fn sort_entries(entries: &mut [Entry], sort_fn: &SortFn) -> Result<(), LogError> {
    let mut first_err: Option<LogError> = None;
    entries.sort_by(|a, b| match sort_fn(a, b) {
        Ok(ord) => ord,
        Err(e) => {
            if first_err.is_none() {
                first_err = Some(e);
            }
            Ordering::Equal
        }
    });
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
