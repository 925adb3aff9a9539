// ── Slot allocation ──
//
// Pure mapping from a calendar snapshot to the fixed slots of one register
// bank. The window is the last seven days plus everything after today;
// the order is past then future, each ascending.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::model::{CalendarEntry, OverflowPolicy};

/// How far back an entry still counts as recent history.
pub const PAST_WINDOW_DAYS: i64 = 7;

/// Where an allocated entry sits relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Past,
    Future,
}

/// One entry placed in one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub slot: usize,
    pub category: Category,
    pub entry: CalendarEntry,
}

/// Result of [`allocate`]: slots `0..assignments.len()` in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub capacity: usize,
    pub assignments: Vec<SlotAssignment>,
    /// In-window entries that did not fit.
    pub dropped: Vec<CalendarEntry>,
}

impl Allocation {
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn count(&self, category: Category) -> usize {
        self.assignments
            .iter()
            .filter(|a| a.category == category)
            .count()
    }
}

/// Allocate with the default [`OverflowPolicy::KeepHistory`].
pub fn allocate(entries: &[CalendarEntry], now: NaiveDateTime, capacity: usize) -> Allocation {
    allocate_with(entries, now, capacity, OverflowPolicy::default())
}

/// Assign entries to slots.
///
/// Cancelled entries and entries outside the window are ignored. Input order
/// never matters: both partitions are re-sorted by date, start time, label
/// and id before assignment.
pub fn allocate_with(
    entries: &[CalendarEntry],
    now: NaiveDateTime,
    capacity: usize,
    policy: OverflowPolicy,
) -> Allocation {
    let today = now.date();
    let window_start = today
        .checked_sub_signed(TimeDelta::days(PAST_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MIN);

    let mut past = Vec::new();
    let mut future = Vec::new();
    for entry in entries.iter().filter(|e| !e.cancelled) {
        if entry.date > today {
            future.push(entry);
        } else if entry.date >= window_start {
            past.push(entry);
        }
    }
    past.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    future.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let (keep_past, keep_future) = match policy {
        OverflowPolicy::KeepHistory => {
            let keep_past = past.len().min(capacity);
            (keep_past, future.len().min(capacity - keep_past))
        }
        OverflowPolicy::PreferFuture => {
            let keep_future = future.len().min(capacity);
            (past.len().min(capacity - keep_future), keep_future)
        }
    };

    // Past entries lose the oldest first; future entries lose the latest.
    let past_cut = past.len() - keep_past;
    let mut dropped: Vec<CalendarEntry> = past[..past_cut].iter().map(|e| (*e).clone()).collect();
    dropped.extend(future[keep_future..].iter().map(|e| (*e).clone()));

    let assignments = past[past_cut..]
        .iter()
        .map(|e| (Category::Past, *e))
        .chain(future[..keep_future].iter().map(|e| (Category::Future, *e)))
        .enumerate()
        .map(|(slot, (category, entry))| SlotAssignment {
            slot,
            category,
            entry: entry.clone(),
        })
        .collect();

    Allocation {
        capacity,
        assignments,
        dropped,
    }
}

fn sort_key(entry: &CalendarEntry) -> impl Ord + '_ {
    (
        entry.date,
        entry.start(),
        entry.label.as_str(),
        entry.id.as_str(),
    )
}
