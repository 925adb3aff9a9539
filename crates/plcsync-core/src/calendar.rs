// ── Calendar boundary ──
//
// The engine never owns calendar data. It asks a `CalendarSource` for a
// snapshot scoped to one target at the start of each pass.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::CoreError;
use crate::model::{CalendarEntry, EntryKind};

/// Which entries a target cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryScope {
    pub kinds: Vec<EntryKind>,
    /// Event locations routed to the target. Holidays ignore this.
    pub locations: Vec<String>,
}

impl EntryScope {
    pub fn matches(&self, entry: &CalendarEntry) -> bool {
        if !self.kinds.contains(&entry.kind) {
            return false;
        }
        match entry.kind {
            EntryKind::Holiday => true,
            EntryKind::Event => entry
                .location
                .as_deref()
                .is_some_and(|loc| self.locations.iter().any(|l| l == loc)),
        }
    }
}

/// Read access to the calendar store.
pub trait CalendarSource: Send + Sync {
    fn list_entries(&self, scope: &EntryScope) -> Result<Vec<CalendarEntry>, CoreError>;
}

// ── JSON snapshot file ───────────────────────────────────────────────

/// A calendar exported as a JSON array of entries, re-read on every call.
#[derive(Debug, Clone)]
pub struct JsonCalendar {
    path: PathBuf,
}

impl JsonCalendar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry in the file, unfiltered.
    pub fn load_all(&self) -> Result<Vec<CalendarEntry>, CoreError> {
        let calendar_error = |e: &dyn std::fmt::Display| CoreError::Calendar {
            message: format!("{}: {e}", self.path.display()),
        };
        let raw = std::fs::read_to_string(&self.path).map_err(|e| calendar_error(&e))?;
        serde_json::from_str(&raw).map_err(|e| calendar_error(&e))
    }
}

impl CalendarSource for JsonCalendar {
    fn list_entries(&self, scope: &EntryScope) -> Result<Vec<CalendarEntry>, CoreError> {
        let entries = self.load_all()?;
        Ok(entries.into_iter().filter(|e| scope.matches(e)).collect())
    }
}

/// Entries that differ between two snapshots: added, removed, and both
/// versions of every changed entry, so routing sees old and new locations.
pub fn changed_entries(before: &[CalendarEntry], after: &[CalendarEntry]) -> Vec<CalendarEntry> {
    let old: HashMap<&str, &CalendarEntry> = before.iter().map(|e| (e.id.as_str(), e)).collect();
    let new: HashMap<&str, &CalendarEntry> = after.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut changed = Vec::new();
    for entry in after {
        match old.get(entry.id.as_str()) {
            Some(prev) if *prev == entry => {}
            Some(prev) => {
                changed.push((*prev).clone());
                changed.push(entry.clone());
            }
            None => changed.push(entry.clone()),
        }
    }
    changed.extend(
        before
            .iter()
            .filter(|e| !new.contains_key(e.id.as_str()))
            .cloned(),
    );
    changed
}

// ── In-memory calendar ───────────────────────────────────────────────

/// Calendar held in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryCalendar {
    entries: ArcSwap<Vec<CalendarEntry>>,
}

impl MemoryCalendar {
    pub fn new(entries: Vec<CalendarEntry>) -> Self {
        Self {
            entries: ArcSwap::from_pointee(entries),
        }
    }

    pub fn replace(&self, entries: Vec<CalendarEntry>) {
        self.entries.store(Arc::new(entries));
    }

    /// Insert or replace the entry with the same id.
    pub fn upsert(&self, entry: CalendarEntry) {
        self.entries.rcu(|current| {
            let mut next: Vec<CalendarEntry> =
                current.iter().filter(|e| e.id != entry.id).cloned().collect();
            next.push(entry.clone());
            next
        });
    }

    pub fn remove(&self, id: &str) {
        self.entries.rcu(|current| {
            current
                .iter()
                .filter(|e| e.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
    }
}

impl CalendarSource for MemoryCalendar {
    fn list_entries(&self, scope: &EntryScope) -> Result<Vec<CalendarEntry>, CoreError> {
        Ok(self
            .entries
            .load()
            .iter()
            .filter(|e| scope.matches(e))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::TimeRange;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
    }

    fn auditorium_scope() -> EntryScope {
        EntryScope {
            kinds: vec![EntryKind::Event],
            locations: vec!["Auditório Nobre".into(), "Foyer do Auditório".into()],
        }
    }

    #[test]
    fn scope_routes_events_by_location() {
        let scope = auditorium_scope();
        let foyer = CalendarEntry::event("a", date(), TimeRange::all_day(), "Coquetel", "Foyer do Auditório");
        let plenary = CalendarEntry::event("b", date(), TimeRange::all_day(), "Sessão", "Plenário");
        let holiday = CalendarEntry::holiday("c", date(), "Dia do Trabalho");

        assert!(scope.matches(&foyer));
        assert!(!scope.matches(&plenary));
        assert!(!scope.matches(&holiday));
    }

    #[test]
    fn memory_calendar_upsert_replaces_by_id() {
        let calendar = MemoryCalendar::default();
        calendar.upsert(CalendarEntry::holiday("h1", date(), "Feriado"));
        calendar.upsert(CalendarEntry::holiday("h1", date(), "Feriado nacional"));

        let scope = EntryScope {
            kinds: vec![EntryKind::Holiday],
            locations: Vec::new(),
        };
        let entries = calendar.list_entries(&scope).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "Feriado nacional");

        calendar.remove("h1");
        assert!(calendar.list_entries(&scope).unwrap().is_empty());
    }

    #[test]
    fn changed_entries_carries_both_versions_of_a_move() {
        let kept = CalendarEntry::holiday("h1", date(), "Feriado");
        let moved = CalendarEntry::event("e1", date(), TimeRange::all_day(), "Sessão", "Plenário");
        let gone = CalendarEntry::holiday("h2", date(), "Ponto facultativo");
        let before = vec![kept.clone(), moved.clone(), gone.clone()];

        let mut relocated = moved.clone();
        relocated.location = Some("Auditório Nobre".into());
        let added = CalendarEntry::holiday("h3", date(), "Recesso");
        let after = vec![kept, relocated.clone(), added.clone()];

        let changed = changed_entries(&before, &after);
        assert_eq!(changed, vec![moved, relocated, added, gone]);
    }

    #[test]
    fn json_calendar_reports_missing_file() {
        let calendar = JsonCalendar::new("/nonexistent/calendar.json");
        let err = calendar.list_entries(&EntryScope::default()).unwrap_err();
        assert!(matches!(err, CoreError::Calendar { .. }));
    }
}
