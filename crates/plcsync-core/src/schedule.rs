// ── Daily sync schedule ──

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Times of day at which a target (or the external feed) is synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub enabled: bool,
    /// Sorted, deduplicated, minute precision.
    pub times: Vec<NaiveTime>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new(true, default_times())
    }
}

fn default_times() -> Vec<NaiveTime> {
    [(7, 0), (20, 0)]
        .into_iter()
        .filter_map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
        .collect()
}

impl Schedule {
    pub fn new(enabled: bool, times: Vec<NaiveTime>) -> Self {
        let mut times: Vec<NaiveTime> = times
            .into_iter()
            .filter_map(|t| t.with_second(0).and_then(|t| t.with_nanosecond(0)))
            .collect();
        times.sort_unstable();
        times.dedup();
        Self { enabled, times }
    }

    pub fn disabled() -> Self {
        Self::new(false, Vec::new())
    }

    /// Parse a comma-separated `HH:MM` list such as `"07:00,20:00"`.
    pub fn parse_times(raw: &str) -> Result<Vec<NaiveTime>, CoreError> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| CoreError::Config {
                    message: format!("invalid schedule time {s:?}: {e}"),
                })
            })
            .collect()
    }

    /// The slot due at `now`: the latest configured time today that is not
    /// in the future and is less than `grace` old.
    pub fn due_slot(&self, now: NaiveDateTime, grace: TimeDelta) -> Option<NaiveDateTime> {
        if !self.enabled {
            return None;
        }
        self.times
            .iter()
            .rev()
            .map(|t| now.date().and_time(*t))
            .find(|slot| *slot <= now)
            .filter(|slot| now - *slot < grace)
    }

    /// The first slot strictly after `now`, looking into tomorrow if needed.
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if !self.enabled {
            return None;
        }
        let today = now.date();
        self.times
            .iter()
            .map(|t| today.and_time(*t))
            .find(|slot| *slot > now)
            .or_else(|| {
                let tomorrow = today.succ_opt()?;
                self.times.first().map(|t| tomorrow.and_time(*t))
            })
    }

    pub fn display_times(&self) -> String {
        self.times
            .iter()
            .map(|t| t.format("%H:%M").to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, 4)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn parses_and_normalizes_times() {
        let times = Schedule::parse_times(" 20:00, 07:00,,07:00 ").unwrap();
        let schedule = Schedule::new(true, times);
        assert_eq!(schedule.display_times(), "07:00,20:00");
        assert!(Schedule::parse_times("7h").is_err());
    }

    #[test]
    fn due_slot_within_grace_only() {
        let schedule = Schedule::default();
        let grace = TimeDelta::seconds(120);

        assert_eq!(schedule.due_slot(at(6, 59, 59), grace), None);
        assert_eq!(schedule.due_slot(at(7, 0, 0), grace), Some(at(7, 0, 0)));
        assert_eq!(schedule.due_slot(at(7, 1, 30), grace), Some(at(7, 0, 0)));
        assert_eq!(schedule.due_slot(at(7, 2, 0), grace), None);
        assert_eq!(schedule.due_slot(at(20, 0, 10), grace), Some(at(20, 0, 0)));
    }

    #[test]
    fn disabled_schedule_never_fires() {
        let schedule = Schedule::new(false, Schedule::parse_times("07:00").unwrap());
        assert_eq!(schedule.due_slot(at(7, 0, 0), TimeDelta::seconds(60)), None);
        assert_eq!(schedule.next_after(at(6, 0, 0)), None);
    }

    #[test]
    fn next_after_rolls_over_midnight() {
        let schedule = Schedule::default();
        assert_eq!(schedule.next_after(at(7, 0, 0)), Some(at(20, 0, 0)));
        assert_eq!(
            schedule.next_after(at(21, 0, 0)),
            Some(at(7, 0, 0) + TimeDelta::days(1))
        );
    }
}
