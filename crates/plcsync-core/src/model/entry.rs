use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Labels are truncated to this many characters in backups and logs,
/// matching what the operator panels can show.
pub const DEVICE_LABEL_LEN: usize = 30;

/// What a calendar entry represents on the controller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntryKind {
    /// Whole-day closure: building systems stay off.
    Holiday,
    /// Scheduled use of a room within a time window.
    Event,
}

/// Start and end time-of-day of an event, serialized as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// The whole day, used for events stored without times.
    pub fn all_day() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// A snapshot of one holiday or event, as read from the calendar store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub id: String,
    pub kind: EntryKind,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeRange>,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Cancelled or closed early. Never written to a controller.
    #[serde(default)]
    pub cancelled: bool,
}

impl CalendarEntry {
    pub fn holiday(id: impl Into<String>, date: NaiveDate, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: EntryKind::Holiday,
            date,
            time: None,
            label: label.into(),
            location: None,
            cancelled: false,
        }
    }

    pub fn event(
        id: impl Into<String>,
        date: NaiveDate,
        time: TimeRange,
        label: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: EntryKind::Event,
            date,
            time: Some(time),
            label: label.into(),
            location: Some(location.into()),
            cancelled: false,
        }
    }

    /// Start time used for ordering; holidays sort as midnight.
    pub fn start(&self) -> NaiveTime {
        self.time.map_or(NaiveTime::MIN, |t| t.start)
    }

    /// Label cut to [`DEVICE_LABEL_LEN`] characters.
    pub fn device_label(&self) -> String {
        self.label.chars().take(DEVICE_LABEL_LEN).collect()
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}
