use chrono::{Datelike, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use plcsync_api::TagAddress;

use super::entry::{CalendarEntry, EntryKind, TimeRange};
use crate::error::CoreError;

// ── Fields ───────────────────────────────────────────────────────────

/// One numeric register of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Day,
    Month,
    StartHour,
    StartMinute,
    EndHour,
    EndMinute,
}

impl Field {
    pub const HOLIDAY: &'static [Field] = &[Field::Day, Field::Month];
    pub const EVENT: &'static [Field] = &[
        Field::Day,
        Field::Month,
        Field::StartHour,
        Field::StartMinute,
        Field::EndHour,
        Field::EndMinute,
    ];

    /// Register layout of one slot for the given entry kind.
    pub fn for_kind(kind: EntryKind) -> &'static [Field] {
        match kind {
            EntryKind::Holiday => Self::HOLIDAY,
            EntryKind::Event => Self::EVENT,
        }
    }

    fn value(self, entry: &CalendarEntry, time: TimeRange) -> i64 {
        let v = match self {
            Field::Day => entry.date.day(),
            Field::Month => entry.date.month(),
            Field::StartHour => time.start.hour(),
            Field::StartMinute => time.start.minute(),
            Field::EndHour => time.end.hour(),
            Field::EndMinute => time.end.minute(),
        };
        i64::from(v)
    }
}

// ── Policies ─────────────────────────────────────────────────────────

/// Which entries lose their slot when a bank is over capacity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverflowPolicy {
    /// Recent past first, then future; the latest future entries fall off the end.
    #[default]
    KeepHistory,
    /// Oldest past entries are dropped before any future entry.
    PreferFuture,
}

/// Widens event windows so rooms are conditioned before people arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePadding {
    pub before_minutes: u32,
    pub after_minutes: u32,
    /// Padding never moves a start earlier than this.
    pub earliest_start: NaiveTime,
}

impl TimePadding {
    pub fn apply(&self, range: TimeRange) -> TimeRange {
        let last_minute = TimeRange::all_day().end;

        let (start, wrapped) = range
            .start
            .overflowing_sub_signed(TimeDelta::minutes(i64::from(self.before_minutes)));
        let start = if wrapped == 0 { start } else { NaiveTime::MIN };
        let start = start.max(self.earliest_start.min(range.start));

        let (end, wrapped) = range
            .end
            .overflowing_add_signed(TimeDelta::minutes(i64::from(self.after_minutes)));
        let end = if wrapped == 0 {
            end.min(last_minute)
        } else {
            last_minute
        };

        TimeRange { start, end }
    }
}

// ── Layout ───────────────────────────────────────────────────────────

/// How slot fields map onto PLC data files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum BankLayout {
    /// One data file per field: field `f` of slot `i` lives at
    /// `files[f]:(element_base + i * stride)`.
    Split {
        files: Vec<String>,
        element_base: u32,
        stride: u32,
    },
    /// All fields in one data file: field `f` of slot `i` lives at
    /// `file:(element_base + i * fields_per_entry + f)`.
    Packed { file: String, element_base: u32 },
}

impl BankLayout {
    /// Split layout with consecutive elements starting at 0.
    pub fn split<S: Into<String>>(files: impl IntoIterator<Item = S>) -> Self {
        Self::Split {
            files: files.into_iter().map(Into::into).collect(),
            element_base: 0,
            stride: 1,
        }
    }
}

/// A fixed-capacity region of controller memory holding one entry kind.
///
/// Addresses for every `(slot, field)` are computed once at construction so
/// an invalid layout is rejected at startup rather than mid-sync.
#[derive(Debug, Clone)]
pub struct RegisterBank {
    kind: EntryKind,
    capacity: usize,
    layout: BankLayout,
    overflow: OverflowPolicy,
    padding: Option<TimePadding>,
    addresses: Vec<Vec<TagAddress>>,
}

impl RegisterBank {
    pub fn new(kind: EntryKind, capacity: usize, layout: BankLayout) -> Result<Self, CoreError> {
        let fields = Field::for_kind(kind);
        let invalid = |message: String| CoreError::Config { message };

        let mut addresses = Vec::with_capacity(capacity);
        for slot in 0..capacity {
            let slot = u32::try_from(slot)
                .map_err(|_| invalid(format!("capacity {capacity} too large")))?;
            let row = match &layout {
                BankLayout::Split {
                    files,
                    element_base,
                    stride,
                } => {
                    if files.len() != fields.len() {
                        return Err(invalid(format!(
                            "{kind} bank needs {} data files, got {}",
                            fields.len(),
                            files.len()
                        )));
                    }
                    let element = slot
                        .checked_mul(*stride)
                        .and_then(|offset| offset.checked_add(*element_base))
                        .ok_or_else(|| invalid(format!("{kind} bank addresses overflow")))?;
                    files
                        .iter()
                        .map(|file| checked_tag(file, element))
                        .collect::<Result<Vec<_>, _>>()?
                }
                BankLayout::Packed { file, element_base } => {
                    let width = u32::try_from(fields.len()).unwrap_or(u32::MAX);
                    (0..width)
                        .map(|f| {
                            slot.checked_mul(width)
                                .and_then(|offset| offset.checked_add(f))
                                .and_then(|offset| offset.checked_add(*element_base))
                                .ok_or_else(|| invalid(format!("{kind} bank addresses overflow")))
                                .and_then(|element| checked_tag(file, element))
                        })
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            addresses.push(row);
        }

        Ok(Self {
            kind,
            capacity,
            layout,
            overflow: OverflowPolicy::default(),
            padding: None,
            addresses,
        })
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_padding(mut self, padding: TimePadding) -> Self {
        self.padding = Some(padding);
        self
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn layout(&self) -> &BankLayout {
        &self.layout
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    pub fn padding(&self) -> Option<TimePadding> {
        self.padding
    }

    pub fn fields(&self) -> &'static [Field] {
        Field::for_kind(self.kind)
    }

    /// Addresses of every field of `slot`, in field order. Empty past capacity.
    pub fn slot_addresses(&self, slot: usize) -> &[TagAddress] {
        self.addresses.get(slot).map_or(&[], Vec::as_slice)
    }

    /// The first register of the bank, used for connectivity probes.
    pub fn first_address(&self) -> Option<&TagAddress> {
        self.addresses.first().and_then(|row| row.first())
    }

    /// Every address of the bank, slot-major.
    pub fn all_addresses(&self) -> Vec<TagAddress> {
        self.addresses.iter().flatten().cloned().collect()
    }

    /// Register values for `entry`, in field order, with padding applied.
    pub fn encode(&self, entry: &CalendarEntry) -> Vec<i64> {
        let time = entry.time.unwrap_or_else(TimeRange::all_day);
        let time = match self.padding {
            Some(padding) if self.kind == EntryKind::Event => padding.apply(time),
            _ => time,
        };
        self.fields().iter().map(|f| f.value(entry, time)).collect()
    }
}

fn checked_tag(file: &str, element: u32) -> Result<TagAddress, CoreError> {
    if file.is_empty() || !file.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::Config {
            message: format!("invalid data file name {file:?}"),
        });
    }
    Ok(TagAddress::new(file, element))
}
