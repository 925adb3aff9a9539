use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::entry::EntryKind;
use crate::error::SyncFault;

/// Outcome of the most recent pass, as persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
    #[default]
    NeverSynced,
    Synced,
    Failed,
}

/// Live pipeline phase of a target. Anything but `Idle` means a pass is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Preparing,
    Writing,
    Verifying,
}

impl SyncPhase {
    pub fn is_busy(self) -> bool {
        self != Self::Idle
    }
}

/// What started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
    Mutation,
    Clear,
}

/// Per-target sync record. Mutated only by the target's synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub target: String,
    #[serde(default)]
    pub state: SyncState,
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_trigger: Option<Trigger>,
    /// Bumped once per successful pass, never on failure.
    #[serde(default)]
    pub data_version: u64,
    #[serde(default)]
    pub controller_available: Option<bool>,
    /// Entries written per kind by the last successful pass.
    #[serde(default)]
    pub entries_synced: BTreeMap<EntryKind, usize>,
    #[serde(default)]
    pub errors: Vec<SyncFault>,
}

impl SyncStatus {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            state: SyncState::NeverSynced,
            last_attempt: None,
            last_success: None,
            last_trigger: None,
            data_version: 0,
            controller_available: None,
            entries_synced: BTreeMap::new(),
            errors: Vec::new(),
        }
    }
}
