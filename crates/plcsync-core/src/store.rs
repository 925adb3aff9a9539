// ── Status and backup persistence ──
//
// One JSON status file and one JSON backup file per target under a data
// directory. Writes go through a temp file and a rename so a crash never
// leaves a half-written status behind.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::CoreError;
use crate::model::SyncStatus;
use crate::plan::SyncPlan;

/// Forensic copy of the payload a pass is about to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub target: String,
    pub created_at: DateTime<Utc>,
    /// The version the target would reach if this pass succeeds.
    pub data_version: u64,
    pub plan: SyncPlan,
}

/// Reads and writes per-target status and backup files.
#[derive(Debug, Clone)]
pub struct StatusStore {
    dir: PathBuf,
}

impl StatusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn status_path(&self, target: &str) -> PathBuf {
        self.dir.join(format!("{target}_status.json"))
    }

    pub fn backup_path(&self, target: &str) -> PathBuf {
        self.dir.join(format!("{target}_backup.json"))
    }

    /// Load a target's status. A missing file is `Ok(None)`.
    pub fn load(&self, target: &str) -> Result<Option<SyncStatus>, CoreError> {
        read_json(&self.status_path(target))
    }

    pub fn save(&self, status: &SyncStatus) -> Result<(), CoreError> {
        write_json(&self.status_path(&status.target), status)
    }

    pub fn load_backup(&self, target: &str) -> Result<Option<Backup>, CoreError> {
        read_json(&self.backup_path(target))
    }

    pub fn write_backup(&self, backup: &Backup) -> Result<(), CoreError> {
        write_json(&self.backup_path(&backup.target), backup)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(persistence(path, &e)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| persistence(path, &e))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| persistence(parent, &e))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| persistence(path, &e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| persistence(&tmp, &e))?;
    fs::rename(&tmp, path).map_err(|e| persistence(path, &e))?;
    debug!(path = %path.display(), "wrote state file");
    Ok(())
}

fn persistence(path: &Path, err: &dyn std::fmt::Display) -> CoreError {
    CoreError::Persistence {
        message: format!("{}: {err}", path.display()),
    }
}
