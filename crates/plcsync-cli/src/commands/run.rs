//! The `run` daemon: coordinator ticks, calendar-file watching, and the
//! external feed, until Ctrl-C.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::future::BoxFuture;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use plcsync_core::{
    CalendarEntry, CoreError, Engine, ExternalFeed, FeedReport, JsonCalendar, SyncOutcome,
    changed_entries,
};

use crate::cli::RunArgs;
use crate::commands::Context;
use crate::error::CliError;

const FEED_TIMEOUT: Duration = Duration::from_secs(300);

pub async fn handle(args: RunArgs, ctx: &Context) -> Result<(), CliError> {
    let config = ctx.config.to_engine_config()?;
    let feed = command_feed(ctx)?;
    let engine = Engine::build(config, ctx.calendar(), feed)?;

    let keys: Vec<String> = engine.status().into_iter().map(|r| r.key).collect();
    info!(targets = keys.len(), "starting sync daemon");

    if args.sync_on_start {
        for key in &keys {
            log_outcome(key, engine.trigger_manual(key).await);
        }
    }

    engine.start().await;

    let mut watch = CalendarWatch::open(ctx.config.calendar_file());
    let mut interval = tokio::time::interval(args.watch_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            _ = interval.tick() => {
                for entry in watch.poll() {
                    let routed = engine.notify_entry(&entry);
                    debug!(entry = %entry.id, targets = ?routed, "calendar change routed");
                }
            }
        }
    }

    info!("shutting down");
    engine.shutdown().await;
    Ok(())
}

fn log_outcome(key: &str, outcome: Result<SyncOutcome, CoreError>) {
    match outcome {
        Ok(SyncOutcome::Succeeded { data_version, .. }) => {
            info!(key = %key, data_version, "startup sync succeeded");
        }
        Ok(SyncOutcome::Failed { errors }) => {
            warn!(key = %key, errors = errors.len(), "startup sync failed");
        }
        Ok(SyncOutcome::AlreadyRunning) => {}
        Err(e) => warn!(key = %key, error = %e, "startup sync not run"),
    }
}

// ── Calendar file watching ──────────────────────────────────────────

/// Polls the calendar snapshot file and reports which entries changed
/// since the last successful read.
struct CalendarWatch {
    calendar: JsonCalendar,
    stamp: Option<(SystemTime, u64)>,
    snapshot: Vec<CalendarEntry>,
}

impl CalendarWatch {
    fn open(path: impl Into<std::path::PathBuf>) -> Self {
        let calendar = JsonCalendar::new(path);
        let stamp = file_stamp(calendar.path());
        let snapshot = calendar.load_all().unwrap_or_else(|e| {
            warn!(error = %e, "calendar file not readable yet");
            Vec::new()
        });
        Self {
            calendar,
            stamp,
            snapshot,
        }
    }

    /// Entries added, removed or changed since the previous poll. Empty
    /// when the file is untouched or unreadable.
    fn poll(&mut self) -> Vec<CalendarEntry> {
        let stamp = file_stamp(self.calendar.path());
        if stamp.is_none() || stamp == self.stamp {
            return Vec::new();
        }
        self.stamp = stamp;

        match self.calendar.load_all() {
            Ok(entries) => {
                let changed = changed_entries(&self.snapshot, &entries);
                if !changed.is_empty() {
                    info!(changed = changed.len(), "calendar file changed");
                }
                self.snapshot = entries;
                changed
            }
            Err(e) => {
                warn!(error = %e, "ignoring unreadable calendar file");
                Vec::new()
            }
        }
    }
}

fn file_stamp(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

// ── External feed ───────────────────────────────────────────────────

/// Runs the configured importer command. The importer writes into the
/// calendar store; its changes reach targets through the file watcher.
struct CommandFeed {
    program: String,
    args: Vec<String>,
}

impl CommandFeed {
    async fn run(&self) -> Result<FeedReport, CoreError> {
        let run = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .stderr(std::process::Stdio::inherit())
            .output();
        let output = tokio::time::timeout(FEED_TIMEOUT, run)
            .await
            .map_err(|_| feed_error(format!("{} timed out", self.program)))?
            .map_err(|e| feed_error(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(feed_error(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        // A JSON report on stdout is optional.
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(serde_json::from_str(stdout.trim()).unwrap_or_default())
    }
}

impl ExternalFeed for CommandFeed {
    fn name(&self) -> &str {
        &self.program
    }

    fn sync(&self) -> BoxFuture<'_, Result<FeedReport, CoreError>> {
        Box::pin(self.run())
    }
}

fn feed_error(message: String) -> CoreError {
    CoreError::Calendar { message }
}

fn command_feed(ctx: &Context) -> Result<Option<Arc<dyn ExternalFeed>>, CliError> {
    let feed = &ctx.config.feed;
    if !feed.enabled {
        return Ok(None);
    }
    let Some((program, args)) = feed.command.split_first() else {
        return Err(CliError::Validation {
            field: "feed.command".into(),
            reason: "required when the feed is enabled".into(),
        });
    };
    Ok(Some(Arc::new(CommandFeed {
        program: program.clone(),
        args: args.to_vec(),
    })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn write(path: &Path, entries: &[CalendarEntry], age_secs: u64) {
        std::fs::write(path, serde_json::to_string(entries).unwrap()).unwrap();
        let stamp = SystemTime::now() - Duration::from_secs(age_secs);
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(stamp)
            .unwrap();
    }

    #[test]
    fn watch_reports_only_changed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.json");
        let date = NaiveDate::from_ymd_opt(2025, 4, 21).unwrap();
        let tiradentes = CalendarEntry::holiday("h1", date, "Tiradentes");
        write(&path, std::slice::from_ref(&tiradentes), 60);

        let mut watch = CalendarWatch::open(&path);
        assert!(watch.poll().is_empty());

        let recesso = CalendarEntry::holiday("h2", date, "Recesso");
        write(&path, &[tiradentes.clone(), recesso.clone()], 30);
        assert_eq!(watch.poll(), vec![recesso]);
        assert!(watch.poll().is_empty());

        write(&path, &[], 10);
        let removed = watch.poll();
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&tiradentes));
    }

    #[test]
    fn watch_tolerates_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut watch = CalendarWatch::open(dir.path().join("calendar.json"));
        assert!(watch.poll().is_empty());
    }
}
