// ── Coordinator ──
//
// One background loop fires each target at its scheduled times of day and
// polls the external feed on its own schedule. It also serves status
// queries, manual triggers and live schedule changes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::feed::{ExternalFeed, FeedReport};
use crate::model::{SyncPhase, SyncStatus, Trigger};
use crate::schedule::Schedule;
use crate::synchronizer::{SyncOutcome, Synchronizer};

/// Status of one target as shown to operators.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub key: String,
    pub name: String,
    pub phase: SyncPhase,
    pub schedule: Schedule,
    pub next_scheduled: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub status: SyncStatus,
}

/// What a single tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub fired: Vec<(String, SyncOutcome)>,
    pub feed: Option<Result<FeedReport, String>>,
}

struct TargetSlot {
    sync: Synchronizer,
    schedule: ArcSwap<Schedule>,
    /// Last schedule slot this target was fired for.
    last_fired: ArcSwapOption<NaiveDateTime>,
}

struct FeedSlot {
    feed: Arc<dyn ExternalFeed>,
    schedule: ArcSwap<Schedule>,
    last_fired: ArcSwapOption<NaiveDateTime>,
}

/// Cheaply cloneable via `Arc<CoordinatorInner>`.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    targets: BTreeMap<String, TargetSlot>,
    feed: Option<FeedSlot>,
    tick: Duration,
    cancel: CancellationToken,
    /// The tick loop and every tick it spawned.
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(targets: impl IntoIterator<Item = Synchronizer>, tick: Duration) -> Self {
        Self::build(targets, tick, None)
    }

    /// Coordinator that also polls `feed` at the times in `schedule`.
    pub fn with_feed(
        targets: impl IntoIterator<Item = Synchronizer>,
        tick: Duration,
        feed: Arc<dyn ExternalFeed>,
        schedule: Schedule,
    ) -> Self {
        let feed = FeedSlot {
            feed,
            schedule: ArcSwap::from_pointee(schedule),
            last_fired: ArcSwapOption::empty(),
        };
        Self::build(targets, tick, Some(feed))
    }

    fn build(
        targets: impl IntoIterator<Item = Synchronizer>,
        tick: Duration,
        feed: Option<FeedSlot>,
    ) -> Self {
        let targets = targets
            .into_iter()
            .map(|sync| {
                let slot = TargetSlot {
                    schedule: ArcSwap::from_pointee(sync.config().schedule.clone()),
                    last_fired: ArcSwapOption::empty(),
                    sync,
                };
                (slot.sync.key().to_owned(), slot)
            })
            .collect();
        Self {
            inner: Arc::new(CoordinatorInner {
                targets,
                feed,
                tick,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn synchronizer(&self, key: &str) -> Result<&Synchronizer, CoreError> {
        self.slot(key).map(|slot| &slot.sync)
    }

    pub fn synchronizers(&self) -> impl Iterator<Item = &Synchronizer> {
        self.inner.targets.values().map(|slot| &slot.sync)
    }

    fn slot(&self, key: &str) -> Result<&TargetSlot, CoreError> {
        self.inner
            .targets
            .get(key)
            .ok_or_else(|| CoreError::TargetNotFound {
                key: key.to_owned(),
            })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the tick loop.
    pub async fn start(&self) {
        let coordinator = self.clone();
        let cancel = self.inner.cancel.clone();
        let handle = tokio::spawn(tick_task(coordinator, cancel));
        self.inner.task_handles.lock().await.push(handle);
        info!(
            targets = self.inner.targets.len(),
            tick = ?self.inner.tick,
            "coordinator started"
        );
    }

    /// Stop the tick loop and wait for in-flight passes and feed runs to
    /// finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        // The loop may still push a tick while it winds down; drain until
        // nothing new turns up.
        loop {
            let handles = std::mem::take(&mut *self.inner.task_handles.lock().await);
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }

        join_all(self.synchronizers().map(Synchronizer::wait_idle)).await;
        debug!("coordinator stopped");
    }

    // ── Scheduling ───────────────────────────────────────────────────

    /// Window after a scheduled time in which the slot may still fire.
    fn grace(&self) -> TimeDelta {
        TimeDelta::from_std(self.inner.tick * 2).unwrap_or(TimeDelta::MAX)
    }

    /// Fire every target (and the feed) with a slot due at `now`.
    ///
    /// Due passes run concurrently; a failing target never holds up the others.
    pub async fn tick(&self, now: NaiveDateTime) -> TickReport {
        let grace = self.grace();

        let due: Vec<(&TargetSlot, Claim)> = self
            .inner
            .targets
            .values()
            .filter_map(|slot| {
                let floor = slot_floor(&slot.sync);
                claim(&slot.schedule, &slot.last_fired, floor, now, grace).map(|c| (slot, c))
            })
            .collect();

        let target_runs = join_all(due.iter().map(|(slot, claimed)| async move {
            info!(key = %slot.sync.key(), "scheduled sync due");
            let outcome = slot.sync.run_at(Trigger::Scheduled, now).await;
            if matches!(outcome, SyncOutcome::AlreadyRunning) {
                warn!(
                    key = %slot.sync.key(),
                    slot = %claimed.slot,
                    "pass in flight, scheduled slot left for the next tick"
                );
                claimed.release(&slot.last_fired);
            }
            (slot.sync.key().to_owned(), outcome)
        }));

        let feed_run = async {
            let feed = self.inner.feed.as_ref()?;
            claim(&feed.schedule, &feed.last_fired, None, now, grace)?;
            info!(feed = feed.feed.name(), "external feed sync due");
            let result = feed.feed.sync().await.map_err(|e| e.to_string());
            match &result {
                Ok(report) => info!(feed = feed.feed.name(), ?report, "external feed synced"),
                Err(e) => warn!(feed = feed.feed.name(), error = %e, "external feed failed"),
            }
            Some(result)
        };

        let (fired, feed) = tokio::join!(target_runs, feed_run);
        TickReport { fired, feed }
    }

    // ── Operator surface ─────────────────────────────────────────────

    pub fn status(&self) -> Vec<StatusReport> {
        let now = Local::now().naive_local();
        self.inner
            .targets
            .values()
            .map(|slot| report(slot, now))
            .collect()
    }

    pub fn get_status(&self, key: &str) -> Result<StatusReport, CoreError> {
        let now = Local::now().naive_local();
        self.slot(key).map(|slot| report(slot, now))
    }

    /// Run a pass now. A pass already in flight is an error, not a queue.
    pub async fn trigger_manual(&self, key: &str) -> Result<SyncOutcome, CoreError> {
        let sync = &self.slot(key)?.sync;
        match sync.run(Trigger::Manual).await {
            SyncOutcome::AlreadyRunning => Err(CoreError::SyncInProgress {
                target: key.to_owned(),
            }),
            outcome => Ok(outcome),
        }
    }

    /// Replace a target's schedule; takes effect on the next tick.
    pub fn configure_schedule(
        &self,
        key: &str,
        enabled: bool,
        times: Vec<NaiveTime>,
    ) -> Result<(), CoreError> {
        let slot = self.slot(key)?;
        let schedule = Schedule::new(enabled, times);
        info!(key, enabled, times = %schedule.display_times(), "schedule updated");
        slot.schedule.store(Arc::new(schedule));
        Ok(())
    }
}

/// Earliest moment a schedule slot may count as not yet run: a pass attempted
/// at or after a slot (for instance before a restart) already covers it.
fn slot_floor(sync: &Synchronizer) -> Option<NaiveDateTime> {
    sync.status()
        .last_attempt
        .map(|at| at.with_timezone(&Local).naive_local())
}

/// A slot marked fired by [`claim`].
struct Claim {
    slot: NaiveDateTime,
    previous: Option<Arc<NaiveDateTime>>,
}

impl Claim {
    /// Undo the mark so a later tick inside the grace window can fire the
    /// slot again.
    fn release(&self, last_fired: &ArcSwapOption<NaiveDateTime>) {
        last_fired.rcu(|current| {
            if current.as_deref() == Some(&self.slot) {
                self.previous.clone()
            } else {
                current.clone()
            }
        });
    }
}

/// Decide whether the slot due at `now` should fire and mark it fired.
fn claim(
    schedule: &ArcSwap<Schedule>,
    last_fired: &ArcSwapOption<NaiveDateTime>,
    last_attempt: Option<NaiveDateTime>,
    now: NaiveDateTime,
    grace: TimeDelta,
) -> Option<Claim> {
    let slot = schedule.load().due_slot(now, grace)?;
    let previous = last_fired.load_full();
    if previous.as_deref() == Some(&slot) {
        return None;
    }
    last_fired.store(Some(Arc::new(slot)));
    if last_attempt.is_some_and(|at| at >= slot) {
        return None;
    }
    Some(Claim { slot, previous })
}

fn report(slot: &TargetSlot, now: NaiveDateTime) -> StatusReport {
    let schedule = Schedule::clone(&slot.schedule.load());
    StatusReport {
        key: slot.sync.key().to_owned(),
        name: slot.sync.config().name.clone(),
        phase: slot.sync.phase(),
        next_scheduled: schedule.next_after(now),
        schedule,
        status: SyncStatus::clone(&slot.sync.status()),
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Tick on a fixed interval. Each tick runs in its own task so a slow pass
/// never delays evaluation of the next tick; the handles are kept for
/// [`Coordinator::shutdown`].
async fn tick_task(coordinator: Coordinator, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(coordinator.inner.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let now = Local::now().naive_local();
                let ctrl = coordinator.clone();
                let handle = tokio::spawn(async move {
                    let report = ctrl.tick(now).await;
                    if !report.fired.is_empty() {
                        debug!(fired = report.fired.len(), "tick complete");
                    }
                });
                let mut handles = coordinator.inner.task_handles.lock().await;
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
            }
        }
    }
}
