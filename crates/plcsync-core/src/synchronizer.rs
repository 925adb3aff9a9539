// ── Per-target sync pipeline ──
//
// Idle → Preparing → Writing → Verifying → Idle. Each pass snapshots the
// calendar, allocates slots, backs up the payload, writes the full register
// image, reads it back, and records the result. Passes never return errors:
// failures end up in the outcome and in the persisted status.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use plcsync_api::{PlcClient, TagWrite, WriteOutcome};

use crate::calendar::CalendarSource;
use crate::config::TargetConfig;
use crate::error::{CoreError, SyncFault};
use crate::model::{EntryKind, Field, SyncPhase, SyncState, SyncStatus, Trigger};
use crate::plan::SyncPlan;
use crate::store::{Backup, StatusStore};
use crate::verify::verify;

// ── Outcomes ─────────────────────────────────────────────────────────

/// Terminal result of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncOutcome {
    Succeeded {
        data_version: u64,
        entries: BTreeMap<EntryKind, usize>,
    },
    Failed {
        errors: Vec<SyncFault>,
    },
    /// Another pass for the same target was in flight; nothing was done.
    AlreadyRunning,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Decoded register contents of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotReadback {
    pub slot: usize,
    pub values: Vec<i64>,
    pub empty: bool,
}

/// Decoded register contents of one bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankReadback {
    pub kind: EntryKind,
    pub fields: Vec<Field>,
    pub slots: Vec<SlotReadback>,
}

// ── Synchronizer ─────────────────────────────────────────────────────

/// Drives sync passes for one target.
///
/// Cheaply cloneable via `Arc<SyncInner>`. At most one pass runs at a time;
/// a concurrent call returns [`SyncOutcome::AlreadyRunning`] immediately.
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    config: TargetConfig,
    client: PlcClient,
    calendar: Arc<dyn CalendarSource>,
    store: StatusStore,
    status: ArcSwap<SyncStatus>,
    phase: watch::Sender<SyncPhase>,
}

/// Returns the phase to `Idle` when a pass ends, however it ends.
struct PhaseGuard<'a> {
    phase: &'a watch::Sender<SyncPhase>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(SyncPhase::Idle);
    }
}

impl Synchronizer {
    /// Build the gateway client and load the last persisted status.
    ///
    /// An unreadable status file is logged and replaced with a fresh record.
    pub fn new(
        config: TargetConfig,
        calendar: Arc<dyn CalendarSource>,
        store: StatusStore,
    ) -> Result<Self, CoreError> {
        config.probe_address()?;
        let client = config.build_client()?;

        let status = match store.load(&config.key) {
            Ok(Some(status)) => status,
            Ok(None) => SyncStatus::new(config.key.clone()),
            Err(e) => {
                warn!(key = %config.key, error = %e, "discarding unreadable status");
                SyncStatus::new(config.key.clone())
            }
        };
        let (phase, _) = watch::channel(SyncPhase::Idle);

        Ok(Self {
            inner: Arc::new(SyncInner {
                config,
                client,
                calendar,
                store,
                status: ArcSwap::from_pointee(status),
                phase,
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.inner.config.key
    }

    pub fn config(&self) -> &TargetConfig {
        &self.inner.config
    }

    /// Latest status snapshot.
    pub fn status(&self) -> Arc<SyncStatus> {
        self.inner.status.load_full()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.inner.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.inner.phase.subscribe()
    }

    /// Resolve once no pass is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.phase.subscribe();
        let _ = rx.wait_for(|phase| !phase.is_busy()).await;
    }

    // ── Passes ───────────────────────────────────────────────────────

    /// Run a pass against the current wall clock.
    pub async fn run(&self, trigger: Trigger) -> SyncOutcome {
        self.run_at(trigger, Local::now().naive_local()).await
    }

    /// Run a pass allocating relative to `now`.
    pub async fn run_at(&self, trigger: Trigger, now: NaiveDateTime) -> SyncOutcome {
        self.pass(trigger, || self.plan(now)).await
    }

    /// Zero every slot of every bank, verified like a normal pass.
    pub async fn clear(&self) -> SyncOutcome {
        self.pass(Trigger::Clear, || {
            Ok(SyncPlan::cleared(self.key(), &self.inner.config.banks))
        })
        .await
    }

    /// Compute the plan a pass at `now` would write, without side effects.
    pub fn plan(&self, now: NaiveDateTime) -> Result<SyncPlan, CoreError> {
        let config = &self.inner.config;
        let entries = self.inner.calendar.list_entries(&config.scope())?;
        Ok(SyncPlan::build(&config.key, &config.banks, &entries, now))
    }

    async fn pass<F>(&self, trigger: Trigger, prepare: F) -> SyncOutcome
    where
        F: FnOnce() -> Result<SyncPlan, CoreError> + Send,
    {
        let Some(_guard) = self.try_begin() else {
            debug!(key = %self.key(), %trigger, "pass already in progress");
            return SyncOutcome::AlreadyRunning;
        };
        info!(key = %self.key(), %trigger, "sync pass started");

        let started = Utc::now();
        let mut available = None;
        let result = self.execute(prepare, &mut available).await;
        self.finish(trigger, started, available, result)
    }

    fn try_begin(&self) -> Option<PhaseGuard<'_>> {
        let began = self.inner.phase.send_if_modified(|phase| {
            if phase.is_busy() {
                false
            } else {
                *phase = SyncPhase::Preparing;
                true
            }
        });
        // Built only on success: dropping a guard resets the phase.
        if began {
            Some(PhaseGuard {
                phase: &self.inner.phase,
            })
        } else {
            None
        }
    }

    async fn execute<F>(
        &self,
        prepare: F,
        available: &mut Option<bool>,
    ) -> Result<BTreeMap<EntryKind, usize>, Vec<SyncFault>>
    where
        F: FnOnce() -> Result<SyncPlan, CoreError> + Send,
    {
        let inner = &*self.inner;
        let config = &inner.config;

        // ── Preparing ──
        let probe_at = config.probe_address().map_err(|e| vec![e.into()])?;
        let client = &inner.client;
        let probed = config.retry.run("probe", move || client.probe(probe_at)).await;
        *available = Some(probed.is_ok());
        probed.map_err(|e| vec![SyncFault::from(&e)])?;

        let plan = prepare().map_err(|e| vec![SyncFault::from(e)])?;
        debug!(key = %config.key, counts = ?plan.counts(), "plan ready");

        let backup = Backup {
            target: config.key.clone(),
            created_at: Utc::now(),
            data_version: self.status().data_version + 1,
            plan: plan.clone(),
        };
        if let Err(e) = inner.store.write_backup(&backup) {
            warn!(key = %config.key, error = %e, "backup failed, continuing");
        }

        // ── Writing ──
        inner.phase.send_replace(SyncPhase::Writing);
        let writes = plan.writes();
        let outcome = self.write(&writes).await.map_err(|fault| vec![fault])?;
        let mut faults: Vec<SyncFault> = outcome
            .failures
            .into_iter()
            .map(|f| SyncFault::WriteRejected {
                address: Some(f.address.to_string()),
                reason: f.reason,
            })
            .collect();

        // ── Verifying ──
        inner.phase.send_replace(SyncPhase::Verifying);
        let plan_ref = &plan;
        match config.retry.run("verify", move || verify(client, plan_ref)).await {
            Ok(mismatches) => {
                if !mismatches.is_empty() {
                    warn!(
                        key = %config.key,
                        mismatches = mismatches.len(),
                        "read-back disagrees with plan"
                    );
                }
                faults.extend(mismatches.into_iter().map(SyncFault::from));
            }
            Err(e) => faults.push(SyncFault::from(&e)),
        }

        if faults.is_empty() {
            Ok(plan.counts())
        } else {
            Err(faults)
        }
    }

    /// Batch write, falling back to sequential writes when the batch
    /// endpoint is unusable and the target allows it.
    async fn write(&self, writes: &[TagWrite]) -> Result<WriteOutcome, SyncFault> {
        let config = &self.inner.config;
        let client = &self.inner.client;

        debug!(key = %config.key, ops = writes.len(), "batch write");
        match config.retry.run("batch write", move || client.write_batch(writes)).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if config.sequential_fallback && e.is_batch_unavailable() => {
                warn!(
                    key = %config.key,
                    error = %e,
                    "batch endpoint unavailable, writing sequentially"
                );
                config
                    .retry
                    .run("sequential write", move || client.write_sequential(writes))
                    .await
                    .map_err(|e| SyncFault::from(&e))
            }
            Err(e) => Err(SyncFault::from(&e)),
        }
    }

    fn finish(
        &self,
        trigger: Trigger,
        started: chrono::DateTime<Utc>,
        available: Option<bool>,
        result: Result<BTreeMap<EntryKind, usize>, Vec<SyncFault>>,
    ) -> SyncOutcome {
        let mut status = SyncStatus::clone(&self.inner.status.load());
        status.last_attempt = Some(started);
        status.last_trigger = Some(trigger);
        if available.is_some() {
            status.controller_available = available;
        }

        let outcome = match result {
            Ok(entries) => {
                status.state = SyncState::Synced;
                status.last_success = Some(Utc::now());
                status.data_version += 1;
                status.errors.clear();
                status.entries_synced.clone_from(&entries);
                info!(
                    key = %self.key(),
                    version = status.data_version,
                    entries = ?entries,
                    "sync pass succeeded"
                );
                SyncOutcome::Succeeded {
                    data_version: status.data_version,
                    entries,
                }
            }
            Err(errors) => {
                status.state = SyncState::Failed;
                status.errors.clone_from(&errors);
                error!(
                    key = %self.key(),
                    faults = errors.len(),
                    first = %errors.first().map(ToString::to_string).unwrap_or_default(),
                    "sync pass failed"
                );
                SyncOutcome::Failed { errors }
            }
        };

        if let Err(e) = self.inner.store.save(&status) {
            warn!(key = %self.key(), error = %e, "could not persist status");
        }
        self.inner.status.store(Arc::new(status));
        outcome
    }

    // ── Direct controller access ─────────────────────────────────────

    /// Read the probe register once, without retries.
    pub async fn probe(&self) -> Result<(), CoreError> {
        let address = self.inner.config.probe_address()?;
        self.inner.client.probe(address).await?;
        Ok(())
    }

    /// Read every register of every bank and group the values by slot.
    pub async fn read_registers(&self) -> Result<Vec<BankReadback>, CoreError> {
        let mut banks = Vec::with_capacity(self.inner.config.banks.len());
        for bank in &self.inner.config.banks {
            let values = self.inner.client.read_many(&bank.all_addresses()).await?;
            let slots = values
                .chunks(bank.fields().len())
                .enumerate()
                .map(|(slot, values)| SlotReadback {
                    slot,
                    values: values.to_vec(),
                    empty: values.iter().all(|v| *v == 0),
                })
                .collect();
            banks.push(BankReadback {
                kind: bank.kind(),
                fields: bank.fields().to_vec(),
                slots,
            });
        }
        Ok(banks)
    }
}
