// ── Debounced triggers ──
//
// Calendar edits arrive in bursts. Every notification re-arms a per-key
// timer; only the last one in a quiet window fires. Timers are tokio tasks
// racing a sleep against a cancellation token.

use std::collections::BTreeMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::model::{CalendarEntry, Trigger};
use crate::synchronizer::{SyncOutcome, Synchronizer};

/// Outstanding timer for one key.
#[derive(Debug)]
struct PendingTrigger {
    generation: u64,
    cancel: CancellationToken,
}

/// Coalesces bursts of calls per key into one deferred job.
///
/// Safe to call from any thread: timers are spawned on the runtime handle
/// captured at construction.
pub struct Debouncer<K> {
    delay: Duration,
    runtime: Handle,
    pending: Arc<DashMap<K, PendingTrigger>>,
    next_generation: AtomicU64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Must be called from within a tokio runtime.
    pub fn new(delay: Duration) -> Self {
        Self::with_handle(delay, Handle::current())
    }

    pub fn with_handle(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            pending: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm (or re-arm) the timer for `key`. `job` runs once the delay passes
    /// without another `schedule` for the same key.
    pub fn schedule<F, Fut>(&self, key: K, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let replaced = self.pending.insert(
            key.clone(),
            PendingTrigger {
                generation,
                cancel: cancel.clone(),
            },
        );
        if let Some(old) = replaced {
            old.cancel.cancel();
        }

        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    // A newer schedule may have raced the sleep; only the
                    // current generation gets to consume the entry.
                    if pending.remove_if(&key, |_, p| p.generation == generation).is_some() {
                        job().await;
                    }
                }
            }
        });
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every armed timer without running its job.
    pub fn cancel_all(&self) {
        self.pending.retain(|_, p| {
            p.cancel.cancel();
            false
        });
    }
}

// ── Auto-sync on calendar mutations ──────────────────────────────────

/// Routes calendar mutations to the targets they affect and runs one
/// debounced pass per target.
pub struct AutoSync {
    debouncer: Debouncer<String>,
    targets: Arc<BTreeMap<String, Synchronizer>>,
}

impl AutoSync {
    /// Must be called from within a tokio runtime.
    pub fn new(delay: Duration, targets: impl IntoIterator<Item = Synchronizer>) -> Self {
        let targets = targets
            .into_iter()
            .map(|s| (s.key().to_owned(), s))
            .collect();
        Self {
            debouncer: Debouncer::new(delay),
            targets: Arc::new(targets),
        }
    }

    pub fn debouncer(&self) -> &Debouncer<String> {
        &self.debouncer
    }

    /// Note that `target_key`'s calendar slice changed.
    pub fn notify_mutation(&self, target_key: &str) -> Result<(), CoreError> {
        let sync = self
            .targets
            .get(target_key)
            .cloned()
            .ok_or_else(|| CoreError::TargetNotFound {
                key: target_key.to_owned(),
            })?;
        debug!(key = target_key, delay = ?self.debouncer.delay(), "mutation noted, timer re-armed");
        self.debouncer
            .schedule(target_key.to_owned(), move || run_when_idle(sync));
        Ok(())
    }

    /// Notify every target whose slice contains `entry`. Returns the keys armed.
    pub fn notify_entry(&self, entry: &CalendarEntry) -> Vec<String> {
        self.notify_where(|s| s.config().handles(entry))
    }

    /// Notify every target that receives events at `location`.
    pub fn notify_location(&self, location: &str) -> Vec<String> {
        let armed = self.notify_where(|s| s.config().handles_location(location));
        if armed.is_empty() {
            debug!(location, "no target mirrors this location");
        }
        armed
    }

    fn notify_where(&self, mut affected: impl FnMut(&Synchronizer) -> bool) -> Vec<String> {
        let keys: Vec<String> = self
            .targets
            .values()
            .filter(|s| affected(s))
            .map(|s| s.key().to_owned())
            .collect();
        for key in &keys {
            // keys come from the map itself
            let _ = self.notify_mutation(key);
        }
        keys
    }
}

/// Run a mutation-triggered pass, waiting out any pass already in flight so
/// the mutation is never lost.
async fn run_when_idle(sync: Synchronizer) {
    loop {
        sync.wait_idle().await;
        match sync.run(Trigger::Mutation).await {
            SyncOutcome::AlreadyRunning => {}
            outcome => {
                info!(key = %sync.key(), success = outcome.is_success(), "mutation-triggered pass done");
                return;
            }
        }
    }
}
