// ── Engine wiring ──
//
// Explicit construction of the whole engine at process start: one
// synchronizer per target, shared by the coordinator and the mutation
// debouncer. No global lookups.

use std::sync::Arc;

use chrono::NaiveTime;

use crate::calendar::CalendarSource;
use crate::config::EngineConfig;
use crate::coordinator::{Coordinator, StatusReport};
use crate::debounce::AutoSync;
use crate::error::CoreError;
use crate::feed::ExternalFeed;
use crate::model::{CalendarEntry, SyncStatus};
use crate::store::StatusStore;
use crate::synchronizer::{SyncOutcome, Synchronizer};

/// The assembled sync engine.
pub struct Engine {
    coordinator: Coordinator,
    autosync: AutoSync,
    store: StatusStore,
}

impl Engine {
    /// Build every target. Must be called from within a tokio runtime.
    pub fn build(
        config: EngineConfig,
        calendar: Arc<dyn CalendarSource>,
        feed: Option<Arc<dyn ExternalFeed>>,
    ) -> Result<Self, CoreError> {
        let store = StatusStore::new(config.data_dir.clone());

        let synchronizers = config
            .targets
            .into_iter()
            .map(|target| Synchronizer::new(target, Arc::clone(&calendar), store.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let autosync = AutoSync::new(config.debounce, synchronizers.iter().cloned());
        let coordinator = match feed {
            Some(feed) => {
                Coordinator::with_feed(synchronizers, config.tick, feed, config.feed_schedule)
            }
            None => Coordinator::new(synchronizers, config.tick),
        };

        Ok(Self {
            coordinator,
            autosync,
            store,
        })
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn autosync(&self) -> &AutoSync {
        &self.autosync
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn synchronizer(&self, key: &str) -> Result<&Synchronizer, CoreError> {
        self.coordinator.synchronizer(key)
    }

    pub async fn start(&self) {
        self.coordinator.start().await;
    }

    /// Drop pending debounce timers, stop the tick loop, and wait for
    /// in-flight passes.
    pub async fn shutdown(&self) {
        self.autosync.debouncer().cancel_all();
        self.coordinator.shutdown().await;
    }

    // ── Exposed interface ────────────────────────────────────────────

    pub fn get_status(&self, key: &str) -> Result<SyncStatus, CoreError> {
        Ok(SyncStatus::clone(&self.synchronizer(key)?.status()))
    }

    pub fn status(&self) -> Vec<StatusReport> {
        self.coordinator.status()
    }

    pub async fn trigger_manual(&self, key: &str) -> Result<SyncOutcome, CoreError> {
        self.coordinator.trigger_manual(key).await
    }

    pub fn configure_schedule(
        &self,
        key: &str,
        enabled: bool,
        times: Vec<NaiveTime>,
    ) -> Result<(), CoreError> {
        self.coordinator.configure_schedule(key, enabled, times)
    }

    pub fn notify_mutation(&self, key: &str) -> Result<(), CoreError> {
        self.autosync.notify_mutation(key)
    }

    pub fn notify_entry(&self, entry: &CalendarEntry) -> Vec<String> {
        self.autosync.notify_entry(entry)
    }
}
