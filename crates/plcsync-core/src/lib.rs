// plcsync-core: Mirrors a bounded calendar into PLC register memory.

pub mod allocator;
pub mod calendar;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod feed;
pub mod model;
pub mod plan;
pub mod retry;
pub mod schedule;
pub mod store;
pub mod synchronizer;
pub mod verify;

// ── Primary re-exports ──────────────────────────────────────────────
pub use allocator::{Allocation, Category, SlotAssignment, allocate, allocate_with};
pub use calendar::{CalendarSource, EntryScope, JsonCalendar, MemoryCalendar, changed_entries};
pub use config::{EngineConfig, TargetConfig, TlsVerification};
pub use coordinator::{Coordinator, StatusReport, TickReport};
pub use debounce::{AutoSync, Debouncer};
pub use engine::Engine;
pub use error::{CoreError, SyncFault};
pub use feed::{ExternalFeed, FeedReport};
pub use plan::{BankPlan, RegisterValue, SyncPlan};
pub use retry::RetryPolicy;
pub use schedule::Schedule;
pub use store::{Backup, StatusStore};
pub use synchronizer::{BankReadback, SlotReadback, SyncOutcome, Synchronizer};
pub use verify::Mismatch;

pub use model::{
    BankLayout, CalendarEntry, EntryKind, Field, OverflowPolicy, RegisterBank, SyncPhase,
    SyncState, SyncStatus, TimePadding, TimeRange, Trigger,
};
