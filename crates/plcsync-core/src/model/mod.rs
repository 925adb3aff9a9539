// ── Domain model ──
//
// Calendar entries as the engine sees them, the register layout they are
// written into, and the per-target sync status.

mod entry;
mod register;
mod status;

pub use entry::{CalendarEntry, DEVICE_LABEL_LEN, EntryKind, TimeRange};
pub use register::{BankLayout, Field, OverflowPolicy, RegisterBank, TimePadding};
pub use status::{SyncPhase, SyncState, SyncStatus, Trigger};
