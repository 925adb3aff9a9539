// ── External feed hook ──
//
// An importer of third-party calendar entries polled by the coordinator on
// its own schedule. Imported entries reach targets through the normal
// mutation path; the feed itself never writes to a controller.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Summary of one feed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedReport {
    pub imported: usize,
    pub updated: usize,
    pub removed: usize,
}

pub trait ExternalFeed: Send + Sync {
    fn name(&self) -> &str;

    fn sync(&self) -> BoxFuture<'_, Result<FeedReport, CoreError>>;
}
