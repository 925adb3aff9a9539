// ── Read-back verification ──
//
// The gateway answers 200 for writes the PLC firmware later drops, so a
// pass only counts once every register reads back as planned.

use serde::{Deserialize, Serialize};
use tracing::debug;

use plcsync_api::{PlcClient, TagAddress};

use crate::error::SyncFault;
use crate::plan::{RegisterValue, SyncPlan};

/// A register whose read-back value differs from the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub address: TagAddress,
    pub expected: i64,
    pub actual: i64,
}

impl From<Mismatch> for SyncFault {
    fn from(m: Mismatch) -> Self {
        SyncFault::VerifyMismatch {
            address: m.address.to_string(),
            expected: m.expected,
            actual: m.actual,
        }
    }
}

/// Re-read every register of `plan` and compare against the intended values.
pub async fn verify(client: &PlcClient, plan: &SyncPlan) -> Result<Vec<Mismatch>, plcsync_api::Error> {
    let expected: Vec<&RegisterValue> = plan.registers().collect();
    let addresses = plan.addresses();
    debug!(target = %plan.target, registers = addresses.len(), "reading back registers");

    let actual = client.read_many(&addresses).await?;
    Ok(compare(&expected, &actual))
}

/// Pair expected and actual values positionally. A short read counts every
/// missing register as a mismatch against zero.
pub fn compare(expected: &[&RegisterValue], actual: &[i64]) -> Vec<Mismatch> {
    expected
        .iter()
        .enumerate()
        .filter_map(|(i, reg)| {
            let read = actual.get(i).copied().unwrap_or(0);
            let missing = i >= actual.len();
            (missing || read != reg.value).then(|| Mismatch {
                address: reg.address.clone(),
                expected: reg.value,
                actual: read,
            })
        })
        .collect()
}
