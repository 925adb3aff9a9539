// ── Write plans ──
//
// A plan is the full intended register image of a target: every slot of
// every bank, with unused slots zeroed so stale entries never linger.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use plcsync_api::{TagAddress, TagWrite};

use crate::allocator::{Allocation, allocate_with};
use crate::model::{CalendarEntry, EntryKind, Field, RegisterBank};

/// Intended value of one register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterValue {
    pub address: TagAddress,
    pub slot: usize,
    pub field: Field,
    pub value: i64,
}

/// Allocation and register image for one bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankPlan {
    pub kind: EntryKind,
    pub allocation: Allocation,
    pub registers: Vec<RegisterValue>,
}

impl BankPlan {
    /// Allocate `entries` of the bank's kind and encode every slot.
    pub fn build(bank: &RegisterBank, entries: &[CalendarEntry], now: NaiveDateTime) -> Self {
        let relevant: Vec<CalendarEntry> = entries
            .iter()
            .filter(|e| e.kind == bank.kind())
            .cloned()
            .collect();
        let allocation = allocate_with(&relevant, now, bank.capacity(), bank.overflow());
        Self::from_allocation(bank, allocation)
    }

    /// Every slot of the bank zeroed.
    pub fn empty(bank: &RegisterBank) -> Self {
        Self::from_allocation(
            bank,
            Allocation {
                capacity: bank.capacity(),
                ..Allocation::default()
            },
        )
    }

    fn from_allocation(bank: &RegisterBank, allocation: Allocation) -> Self {
        let mut registers = Vec::with_capacity(bank.capacity() * bank.fields().len());
        for slot in 0..bank.capacity() {
            let values = allocation
                .assignments
                .get(slot)
                .map_or_else(|| vec![0; bank.fields().len()], |a| bank.encode(&a.entry));
            for ((address, field), value) in bank
                .slot_addresses(slot)
                .iter()
                .zip(bank.fields())
                .zip(values)
            {
                registers.push(RegisterValue {
                    address: address.clone(),
                    slot,
                    field: *field,
                    value,
                });
            }
        }
        Self {
            kind: bank.kind(),
            allocation,
            registers,
        }
    }

    pub fn allocated(&self) -> usize {
        self.allocation.len()
    }
}

/// The intended register image of a whole target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub target: String,
    pub generated_at: DateTime<Utc>,
    pub banks: Vec<BankPlan>,
}

impl SyncPlan {
    pub fn build(
        target: &str,
        banks: &[RegisterBank],
        entries: &[CalendarEntry],
        now: NaiveDateTime,
    ) -> Self {
        Self {
            target: target.to_owned(),
            generated_at: Utc::now(),
            banks: banks
                .iter()
                .map(|bank| BankPlan::build(bank, entries, now))
                .collect(),
        }
    }

    /// A plan that zeroes every slot of every bank.
    pub fn cleared(target: &str, banks: &[RegisterBank]) -> Self {
        Self {
            target: target.to_owned(),
            generated_at: Utc::now(),
            banks: banks.iter().map(BankPlan::empty).collect(),
        }
    }

    pub fn registers(&self) -> impl Iterator<Item = &RegisterValue> {
        self.banks.iter().flat_map(|b| b.registers.iter())
    }

    /// Writes for every register, allocated and zeroed alike.
    pub fn writes(&self) -> Vec<TagWrite> {
        self.registers()
            .map(|r| TagWrite::new(r.address.clone(), r.value))
            .collect()
    }

    pub fn addresses(&self) -> Vec<TagAddress> {
        self.registers().map(|r| r.address.clone()).collect()
    }

    /// Allocated entries per kind.
    pub fn counts(&self) -> BTreeMap<EntryKind, usize> {
        let mut counts = BTreeMap::new();
        for bank in &self.banks {
            *counts.entry(bank.kind).or_insert(0) += bank.allocated();
        }
        counts
    }
}
