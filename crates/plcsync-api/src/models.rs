// Wire types for the SCADA gateway endpoints.
//
// Field names follow the gateway's JSON verbatim (Portuguese for the
// single-tag endpoints, English for the batch endpoint).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tag::TagAddress;

// ── Single-tag endpoints ────────────────────────────────────────────

/// `GET /tag_read/{plc}/{tag}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TagReadResponse {
    pub valor: i64,
}

/// `GET /tag_write/{plc}/{tag}/{value}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TagWriteResponse {
    #[serde(default)]
    pub sucesso: bool,
}

// ── Batch endpoint ──────────────────────────────────────────────────

/// `POST /tag_write_batch` request body.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRequest<'a> {
    pub clp_address: &'a str,
    pub operations: Vec<BatchOperation>,
}

/// One operation inside a batch. Values travel as strings.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOperation {
    pub tag_address: String,
    pub value: String,
}

/// `POST /tag_write_batch` response.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub summary: Option<BatchSummary>,
    #[serde(default)]
    pub results: HashMap<String, BatchResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSummary {
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

// ── Client-facing types ─────────────────────────────────────────────

/// A single register write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagWrite {
    pub address: TagAddress,
    pub value: i64,
}

impl TagWrite {
    pub fn new(address: TagAddress, value: i64) -> Self {
        Self { address, value }
    }
}

/// A write the controller reported as failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFailure {
    pub address: TagAddress,
    pub reason: String,
}

/// Result of a batch or sequential write pass.
///
/// Per-operation failures are collected rather than raised; only auth and
/// transport errors abort a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub total: usize,
    pub successful: usize,
    pub failures: Vec<TagFailure>,
}

impl WriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.successful == self.total
    }

    pub(crate) fn record_success(&mut self) {
        self.total += 1;
        self.successful += 1;
    }

    pub(crate) fn record_failure(&mut self, address: TagAddress, reason: impl Into<String>) {
        self.total += 1;
        self.failures.push(TagFailure {
            address,
            reason: reason.into(),
        });
    }

    /// Fold a batch response into an outcome, matching results by tag.
    ///
    /// Tags missing from `results` count as written when the batch as a whole
    /// succeeded; read-back verification catches anything the gateway lied about.
    pub(crate) fn from_batch(operations: &[TagWrite], response: &BatchResponse) -> Self {
        let mut outcome = Self::default();
        for op in operations {
            match response.results.get(&op.address.to_string()) {
                Some(result) if result.success => outcome.record_success(),
                Some(result) => outcome.record_failure(
                    op.address.clone(),
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| "rejected by controller".into()),
                ),
                None if response.success => outcome.record_success(),
                None => outcome.record_failure(op.address.clone(), "no result reported"),
            }
        }
        outcome
    }
}
