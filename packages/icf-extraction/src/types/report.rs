//! The aggregate extraction report.

use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{ExtractionResult, ExtractionStatus, ValidationResult};
use super::variable::Variable;

/// One processed variable: what was asked, what came back, how it checked out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub variable: Variable,
    pub result: ExtractionResult,
    pub validation: ValidationResult,
}

/// Per-status counters, always holding every status in report order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts(IndexMap<ExtractionStatus, usize>);

impl Default for StatusCounts {
    fn default() -> Self {
        Self(ExtractionStatus::ALL.iter().map(|s| (*s, 0)).collect())
    }
}

impl StatusCounts {
    pub fn record(&mut self, status: ExtractionStatus) {
        *self.0.entry(status).or_insert(0) += 1;
    }

    pub fn get(&self, status: ExtractionStatus) -> usize {
        self.0.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExtractionStatus, usize)> + '_ {
        self.0.iter().map(|(s, n)| (*s, *n))
    }
}

/// Everything the assembler needs, handed over read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub run_id: Uuid,

    pub generated_at: DateTime<Utc>,

    /// Source path of the protocol
    pub document_source: String,

    /// SHA-256 of the protocol text
    pub document_hash: String,

    pub counts: StatusCounts,

    pub elapsed: Duration,

    /// The run was cancelled; some entries may be cancellation errors
    pub cancelled: bool,

    /// In requested order
    pub entries: Vec<ReportEntry>,
}

impl ExtractionReport {
    /// Total validation issues across all entries.
    pub fn issue_count(&self) -> usize {
        self.entries.iter().map(|e| e.validation.issues.len()).sum()
    }

    /// Entries whose quotes all verified.
    pub fn fully_verified_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.validation.fully_verified())
            .count()
    }

    pub fn entry(&self, section_id: &str) -> Option<&ReportEntry> {
        self.entries
            .iter()
            .find(|e| e.variable.section_id == section_id)
    }

    pub fn section_ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.variable.section_id.as_str())
            .collect()
    }
}
