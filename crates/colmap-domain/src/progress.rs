//! Progress reporting for long-running operations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline phase, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Parsing the uploaded file
    Parsing,
    /// Discovery LLM pass
    Discovery,
    /// Compound extraction LLM pass
    Extraction,
    /// Assembling the final result
    Mapping,
}

impl Phase {
    /// Get the phase name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Parsing => "parsing",
            Phase::Discovery => "discovery",
            Phase::Extraction => "extraction",
            Phase::Mapping => "mapping",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full progress snapshot stored on an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Current phase
    pub phase: Phase,

    /// Human-readable step description
    pub current_step: String,

    /// Rows handled so far in the current phase
    pub rows_processed: usize,

    /// Total rows in the table
    pub total_rows: usize,

    /// Overall completion, 0-100
    pub percent_complete: u8,
}

impl Default for Progress {
    /// Zeroed progress at the start of parsing
    fn default() -> Self {
        Self {
            phase: Phase::Parsing,
            current_step: String::new(),
            rows_processed: 0,
            total_rows: 0,
            percent_complete: 0,
        }
    }
}

impl Progress {
    /// Overlay a partial update on this snapshot
    ///
    /// Fields absent from `update` keep their current value.
    pub fn merge(&self, update: &ProgressUpdate) -> Progress {
        Progress {
            phase: update.phase.unwrap_or(self.phase),
            current_step: update
                .current_step
                .clone()
                .unwrap_or_else(|| self.current_step.clone()),
            rows_processed: update.rows_processed.unwrap_or(self.rows_processed),
            total_rows: update.total_rows.unwrap_or(self.total_rows),
            percent_complete: update
                .percent_complete
                .map(|p| p.min(100))
                .unwrap_or(self.percent_complete),
        }
    }

    /// Progress after successful completion
    pub fn finished(&self) -> Progress {
        Progress {
            phase: Phase::Mapping,
            percent_complete: 100,
            ..self.clone()
        }
    }
}

/// Partial progress update; `None` fields are left untouched on merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// New phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// New step description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    /// New rows-processed count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_processed: Option<usize>,

    /// New total row count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<usize>,

    /// New completion percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<u8>,
}

impl ProgressUpdate {
    /// Update carrying a phase and percentage
    pub fn at(phase: Phase, percent_complete: u8) -> Self {
        Self {
            phase: Some(phase),
            percent_complete: Some(percent_complete),
            ..Default::default()
        }
    }

    /// Set the step description
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    /// Set the rows-processed count
    pub fn with_rows_processed(mut self, rows: usize) -> Self {
        self.rows_processed = Some(rows);
        self
    }

    /// Set the total row count
    pub fn with_total_rows(mut self, rows: usize) -> Self {
        self.total_rows = Some(rows);
        self
    }
}
