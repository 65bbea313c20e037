//! Counters for the TTL sweeper

use crate::operation::OperationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Metrics collected across sweep cycles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepMetrics {
    /// Completed sweep cycles
    pub sweep_count: usize,

    /// Operations evicted per status
    pub removed: BTreeMap<OperationStatus, usize>,

    /// When the last sweep finished
    pub last_sweep_at: Option<DateTime<Utc>>,
}

impl SweepMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sweep cycle and what it evicted
    pub fn record_sweep(&mut self, removed: &BTreeMap<OperationStatus, usize>, at: DateTime<Utc>) {
        self.sweep_count += 1;
        for (status, count) in removed {
            *self.removed.entry(*status).or_insert(0) += count;
        }
        self.last_sweep_at = Some(at);
    }

    /// Total evictions across all statuses
    pub fn total_removed(&self) -> usize {
        self.removed.values().sum()
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        let by_status: Vec<String> = self
            .removed
            .iter()
            .map(|(status, count)| format!("{}={}", status, count))
            .collect();
        format!(
            "{} sweeps, {} evicted [{}]",
            self.sweep_count,
            self.total_removed(),
            by_status.join(", ")
        )
    }
}

/// Sweep metrics shared between the sweeper task and readers
#[derive(Debug, Clone, Default)]
pub struct SharedSweepMetrics(Arc<Mutex<SweepMetrics>>);

impl SharedSweepMetrics {
    fn lock(&self) -> MutexGuard<'_, SweepMetrics> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current metrics
    pub fn snapshot(&self) -> SweepMetrics {
        self.lock().clone()
    }

    /// Record one sweep cycle
    pub fn record_sweep(&self, removed: &BTreeMap<OperationStatus, usize>, at: DateTime<Utc>) {
        self.lock().record_sweep(removed, at);
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.lock().reset();
    }
}
