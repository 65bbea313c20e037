//! Retention configuration for operations
//!
//! Defines a TTL per operation status and how often expired operations
//! are swept.

use crate::operation::OperationStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for operation retention
///
/// TTLs are measured from an operation's creation time, whatever its
/// current status.
///
/// # Examples
///
/// ```
/// use colmap_operations::OperationsConfig;
///
/// let config = OperationsConfig::default();
/// assert_eq!(config.pending_ttl_minutes, 30);
///
/// let config = OperationsConfig::aggressive();
/// assert_eq!(config.completed_ttl_minutes, 60);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationsConfig {
    /// TTL for operations still waiting for a worker
    /// Default: 30 minutes
    pub pending_ttl_minutes: u64,

    /// TTL for operations a worker is running; reclaims stuck jobs
    /// Default: 60 minutes
    pub processing_ttl_minutes: u64,

    /// TTL for completed operations
    /// Default: 24 hours
    pub completed_ttl_minutes: u64,

    /// TTL for failed operations
    /// Default: 24 hours
    pub failed_ttl_minutes: u64,

    /// TTL for cancelled operations
    /// Default: 60 minutes
    pub cancelled_ttl_minutes: u64,

    /// How often the sweeper runs (in minutes)
    /// Default: 5 minutes
    pub sweep_interval_minutes: u64,

    /// Attach debug details of the source error to failed operations
    /// Default: true; turn off in production
    pub include_error_details: bool,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            pending_ttl_minutes: 30,
            processing_ttl_minutes: 60,
            completed_ttl_minutes: 24 * 60,
            failed_ttl_minutes: 24 * 60,
            cancelled_ttl_minutes: 60,
            sweep_interval_minutes: 5,
            include_error_details: true,
        }
    }
}

impl OperationsConfig {
    /// Short retention for memory-constrained deployments
    ///
    /// - Pending: 15 minutes
    /// - Processing: 30 minutes
    /// - Completed / failed: 1 hour
    /// - Cancelled: 15 minutes
    /// - Sweep interval: 1 minute
    pub fn aggressive() -> Self {
        Self {
            pending_ttl_minutes: 15,
            processing_ttl_minutes: 30,
            completed_ttl_minutes: 60,
            failed_ttl_minutes: 60,
            cancelled_ttl_minutes: 15,
            sweep_interval_minutes: 1,
            include_error_details: true,
        }
    }

    /// Production defaults: standard TTLs without error details
    pub fn production() -> Self {
        Self {
            include_error_details: false,
            ..Self::default()
        }
    }

    /// TTL for an operation in `status`
    pub fn ttl(&self, status: OperationStatus) -> Duration {
        let minutes = match status {
            OperationStatus::Pending => self.pending_ttl_minutes,
            OperationStatus::Processing => self.processing_ttl_minutes,
            OperationStatus::Completed => self.completed_ttl_minutes,
            OperationStatus::Failed => self.failed_ttl_minutes,
            OperationStatus::Cancelled => self.cancelled_ttl_minutes,
        };
        Duration::from_secs(minutes * 60)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_minutes * 60)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval_minutes == 0 {
            return Err("sweep_interval_minutes must be at least 1".to_string());
        }
        for status in OperationStatus::ALL {
            if self.ttl(status).is_zero() {
                return Err(format!("TTL for {} operations must be at least 1 minute", status));
            }
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}
