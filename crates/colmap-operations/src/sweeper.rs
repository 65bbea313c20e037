//! Background TTL sweep

use crate::config::OperationsConfig;
use crate::metrics::{SharedSweepMetrics, SweepMetrics};
use crate::store::OperationStore;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Periodically evicts expired operations from an [`OperationStore`]
///
/// # Examples
///
/// ```no_run
/// use colmap_operations::{OperationStore, OperationsConfig, Sweeper};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let config = OperationsConfig::default();
/// let store = Arc::new(OperationStore::new(config.clone()));
///
/// let handle = Sweeper::new(store, &config).spawn();
/// // ... serve requests ...
/// handle.shutdown().await;
/// # }
/// ```
pub struct Sweeper {
    store: Arc<OperationStore>,
    interval: Duration,
    metrics: SharedSweepMetrics,
}

impl Sweeper {
    /// Create a sweeper using the configured interval
    pub fn new(store: Arc<OperationStore>, config: &OperationsConfig) -> Self {
        Self::with_interval(store, config.sweep_interval())
    }

    /// Create a sweeper with an explicit interval
    pub fn with_interval(store: Arc<OperationStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            metrics: SharedSweepMetrics::default(),
        }
    }

    /// Shared handle to this sweeper's metrics
    pub fn metrics(&self) -> SharedSweepMetrics {
        self.metrics.clone()
    }

    /// Run one sweep now; returns the number of operations evicted
    pub fn sweep_once(&self) -> usize {
        let now = Utc::now();
        let removed = self.store.cleanup_expired_at(now);
        let total: usize = removed.values().sum();
        self.metrics.record_sweep(&removed, now);

        if total > 0 {
            tracing::info!("Sweep evicted {} expired operations", total);
        } else {
            tracing::debug!("Sweep found nothing to evict");
        }
        total
    }

    /// Sweep every interval until `shutdown` is cancelled
    ///
    /// The first sweep happens one interval after the call.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);

        tracing::info!("Operation sweeper started (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, stopping sweeper");
                    break;
                }
            }
        }

        tracing::info!("Sweeper stopped: {}", self.metrics.snapshot().summary());
    }

    /// Run the sweep loop on a background task
    pub fn spawn(self) -> SweeperHandle {
        let shutdown = CancellationToken::new();
        let metrics = self.metrics.clone();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });

        SweeperHandle {
            shutdown,
            task,
            metrics,
        }
    }
}

/// Handle to a spawned [`Sweeper`]
pub struct SweeperHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    metrics: SharedSweepMetrics,
}

impl SweeperHandle {
    /// Current sweep metrics
    pub fn metrics(&self) -> SweepMetrics {
        self.metrics.snapshot()
    }

    /// Shared handle to the sweep metrics
    pub fn shared_metrics(&self) -> SharedSweepMetrics {
        self.metrics.clone()
    }

    /// Stop the sweep loop and wait for it to finish
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("Sweeper task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use crate::test_support::request;

    fn expired_store() -> Arc<OperationStore> {
        let store = Arc::new(OperationStore::default());
        store.create(Operation::new_at(
            "old",
            request(),
            Utc::now() - chrono::Duration::hours(2),
        ));
        store.create(Operation::new("fresh", request()));
        store
    }

    #[test]
    fn test_sweep_once_records_metrics() {
        let store = expired_store();
        let sweeper = Sweeper::new(store.clone(), &OperationsConfig::default());

        assert_eq!(sweeper.sweep_once(), 1);
        assert_eq!(sweeper.sweep_once(), 0);

        let metrics = sweeper.metrics().snapshot();
        assert_eq!(metrics.sweep_count, 2);
        assert_eq!(metrics.total_removed(), 1);
        assert!(store.has("fresh"));
    }

    #[tokio::test]
    async fn test_spawned_sweeper_runs_and_stops() {
        let store = expired_store();
        let handle = Sweeper::with_interval(store.clone(), Duration::from_millis(10)).spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!store.has("old"));
        assert!(handle.metrics().sweep_count >= 1);

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("sweeper should stop promptly");
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let store = expired_store();
        let handle = Sweeper::with_interval(store.clone(), Duration::from_secs(3600)).spawn();

        handle.shutdown().await;
        assert!(store.has("old"));
    }
}
