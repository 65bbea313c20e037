//! In-memory operation store with TTL eviction

use crate::config::OperationsConfig;
use crate::operation::{Operation, OperationPatch, OperationStatus};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Keyed storage for operations, alive for the process lifetime
///
/// Every method takes the lock for the duration of that one call, so each
/// call is atomic on its own. Nothing is held across calls: a read followed
/// by an update can interleave with another caller's update, and the last
/// write wins.
#[derive(Debug, Default)]
pub struct OperationStore {
    operations: RwLock<HashMap<String, Operation>>,
    config: OperationsConfig,
}

impl OperationStore {
    /// Create an empty store with the given retention settings
    pub fn new(config: OperationsConfig) -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Retention settings
    pub fn config(&self) -> &OperationsConfig {
        &self.config
    }

    // Lock poisoning only means another thread panicked mid-call; the map
    // itself is still consistent because every write is a single insert or
    // remove.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Operation>> {
        self.operations.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Operation>> {
        self.operations.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a new operation; the caller guarantees a unique id
    pub fn create(&self, operation: Operation) {
        self.write().insert(operation.id.clone(), operation);
    }

    /// Copy of the operation, if present
    pub fn get(&self, id: &str) -> Option<Operation> {
        self.read().get(id).cloned()
    }

    /// Apply `patch` and return the updated operation, if present
    pub fn update(&self, id: &str, patch: OperationPatch) -> Option<Operation> {
        let mut operations = self.write();
        let operation = operations.get_mut(id)?;
        patch.apply_to(operation);
        Some(operation.clone())
    }

    /// Remove an operation; returns whether it existed
    pub fn delete(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    /// Whether an operation exists
    pub fn has(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Copies of every stored operation, in no particular order
    pub fn get_all(&self) -> Vec<Operation> {
        self.read().values().cloned().collect()
    }

    /// Number of stored operations
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Operation count per status; every status is present, zero included
    pub fn count_by_status(&self) -> BTreeMap<OperationStatus, usize> {
        let mut counts: BTreeMap<OperationStatus, usize> =
            OperationStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for operation in self.read().values() {
            *counts.entry(operation.status).or_insert(0) += 1;
        }
        counts
    }

    /// Remove operations older than the TTL of their status
    ///
    /// Returns the number of operations removed.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now()).values().sum()
    }

    /// Remove operations whose age at `now` exceeds the TTL of their status
    ///
    /// Evicted operations have their cancellation token triggered so a
    /// worker still running for them stops at its next checkpoint. Returns
    /// the number removed per status.
    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> BTreeMap<OperationStatus, usize> {
        let mut removed = BTreeMap::new();
        let mut operations = self.write();

        operations.retain(|id, operation| {
            let ttl = self.config.ttl(operation.status);
            let expired = match now.signed_duration_since(operation.created_at).to_std() {
                Ok(age) => age > ttl,
                // Created in the future relative to `now`
                Err(_) => false,
            };

            if expired {
                debug!("Evicting operation {} ({})", id, operation.status);
                operation.cancel_token.cancel();
                *removed.entry(operation.status).or_insert(0) += 1;
            }
            !expired
        });

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::request;
    use chrono::Duration;

    fn op_created_minutes_ago(id: &str, minutes: i64, now: DateTime<Utc>) -> Operation {
        Operation::new_at(id, request(), now - Duration::minutes(minutes))
    }

    #[test]
    fn test_create_get_has_delete() {
        let store = OperationStore::default();
        store.create(Operation::new("a", request()));

        assert!(store.has("a"));
        assert_eq!(store.get("a").map(|op| op.id), Some("a".to_string()));
        assert!(store.get("missing").is_none());

        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_is_shallow() {
        let store = OperationStore::default();
        store.create(Operation::new("a", request()));

        let updated = store
            .update("a", OperationPatch::status(OperationStatus::Processing, Utc::now()))
            .unwrap();
        assert_eq!(updated.status, OperationStatus::Processing);
        assert!(updated.started_at.is_some());
        assert!(updated.progress.is_none());

        assert!(store.update("missing", OperationPatch::default()).is_none());
    }

    #[test]
    fn test_count_by_status_includes_zeroes() {
        let store = OperationStore::default();
        store.create(Operation::new("a", request()));
        store.create(Operation::new("b", request()));
        store.update("b", OperationPatch::status(OperationStatus::Failed, Utc::now()));

        let counts = store.count_by_status();
        assert_eq!(counts[&OperationStatus::Pending], 1);
        assert_eq!(counts[&OperationStatus::Failed], 1);
        assert_eq!(counts[&OperationStatus::Completed], 0);
        assert_eq!(counts.len(), 5);
    }

    #[test]
    fn test_pending_ttl_eviction() {
        let now = Utc::now();
        let store = OperationStore::default();
        store.create(op_created_minutes_ago("old", 31, now));
        store.create(op_created_minutes_ago("fresh", 10, now));

        let removed = store.cleanup_expired_at(now);

        assert_eq!(removed.get(&OperationStatus::Pending), Some(&1));
        assert!(!store.has("old"));
        assert!(store.has("fresh"));
    }

    #[test]
    fn test_ttl_depends_on_status() {
        let now = Utc::now();
        let store = OperationStore::default();
        store.create(op_created_minutes_ago("done", 120, now));
        store.update("done", OperationPatch::status(OperationStatus::Completed, now));
        store.create(op_created_minutes_ago("stuck", 61, now));
        store.update("stuck", OperationPatch::status(OperationStatus::Processing, now));

        let removed = store.cleanup_expired_at(now);

        assert_eq!(removed.values().sum::<usize>(), 1);
        assert!(store.has("done"));
        assert!(!store.has("stuck"));
    }

    #[test]
    fn test_eviction_cancels_token() {
        let now = Utc::now();
        let store = OperationStore::default();
        let op = op_created_minutes_ago("old", 45, now);
        let token = op.cancel_token.clone();
        store.create(op);

        store.cleanup_expired_at(now);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cleanup_keeps_everything_recent() {
        let store = OperationStore::default();
        store.create(Operation::new("a", request()));
        assert_eq!(store.cleanup_expired(), 0);
        assert_eq!(store.len(), 1);
    }
}
