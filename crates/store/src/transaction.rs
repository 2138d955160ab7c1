//! Snapshot state and transaction tracking.
//!
//! - `SnapshotId`: identifier of a committed database state
//! - `CommittedState`: the bucket maps visible at a snapshot
//! - `TransactionTracker`: live reader and writer bookkeeping
//!
//! Bucket maps are held behind `Arc`, so taking a snapshot is a handful of
//! reference-count bumps. A write transaction clones the state and
//! copy-on-writes only the buckets it touches via `Arc::make_mut`.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;

use crate::journal::Op;

/// Ordered entries of one bucket.
pub type BucketMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Approximate per-entry journal overhead (tag, lengths).
const ENTRY_OVERHEAD: u64 = 10;

/// Unique identifier for a committed database snapshot.
///
/// Each successful commit produces a new snapshot ID. Read transactions
/// capture the current snapshot ID to ensure they see a consistent view.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct SnapshotId(pub u64);

impl SnapshotId {
    /// Get the raw u64 value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The committed state that readers snapshot.
///
/// This is what gets atomically swapped on commit.
#[derive(Clone, Debug, Default)]
pub struct CommittedState {
    /// The snapshot ID for this committed state.
    pub snapshot_id: SnapshotId,
    /// Last transaction ID written to the journal.
    pub last_txn_id: u64,
    /// Buckets by name.
    pub buckets: BTreeMap<String, Arc<BucketMap>>,
    /// Estimated journal bytes needed to rewrite the live data.
    pub live_bytes: u64,
}

fn entry_cost(bucket: &str, key: &[u8], value: &[u8]) -> u64 {
    ENTRY_OVERHEAD + (bucket.len() + key.len() + value.len()) as u64
}

impl CommittedState {
    /// Applies one journal op.
    ///
    /// Ops against a missing bucket are ignored here; the write path rejects
    /// them before they are recorded.
    pub fn apply(&mut self, op: &Op) {
        match op {
            Op::CreateBucket { name } => {
                self.buckets.entry(name.clone()).or_default();
                self.live_bytes += ENTRY_OVERHEAD + name.len() as u64;
            },
            Op::DropBucket { name } => {
                if let Some(map) = self.buckets.remove(name) {
                    let freed: u64 = map.iter().map(|(k, v)| entry_cost(name, k, v)).sum();
                    self.live_bytes = self
                        .live_bytes
                        .saturating_sub(freed + ENTRY_OVERHEAD + name.len() as u64);
                }
            },
            Op::Put { bucket, key, value } => {
                if let Some(map) = self.buckets.get_mut(bucket) {
                    let old = Arc::make_mut(map).insert(key.clone(), value.clone());
                    if let Some(old) = old {
                        self.live_bytes =
                            self.live_bytes.saturating_sub(entry_cost(bucket, key, &old));
                    }
                    self.live_bytes += entry_cost(bucket, key, value);
                }
            },
            Op::Delete { bucket, key } => {
                if let Some(map) = self.buckets.get_mut(bucket) {
                    if let Some(old) = Arc::make_mut(map).remove(key) {
                        self.live_bytes =
                            self.live_bytes.saturating_sub(entry_cost(bucket, key, &old));
                    }
                }
            },
        }
    }

    /// Builds the ops that recreate this state from nothing.
    pub fn snapshot_ops(&self) -> Vec<Op> {
        let mut ops = Vec::new();
        for (name, map) in &self.buckets {
            ops.push(Op::CreateBucket { name: name.clone() });
            for (key, value) in map.iter() {
                ops.push(Op::Put { bucket: name.clone(), key: key.clone(), value: value.clone() });
            }
        }
        ops
    }
}

/// Tracks active transactions.
///
/// Read transactions register the snapshot they captured; the tracker keeps
/// a reference count per snapshot so the store can report how many readers
/// are pinned to old states.
pub struct TransactionTracker {
    state: Mutex<TrackerState>,
    /// Next snapshot ID to assign.
    next_snapshot_id: AtomicU64,
}

struct TrackerState {
    live_read_transactions: BTreeMap<SnapshotId, u64>,
    live_write_transaction: Option<SnapshotId>,
}

impl TransactionTracker {
    /// Create a new transaction tracker.
    pub fn new(initial_snapshot_id: SnapshotId) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                live_read_transactions: BTreeMap::new(),
                live_write_transaction: None,
            }),
            next_snapshot_id: AtomicU64::new(initial_snapshot_id.0),
        }
    }

    /// Register a new read transaction at the given snapshot.
    pub fn register_read_transaction(&self, snapshot_id: SnapshotId) {
        let mut state = self.state.lock();
        *state.live_read_transactions.entry(snapshot_id).or_insert(0) += 1;
    }

    /// Unregister a read transaction.
    pub fn unregister_read_transaction(&self, snapshot_id: SnapshotId) {
        let mut state = self.state.lock();
        if let Some(count) = state.live_read_transactions.get_mut(&snapshot_id) {
            *count -= 1;
            if *count == 0 {
                state.live_read_transactions.remove(&snapshot_id);
            }
        }
    }

    /// Start a write transaction and return its snapshot ID.
    ///
    /// Exclusivity is enforced by the database write lock.
    pub fn start_write_transaction(&self) -> SnapshotId {
        let snapshot_id = SnapshotId(self.next_snapshot_id.fetch_add(1, Ordering::SeqCst));
        self.state.lock().live_write_transaction = Some(snapshot_id);
        snapshot_id
    }

    /// End the current write transaction.
    pub fn end_write_transaction(&self, snapshot_id: SnapshotId) {
        let mut state = self.state.lock();
        if state.live_write_transaction == Some(snapshot_id) {
            state.live_write_transaction = None;
        }
    }

    /// Oldest snapshot still pinned by a reader.
    pub fn oldest_live_read_transaction(&self) -> Option<SnapshotId> {
        self.state.lock().live_read_transactions.keys().next().copied()
    }

    /// Count of active read transactions.
    pub fn active_reader_count(&self) -> usize {
        self.state.lock().live_read_transactions.values().sum::<u64>() as usize
    }

    /// Whether a write transaction is in progress.
    pub fn has_active_writer(&self) -> bool {
        self.state.lock().live_write_transaction.is_some()
    }
}

impl Default for TransactionTracker {
    fn default() -> Self {
        Self::new(SnapshotId(1))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn put(bucket: &str, key: &[u8], value: &[u8]) -> Op {
        Op::Put { bucket: bucket.to_string(), key: key.to_vec(), value: value.to_vec() }
    }

    #[test]
    fn test_reader_refcount_per_snapshot() {
        let tracker = TransactionTracker::default();
        tracker.register_read_transaction(SnapshotId(2));
        tracker.register_read_transaction(SnapshotId(2));
        tracker.register_read_transaction(SnapshotId(5));
        assert_eq!(tracker.active_reader_count(), 3);
        assert_eq!(tracker.oldest_live_read_transaction(), Some(SnapshotId(2)));

        tracker.unregister_read_transaction(SnapshotId(2));
        tracker.unregister_read_transaction(SnapshotId(2));
        assert_eq!(tracker.oldest_live_read_transaction(), Some(SnapshotId(5)));
    }

    #[test]
    fn test_write_snapshot_ids_increase() {
        let tracker = TransactionTracker::default();
        let first = tracker.start_write_transaction();
        assert!(tracker.has_active_writer());
        tracker.end_write_transaction(first);
        let second = tracker.start_write_transaction();
        assert!(second > first);
    }

    #[test]
    fn test_apply_is_copy_on_write() {
        let mut state = CommittedState::default();
        state.apply(&Op::CreateBucket { name: "people".to_string() });
        state.apply(&put("people", b"1", b"ada"));
        let snapshot = state.clone();

        state.apply(&put("people", b"2", b"grace"));
        assert_eq!(snapshot.buckets["people"].len(), 1);
        assert_eq!(state.buckets["people"].len(), 2);
    }

    #[test]
    fn test_live_bytes_tracks_overwrites_and_deletes() {
        let mut state = CommittedState::default();
        state.apply(&Op::CreateBucket { name: "b".to_string() });
        let base = state.live_bytes;

        state.apply(&put("b", b"k", b"1234"));
        let with_entry = state.live_bytes;
        state.apply(&put("b", b"k", b"1234"));
        assert_eq!(state.live_bytes, with_entry);

        state.apply(&Op::Delete { bucket: "b".to_string(), key: b"k".to_vec() });
        assert_eq!(state.live_bytes, base);

        state.apply(&Op::DropBucket { name: "b".to_string() });
        assert_eq!(state.live_bytes, 0);
    }

    #[test]
    fn test_snapshot_ops_rebuild_state() {
        let mut state = CommittedState::default();
        state.apply(&Op::CreateBucket { name: "a".to_string() });
        state.apply(&Op::CreateBucket { name: "b".to_string() });
        state.apply(&put("a", b"x", b"1"));
        state.apply(&put("b", b"y", b"2"));

        let mut rebuilt = CommittedState::default();
        for op in state.snapshot_ops() {
            rebuilt.apply(&op);
        }
        assert_eq!(rebuilt.buckets, state.buckets);
        assert_eq!(rebuilt.live_bytes, state.live_bytes);
    }
}
