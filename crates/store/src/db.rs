//! Database and transaction management for the Kinship store.
//!
//! Provides atomic transactions over any number of named buckets. Uses a
//! single-writer model: many read transactions run concurrently against
//! immutable snapshots while at most one write transaction is open.
//!
//! # Example
//!
//! ```no_run
//! use kinship_store::{Database, ReadAccess};
//!
//! let db = Database::open("family.db")?;
//!
//! {
//!     let mut txn = db.write()?;
//!     txn.create_bucket("people")?;
//!     txn.insert("people", b"1", b"ada")?;
//!     txn.commit()?;
//! }
//!
//! {
//!     let txn = db.read()?;
//!     let value = txn.get("people", b"1")?;
//!     assert_eq!(value, Some(&b"ada"[..]));
//! }
//! # Ok::<(), kinship_store::Error>(())
//! ```

use std::{
    collections::btree_map,
    ops::Bound,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use arc_swap::ArcSwap;
use kinship_types::config::StoreConfig;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    backend::{CommitSlot, DatabaseHeader, FileBackend, HEADER_SIZE, InMemoryBackend, StorageBackend},
    error::{Error, Result},
    journal::{self, Frame, Op},
    lock::StoreLock,
    transaction::{BucketMap, CommittedState, SnapshotId, TransactionTracker},
};

/// Longest accepted bucket name in bytes.
pub const MAX_BUCKET_NAME_LEN: usize = 255;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an open database handle.
///
/// Transactions carry the id of the database that created them so typed
/// handles bound to one store can reject transactions from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store:{}", self.0)
    }
}

/// The main database handle.
///
/// Generic over [`StorageBackend`]: use [`Database<FileBackend>`] for production
/// and [`Database<InMemoryBackend>`] for testing.
///
/// # Transaction Isolation
///
/// - Read transactions capture an `Arc` of the committed state at start and
///   hold no locks.
/// - The write transaction works on a copy-on-write clone of that state.
/// - Commit appends a journal frame, flips the dual-slot header, then swaps
///   the committed state pointer so new readers see the change.
pub struct Database<B: StorageBackend> {
    id: StoreId,
    backend: B,
    config: StoreConfig,
    /// Current committed state (atomically swapped on commit).
    committed_state: ArcSwap<CommittedState>,
    tracker: TransactionTracker,
    /// Ensures only one write transaction at a time.
    write_lock: std::sync::Mutex<()>,
    /// In-memory copy of the on-disk header. Only modified under `write_lock`.
    header: Mutex<DatabaseHeader>,
    _file_lock: Option<StoreLock>,
}

impl Database<FileBackend> {
    /// Opens the database at `path`, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] if another handle holds the database.
    /// Returns [`Error::Io`] if the file cannot be opened or read.
    /// Returns [`Error::Corrupted`] if neither commit slot is valid or the
    /// committed journal is damaged.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens or creates the database at `path` with explicit configuration.
    ///
    /// # Errors
    ///
    /// See [`Database::open`].
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let file_lock = StoreLock::acquire(path)?;

        let exists = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        let backend = if exists {
            FileBackend::open(path)?
        } else {
            info!(path = %path.display(), "Creating database");
            FileBackend::create(path)?
        };

        Self::recover(backend, config, Some(file_lock))
    }
}

impl Database<InMemoryBackend> {
    /// Creates an empty in-memory database.
    ///
    /// # Errors
    ///
    /// Infallible in practice; returns `Result` for signature parity.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_backend(InMemoryBackend::new(), StoreConfig::default())
    }
}

impl<B: StorageBackend> Database<B> {
    /// Opens a database on an arbitrary backend, replaying its journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the header or committed journal cannot be read.
    pub fn with_backend(backend: B, config: StoreConfig) -> Result<Self> {
        Self::recover(backend, config, None)
    }

    fn recover(backend: B, config: StoreConfig, file_lock: Option<StoreLock>) -> Result<Self> {
        let mut header = backend.read_header()?;
        let chosen = header.validate_and_choose_slot()?;
        if chosen != header.primary_slot_index() {
            warn!(slot = chosen, "Primary commit slot invalid, recovering from secondary");
            header.flip_primary_slot();
        }
        if header.recovery_required() {
            info!("Previous session did not close cleanly, verifying journal");
        }

        let slot = header.primary_slot().clone();
        let size = backend.size()?;
        if size < slot.log_end {
            return Err(Error::Corrupted {
                reason: format!("file is {size} bytes but committed journal ends at {}", slot.log_end),
            });
        }

        let mut region = vec![0u8; (slot.log_end - slot.log_start) as usize];
        backend.read_at(slot.log_start, &mut region)?;
        let frames = journal::decode_frames(&region)?;

        let mut state = CommittedState::default();
        for frame in &frames {
            for op in &frame.ops {
                state.apply(op);
            }
            state.last_txn_id = frame.txn_id;
        }
        if state.last_txn_id != slot.last_txn_id {
            return Err(Error::Corrupted {
                reason: format!(
                    "journal ends at txn {} but commit slot records txn {}",
                    state.last_txn_id, slot.last_txn_id
                ),
            });
        }

        if size > slot.log_end {
            warn!(bytes = size - slot.log_end, "Discarding uncommitted journal tail");
            backend.truncate(slot.log_end)?;
            backend.sync()?;
        }

        info!(
            buckets = state.buckets.len(),
            frames = frames.len(),
            last_txn_id = state.last_txn_id,
            "Opened database"
        );

        Ok(Self {
            id: StoreId::next(),
            backend,
            config,
            committed_state: ArcSwap::from_pointee(state),
            tracker: TransactionTracker::default(),
            write_lock: std::sync::Mutex::new(()),
            header: Mutex::new(header),
            _file_lock: file_lock,
        })
    }

    /// Returns the identity of this handle.
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Returns the configuration the database was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the storage backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Begins a read-only transaction.
    ///
    /// The transaction sees the state as of the last commit before this call
    /// for its whole lifetime, and never blocks or is blocked by a writer.
    ///
    /// # Errors
    ///
    /// Infallible in practice; returns `Result` for signature parity with
    /// [`Database::write`].
    pub fn read(&self) -> Result<ReadTransaction<'_, B>> {
        // load_full() hands back the Arc directly; no Guard is held.
        let snapshot = self.committed_state.load_full();
        self.tracker.register_read_transaction(snapshot.snapshot_id);
        Ok(ReadTransaction { db: self, snapshot })
    }

    /// Begins a write transaction, blocking until any other writer finishes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Poisoned`] if the write lock is poisoned.
    pub fn write(&self) -> Result<WriteTransaction<'_, B>> {
        let write_guard = self.write_lock.lock().map_err(|_| Error::Poisoned)?;
        let snapshot_id = self.tracker.start_write_transaction();
        let working = (*self.committed_state.load_full()).clone();

        Ok(WriteTransaction {
            db: self,
            snapshot_id,
            working,
            ops: Vec::new(),
            finished: false,
            _write_guard: write_guard,
        })
    }

    /// Rewrites the journal as a single snapshot frame.
    ///
    /// Waits for any active writer to finish first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Poisoned`] if the write lock is poisoned, or
    /// [`Error::Io`] if rewriting fails. The database stays usable after a
    /// failed compaction.
    pub fn compact(&self) -> Result<CompactionStats> {
        let _guard = self.write_lock.lock().map_err(|_| Error::Poisoned)?;
        let state = self.committed_state.load_full();
        self.compact_locked(&state)
    }

    /// Returns database statistics.
    pub fn stats(&self) -> Result<DatabaseStats> {
        let state = self.committed_state.load_full();
        let slot = self.header.lock().primary_slot().clone();
        Ok(DatabaseStats {
            last_txn_id: state.last_txn_id,
            bucket_count: state.buckets.len(),
            entry_count: state.buckets.values().map(|b| b.len()).sum(),
            live_readers: self.tracker.active_reader_count(),
            journal_bytes: slot.log_end - slot.log_start,
            live_bytes: state.live_bytes,
            file_size: self.backend.size()?,
        })
    }

    /// Appends a frame and publishes it through the dual-slot header.
    ///
    /// Caller must hold `write_lock`.
    fn append_frame(&self, frame: &Frame) -> Result<u64> {
        let bytes = frame.encode();
        let mut header = self.header.lock();
        let current = header.primary_slot().clone();

        self.backend.write_at(current.log_end, &bytes)?;
        let next = CommitSlot {
            log_start: current.log_start,
            log_end: current.log_end + bytes.len() as u64,
            last_txn_id: frame.txn_id,
            last_write_timestamp: unix_now(),
            checksum: 0,
        };
        self.publish_slot(&mut header, next, self.config.sync_on_commit)?;
        Ok(bytes.len() as u64)
    }

    /// Runs the dual-slot protocol: write secondary, sync, flip, sync.
    ///
    /// `header` is only updated once every step has succeeded.
    fn publish_slot(&self, header: &mut DatabaseHeader, slot: CommitSlot, sync: bool) -> Result<()> {
        if sync {
            self.backend.sync()?;
        }

        let mut next = header.clone();
        next.set_recovery_required(true);
        next.set_secondary_slot(slot);
        self.backend.write_header(&next)?;
        if sync {
            self.backend.sync()?;
        }

        next.flip_primary_slot();
        self.backend.write_header(&next)?;
        if sync {
            self.backend.sync()?;
        }

        *header = next;
        Ok(())
    }

    fn compact_locked(&self, state: &CommittedState) -> Result<CompactionStats> {
        let frame = Frame { txn_id: state.last_txn_id, ops: state.snapshot_ops() };
        let bytes = frame.encode();
        let len = bytes.len() as u64;

        let mut header = self.header.lock();
        let before = header.primary_slot().clone();
        let timestamp = unix_now();

        // Phase 1: append the snapshot after the live journal and point the
        // header at it. The old frames become garbage.
        let tail_start = before.log_end;
        self.backend.write_at(tail_start, &bytes)?;
        let tail = CommitSlot {
            log_start: tail_start,
            log_end: tail_start + len,
            last_txn_id: state.last_txn_id,
            last_write_timestamp: timestamp,
            checksum: 0,
        };
        self.publish_slot(&mut header, tail, true)?;

        // Phase 2: copy the snapshot into the garbage prefix and cut the file.
        let front = HEADER_SIZE as u64;
        let relocated = front + len <= tail_start;
        if relocated {
            self.backend.write_at(front, &bytes)?;
            let head = CommitSlot {
                log_start: front,
                log_end: front + len,
                last_txn_id: state.last_txn_id,
                last_write_timestamp: timestamp,
                checksum: 0,
            };
            self.publish_slot(&mut header, head, true)?;
            self.backend.truncate(front + len)?;
            self.backend.sync()?;
        }

        let stats = CompactionStats {
            journal_bytes_before: before.log_end - before.log_start,
            journal_bytes_after: len,
            relocated,
        };
        info!(
            before = stats.journal_bytes_before,
            after = stats.journal_bytes_after,
            relocated,
            "Compacted journal"
        );
        Ok(stats)
    }

    /// Compacts when the journal is large and mostly superseded writes.
    ///
    /// Caller must hold `write_lock`. The triggering commit is already
    /// durable, so failures are logged rather than returned.
    fn maybe_compact(&self, state: &CommittedState) {
        let journal_bytes = {
            let header = self.header.lock();
            let slot = header.primary_slot();
            slot.log_end - slot.log_start
        };
        if journal_bytes < self.config.compaction_min_bytes {
            return;
        }
        let garbage = 1.0 - (state.live_bytes as f64 / journal_bytes as f64);
        if garbage < self.config.compaction_garbage_ratio {
            return;
        }
        if let Err(e) = self.compact_locked(state) {
            warn!(error = %e, "Automatic compaction failed");
        }
    }
}

impl<B: StorageBackend> Drop for Database<B> {
    fn drop(&mut self) {
        let mut header = self.header.lock();
        if !header.recovery_required() {
            return;
        }
        let mut clean = header.clone();
        clean.set_recovery_required(false);
        match self.backend.write_header(&clean).and_then(|()| self.backend.sync()) {
            Ok(()) => {
                *header = clean;
                debug!("Closed database cleanly");
            },
            Err(e) => warn!(error = %e, "Failed to clear recovery flag on close"),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Last committed transaction ID.
    pub last_txn_id: u64,
    /// Number of buckets.
    pub bucket_count: usize,
    /// Entries across all buckets.
    pub entry_count: usize,
    /// Active read transactions.
    pub live_readers: usize,
    /// Bytes of committed journal.
    pub journal_bytes: u64,
    /// Estimated journal bytes needed to store only live entries.
    pub live_bytes: u64,
    /// Size of the backing storage.
    pub file_size: u64,
}

/// Result of a journal compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Committed journal size before compaction.
    pub journal_bytes_before: u64,
    /// Committed journal size after compaction.
    pub journal_bytes_after: u64,
    /// Whether the snapshot was moved to the front of the file and the file
    /// shrunk. When the snapshot does not fit in the reclaimed prefix it stays
    /// at the tail until the next compaction.
    pub relocated: bool,
}

/// Iterator over `(key, value)` pairs of a bucket in key order.
pub struct Entries<'a> {
    inner: Option<btree_map::Range<'a, Vec<u8>, Vec<u8>>>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.as_mut()?.next().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

impl DoubleEndedIterator for Entries<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.as_mut()?.next_back().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

/// `BTreeMap::range` panics on inverted bounds; those ranges are empty.
fn is_empty_range(lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
        _ => false,
    }
}

/// Smallest byte string greater than every string starting with `prefix`.
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Read operations shared by read and write transactions.
pub trait ReadAccess {
    /// Identity of the database this transaction belongs to.
    fn store_id(&self) -> StoreId;

    /// The state this transaction reads from.
    fn state(&self) -> &CommittedState;

    /// Whether `name` exists.
    fn has_bucket(&self, name: &str) -> bool {
        self.state().buckets.contains_key(name)
    }

    /// All bucket names in sorted order.
    fn bucket_names(&self) -> Vec<String> {
        self.state().buckets.keys().cloned().collect()
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`] if the bucket does not exist.
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<&[u8]>> {
        let map = bucket_map(self.state(), bucket)?;
        Ok(map.get(key).map(Vec::as_slice))
    }

    /// Whether `key` exists in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`] if the bucket does not exist.
    fn contains(&self, bucket: &str, key: &[u8]) -> Result<bool> {
        Ok(bucket_map(self.state(), bucket)?.contains_key(key))
    }

    /// Number of entries in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`] if the bucket does not exist.
    fn bucket_len(&self, bucket: &str) -> Result<usize> {
        Ok(bucket_map(self.state(), bucket)?.len())
    }

    /// Entries with keys between `lower` and `upper`, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`] if the bucket does not exist.
    fn range(&self, bucket: &str, lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> Result<Entries<'_>> {
        let map = bucket_map(self.state(), bucket)?;
        if is_empty_range(lower, upper) {
            return Ok(Entries { inner: None });
        }
        Ok(Entries { inner: Some(map.range::<[u8], _>((lower, upper))) })
    }

    /// Entries whose key starts with `prefix`, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`] if the bucket does not exist.
    fn prefix(&self, bucket: &str, prefix: &[u8]) -> Result<Entries<'_>> {
        match prefix_successor(prefix) {
            Some(end) => self.range(bucket, Bound::Included(prefix), Bound::Excluded(end.as_slice())),
            None => self.range(bucket, Bound::Included(prefix), Bound::Unbounded),
        }
    }

    /// All entries of `bucket` in key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`] if the bucket does not exist.
    fn iter(&self, bucket: &str) -> Result<Entries<'_>> {
        self.range(bucket, Bound::Unbounded, Bound::Unbounded)
    }

    /// Entry with the largest key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`] if the bucket does not exist.
    fn last(&self, bucket: &str) -> Result<Option<(&[u8], &[u8])>> {
        Ok(self.iter(bucket)?.next_back())
    }

    /// Entry with the smallest key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`] if the bucket does not exist.
    fn first(&self, bucket: &str) -> Result<Option<(&[u8], &[u8])>> {
        Ok(self.iter(bucket)?.next())
    }
}

fn bucket_map<'a>(state: &'a CommittedState, bucket: &str) -> Result<&'a BucketMap> {
    state
        .buckets
        .get(bucket)
        .map(|map| map.as_ref())
        .ok_or_else(|| Error::BucketNotFound { name: bucket.to_string() })
}

/// A read-only transaction.
///
/// Captures the committed state at creation and holds no locks.
pub struct ReadTransaction<'db, B: StorageBackend> {
    db: &'db Database<B>,
    snapshot: Arc<CommittedState>,
}

impl<B: StorageBackend> ReadTransaction<'_, B> {
    /// Snapshot this transaction reads from.
    pub fn snapshot_id(&self) -> SnapshotId {
        self.snapshot.snapshot_id
    }
}

impl<B: StorageBackend> ReadAccess for ReadTransaction<'_, B> {
    fn store_id(&self) -> StoreId {
        self.db.id
    }

    fn state(&self) -> &CommittedState {
        &self.snapshot
    }
}

impl<B: StorageBackend> Drop for ReadTransaction<'_, B> {
    fn drop(&mut self) {
        self.db.tracker.unregister_read_transaction(self.snapshot.snapshot_id);
    }
}

/// A write transaction.
///
/// Changes are buffered in a private copy of the state until
/// [`commit`](WriteTransaction::commit). Dropping the transaction without
/// committing discards every change.
///
/// # Invariants
///
/// The database `write_lock` is held for the lifetime of this value, so at
/// most one `WriteTransaction` exists at a time. After `commit` or `abort`
/// further mutations fail with [`Error::TransactionFinished`].
pub struct WriteTransaction<'db, B: StorageBackend> {
    db: &'db Database<B>,
    snapshot_id: SnapshotId,
    /// Private state including this transaction's changes.
    working: CommittedState,
    /// Changes in the order they were made, replayed by recovery.
    ops: Vec<Op>,
    finished: bool,
    _write_guard: std::sync::MutexGuard<'db, ()>,
}

impl<B: StorageBackend> WriteTransaction<'_, B> {
    fn record(&mut self, op: Op) -> Result<()> {
        if self.finished {
            return Err(Error::TransactionFinished);
        }
        self.working.apply(&op);
        self.ops.push(op);
        Ok(())
    }

    fn require_bucket(&self, bucket: &str) -> Result<()> {
        if self.finished {
            return Err(Error::TransactionFinished);
        }
        if self.working.buckets.contains_key(bucket) {
            Ok(())
        } else {
            Err(Error::BucketNotFound { name: bucket.to_string() })
        }
    }

    /// Creates `name` if it does not exist. Returns true if it was created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBucketName`] for empty or overlong names.
    pub fn create_bucket(&mut self, name: &str) -> Result<bool> {
        if name.is_empty() || name.len() > MAX_BUCKET_NAME_LEN {
            return Err(Error::InvalidBucketName { name: name.to_string() });
        }
        if self.working.buckets.contains_key(name) {
            return Ok(false);
        }
        self.record(Op::CreateBucket { name: name.to_string() })?;
        Ok(true)
    }

    /// Drops `name` and all its entries. Returns true if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionFinished`] after commit or abort.
    pub fn drop_bucket(&mut self, name: &str) -> Result<bool> {
        if !self.working.buckets.contains_key(name) {
            return Ok(false);
        }
        self.record(Op::DropBucket { name: name.to_string() })?;
        Ok(true)
    }

    /// Inserts or overwrites an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`] if the bucket does not exist.
    pub fn insert(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.require_bucket(bucket)?;
        self.record(Op::Put { bucket: bucket.to_string(), key: key.to_vec(), value: value.to_vec() })
    }

    /// Removes an entry. Returns true if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`] if the bucket does not exist.
    pub fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<bool> {
        self.require_bucket(bucket)?;
        if !self.working.buckets.get(bucket).is_some_and(|map| map.contains_key(key)) {
            return Ok(false);
        }
        self.record(Op::Delete { bucket: bucket.to_string(), key: key.to_vec() })?;
        Ok(true)
    }

    /// Number of changes buffered so far.
    pub fn pending_ops(&self) -> usize {
        self.ops.len()
    }

    /// Whether the transaction was committed or aborted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Durably commits all buffered changes.
    ///
    /// On error nothing becomes visible to other transactions and the
    /// transaction is finished; the caller may retry with a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionFinished`] if already committed or aborted.
    /// Returns [`Error::Io`] if the journal append or header update fails.
    pub fn commit(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::TransactionFinished);
        }
        self.finished = true;
        self.db.tracker.end_write_transaction(self.snapshot_id);

        if self.ops.is_empty() {
            return Ok(());
        }

        let txn_id = self.working.last_txn_id + 1;
        let frame = Frame { txn_id, ops: std::mem::take(&mut self.ops) };
        let bytes = self.db.append_frame(&frame)?;

        self.working.last_txn_id = txn_id;
        self.working.snapshot_id = self.snapshot_id;
        let state = Arc::new(self.working.clone());
        // New readers see the commit from here on.
        self.db.committed_state.store(Arc::clone(&state));
        debug!(txn_id, ops = frame.ops.len(), bytes, "Committed transaction");

        self.db.maybe_compact(&state);
        Ok(())
    }

    /// Discards all buffered changes.
    pub fn abort(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.ops.clear();
        self.db.tracker.end_write_transaction(self.snapshot_id);
    }
}

/// Mutations available on a write transaction.
///
/// Object safe, so layers above the store can hold `&mut dyn WriteAccess`
/// without naming the backend type.
pub trait WriteAccess: ReadAccess {
    /// See [`WriteTransaction::create_bucket`].
    fn create_bucket(&mut self, name: &str) -> Result<bool>;

    /// See [`WriteTransaction::drop_bucket`].
    fn drop_bucket(&mut self, name: &str) -> Result<bool>;

    /// See [`WriteTransaction::insert`].
    fn insert(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// See [`WriteTransaction::delete`].
    fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<bool>;
}

impl<B: StorageBackend> WriteAccess for WriteTransaction<'_, B> {
    fn create_bucket(&mut self, name: &str) -> Result<bool> {
        WriteTransaction::create_bucket(self, name)
    }

    fn drop_bucket(&mut self, name: &str) -> Result<bool> {
        WriteTransaction::drop_bucket(self, name)
    }

    fn insert(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        WriteTransaction::insert(self, bucket, key, value)
    }

    fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<bool> {
        WriteTransaction::delete(self, bucket, key)
    }
}

impl<B: StorageBackend> ReadAccess for WriteTransaction<'_, B> {
    fn store_id(&self) -> StoreId {
        self.db.id
    }

    fn state(&self) -> &CommittedState {
        &self.working
    }
}

impl<B: StorageBackend> Drop for WriteTransaction<'_, B> {
    fn drop(&mut self) {
        if !self.finished {
            if !self.ops.is_empty() {
                debug!(ops = self.ops.len(), "Rolling back uncommitted write transaction");
            }
            self.abort();
        }
    }
}
