//! kinship-store: an embedded transactional key-value store for Kinship.
//!
//! kinship-store keeps every bucket in memory and persists changes to an
//! append-only journal behind a dual-slot header:
//!
//! - **Named buckets**: ordered byte-keyed maps created and dropped at runtime
//! - **Single writer**: one write transaction at a time, many concurrent readers
//! - **Snapshot reads**: readers see the state as of their start, lock-free
//! - **Checksummed frames**: every journal frame carries an XXH3-64 checksum
//! - **Dual-slot commit**: a single god-byte flip makes a commit durable
//! - **Compaction**: the journal is rewritten as one snapshot frame when it is
//!   mostly superseded writes
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Database API                  │
//! │   (open, read, write, compact, stats)       │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │             Transaction Layer                │
//! │  (ReadTxn: Arc snapshot, WriteTxn: COW+ops) │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │              Journal Layer                   │
//! │   (frames, checksums, replay, snapshot)     │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │            Storage Backend                   │
//! │      (FileBackend / InMemoryBackend)        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use kinship_store::{Database, ReadAccess};
//!
//! // Create an in-memory database
//! let db = Database::open_in_memory()?;
//!
//! // Write transaction
//! let mut txn = db.write()?;
//! txn.create_bucket("users")?;
//! txn.insert("users", b"key", b"value")?;
//! txn.commit()?;
//!
//! // Read transaction
//! let txn = db.read()?;
//! let value = txn.get("users", b"key")?;
//! # Ok::<(), kinship_store::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod db;
pub mod error;
pub mod journal;
pub mod lock;
pub mod transaction;

// Re-export commonly used types
pub use backend::{DatabaseHeader, FileBackend, HEADER_SIZE, InMemoryBackend, MAGIC, StorageBackend};
pub use db::{
    CompactionStats, Database, DatabaseStats, Entries, MAX_BUCKET_NAME_LEN, ReadAccess, ReadTransaction, StoreId,
    WriteAccess, WriteTransaction,
};
pub use error::{Error, Result};
pub use lock::StoreLock;
pub use transaction::SnapshotId;

/// Store format version.
pub const VERSION: u16 = backend::FORMAT_VERSION;
