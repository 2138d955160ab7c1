//! Typed persistence for Kinship.
//!
//! This crate sits between the raw transactional store (`kinship-store`) and
//! the family domain (`kinship-family`), providing:
//!
//! - Typed buckets with order-preserving keys and versioned record values
//! - A per-bucket ID allocator that never reuses deleted ids
//! - Secondary indexes mapping a term to priority-ordered targets
//! - Record collections that bundle a record write with its index updates
//! - Schema declarations with idempotent provisioning
//! - Named one-time processes for data migrations
//!
//! ```text
//! Store ──declare_bucket──▶ Bucket<K, V>
//!   │    ──declare_index───▶ Index<T, P, G>
//!   │                         ╲
//!   │                          Collection<R> (upsert / remove / reindex)
//!   └── with_read_tx / with_write_tx ──▶ kinship_store transactions
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod collection;
mod engine;
mod error;
mod index;
mod process;
mod schema;

pub use bucket::Bucket;
pub use collection::{Collection, Record};
pub use engine::{Store, commit};
pub use error::{Result, StateError};
pub use index::{Direction, Index, Window};
pub use process::ProcessRecord;
pub use schema::{BucketRole, PROCESS_BUCKET, Schema};
