//! Store handle: lifecycle, declarations and transaction scopes.
//!
//! [`Store`] wraps a [`Database`] with the schema of declared buckets:
//! - `open` / `open_in_memory` constructors
//! - `declare_bucket` / `declare_index` returning typed handles
//! - `init` to provision declared buckets
//! - `with_read_tx` / `with_write_tx` closure scopes

use std::{path::Path, sync::Arc};

use kinship_store::{
    Database, FileBackend, InMemoryBackend, ReadTransaction, StorageBackend, StoreId, WriteTransaction,
};
use kinship_types::{Key, Pack, config::StoreConfig};
use parking_lot::Mutex;

use crate::{
    bucket::Bucket,
    error::{Result, StateError},
    index::Index,
    schema::{BucketRole, INDEX_TARGETS_SUFFIX, Schema},
};

/// A store plus the declarations made against it.
///
/// Cloning shares the underlying database and schema.
pub struct Store<B: StorageBackend = FileBackend> {
    db: Arc<Database<B>>,
    schema: Arc<Mutex<Schema>>,
}

impl<B: StorageBackend> Clone for Store<B> {
    fn clone(&self) -> Self {
        Self { db: Arc::clone(&self.db), schema: Arc::clone(&self.schema) }
    }
}

impl Store<FileBackend> {
    /// Opens or creates the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Store`] if the file is inaccessible, locked by
    /// another handle, or corrupted.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        Ok(Self::from_database(Database::open_with_config(path, config)?))
    }
}

impl Store<InMemoryBackend> {
    /// Creates an empty in-memory store.
    ///
    /// # Errors
    ///
    /// Infallible in practice; returns `Result` for signature parity.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }
}

impl<B: StorageBackend> Store<B> {
    /// Wraps an already open database.
    pub fn from_database(db: Database<B>) -> Self {
        Self { db: Arc::new(db), schema: Arc::new(Mutex::new(Schema::new())) }
    }

    /// Identity of the underlying database.
    pub fn id(&self) -> StoreId {
        self.db.id()
    }

    /// The underlying database.
    pub fn database(&self) -> &Arc<Database<B>> {
        &self.db
    }

    /// Declares a record bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::DuplicateDeclaration`] if `name` is already
    /// declared on this store.
    pub fn declare_bucket<K: Key, V: Pack + Clone>(&self, name: &str) -> Result<Bucket<K, V>> {
        self.schema.lock().declare(name, BucketRole::Records { key: K::KIND })?;
        Ok(Bucket::new(name, self.id()))
    }

    /// Declares an index and its reverse bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::DuplicateDeclaration`] if either bucket name is
    /// already declared on this store.
    pub fn declare_index<T: Key, P: Key, G: Key>(&self, name: &str) -> Result<Index<T, P, G>> {
        let targets = format!("{name}{INDEX_TARGETS_SUFFIX}");
        let mut schema = self.schema.lock();
        if schema.contains(&targets) {
            return Err(StateError::DuplicateDeclaration { name: targets });
        }
        schema.declare(name, BucketRole::IndexTerms)?;
        schema.declare(&targets, BucketRole::IndexTargets)?;
        Ok(Index::new(name, &targets, self.id()))
    }

    /// Creates every declared bucket that is missing, in one transaction.
    ///
    /// Returns the number of buckets created.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Store`] if the provisioning commit fails.
    pub fn init(&self) -> Result<usize> {
        let mut tx = self.db.write()?;
        let created = self.schema.lock().init(&mut tx)?;
        tx.commit()?;
        Ok(created)
    }

    /// Runs the schema's read-only checks and returns undeclared buckets.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Store`] if a read transaction cannot begin.
    pub fn undeclared_buckets(&self) -> Result<Vec<String>> {
        let tx = self.db.read()?;
        Ok(self.schema.lock().undeclared(&tx))
    }

    /// Runs `f` in a read transaction.
    ///
    /// The transaction sees a fixed snapshot taken when it began.
    ///
    /// # Errors
    ///
    /// Propagates any error from `f`, or [`StateError::Store`] if the
    /// transaction cannot begin.
    pub fn with_read_tx<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<StateError>,
        F: FnOnce(&ReadTransaction<'_, B>) -> std::result::Result<T, E>,
    {
        let tx = self.db.read().map_err(|e| E::from(StateError::from(e)))?;
        f(&tx)
    }

    /// Runs `f` in a write transaction.
    ///
    /// `f` must call [`commit`] for its writes to persist; returning without
    /// committing (including returning an error) rolls everything back.
    ///
    /// # Errors
    ///
    /// Propagates any error from `f`, or [`StateError::Store`] if the
    /// transaction cannot begin.
    pub fn with_write_tx<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<StateError>,
        F: FnOnce(&mut WriteTransaction<'_, B>) -> std::result::Result<T, E>,
    {
        let mut tx = self.db.write().map_err(|e| E::from(StateError::from(e)))?;
        f(&mut tx)
    }
}

/// Commits `tx`, durably persisting everything written through it.
///
/// # Errors
///
/// Returns [`StateError::Store`] if the commit fails; nothing is persisted.
pub fn commit<B: StorageBackend>(tx: &mut WriteTransaction<'_, B>) -> Result<()> {
    tx.commit()?;
    Ok(())
}
