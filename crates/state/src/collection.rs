//! Record collections: a bucket bundled with the indexes derived from it.
//!
//! A [`Collection`] owns a record bucket and a registration table of index
//! updaters. Writing through [`Collection::upsert`] stores the record and
//! re-derives every registered index in the same transaction, so a caller
//! cannot update one side and forget the other. [`Collection::reindex`]
//! rebuilds all indexes from a bucket scan.

use kinship_store::{ReadAccess, WriteAccess};
use kinship_types::{IntKey, Key, Pack};
use tracing::{debug, info, warn};

use crate::{
    bucket::Bucket,
    error::Result,
    index::{Index, Window},
};

/// A record stored in a [`Collection`].
pub trait Record: Pack + Clone + Send + Sync + 'static {
    /// Primary key type, allocated from the record bucket.
    type Id: IntKey + Send + Sync + 'static;

    /// Current primary key; an unassigned id reads as zero.
    fn id(&self) -> Self::Id;

    /// Assigns the primary key.
    fn set_id(&mut self, id: Self::Id);
}

type SyncFn<R> = Box<dyn Fn(&mut dyn WriteAccess, &R) -> Result<()> + Send + Sync>;
type ClearFn<R> = Box<dyn Fn(&mut dyn WriteAccess, &<R as Record>::Id) -> Result<()> + Send + Sync>;
type ResetFn = Box<dyn Fn(&mut dyn WriteAccess) -> Result<()> + Send + Sync>;

struct Indexer<R: Record> {
    name: String,
    sync: SyncFn<R>,
    clear: ClearFn<R>,
    reset: ResetFn,
}

/// A record bucket plus its derived indexes.
pub struct Collection<R: Record> {
    bucket: Bucket<R::Id, R>,
    indexers: Vec<Indexer<R>>,
}

impl<R: Record> std::fmt::Debug for Collection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indexes: Vec<&str> = self.indexers.iter().map(|i| i.name.as_str()).collect();
        f.debug_struct("Collection").field("bucket", &self.bucket).field("indexes", &indexes).finish()
    }
}

impl<R: Record> Collection<R> {
    /// Creates a collection over `bucket` with no indexes.
    pub fn new(bucket: Bucket<R::Id, R>) -> Self {
        Self { bucket, indexers: Vec::new() }
    }

    /// The record bucket.
    pub fn bucket(&self) -> &Bucket<R::Id, R> {
        &self.bucket
    }

    /// Registers an index whose entries for a record are `terms(record)`.
    #[must_use]
    pub fn index_by<T, P, F>(mut self, index: &Index<T, P, R::Id>, terms: F) -> Self
    where
        T: Key + 'static,
        P: Key + 'static,
        F: Fn(&R) -> Vec<(T, P)> + Send + Sync + 'static,
    {
        let (for_sync, for_clear, for_reset) = (index.clone(), index.clone(), index.clone());
        self.indexers.push(Indexer {
            name: index.name().to_string(),
            sync: Box::new(move |tx, record| for_sync.set_target_terms(tx, &record.id(), &terms(record))),
            clear: Box::new(move |tx, id| for_clear.clear_target(tx, id)),
            reset: Box::new(move |tx| for_reset.truncate(tx)),
        });
        self
    }

    /// Registers an index holding at most one entry per record.
    ///
    /// `term` returning `None` removes the record from the index.
    #[must_use]
    pub fn index_single<T, P, F>(mut self, index: &Index<T, P, R::Id>, term: F) -> Self
    where
        T: Key + 'static,
        P: Key + 'static,
        F: Fn(&R) -> Option<(T, P)> + Send + Sync + 'static,
    {
        let (for_sync, for_clear, for_reset) = (index.clone(), index.clone(), index.clone());
        self.indexers.push(Indexer {
            name: index.name().to_string(),
            sync: Box::new(move |tx, record| match term(record) {
                Some((term, priority)) => {
                    for_sync.set_target_single_term_ext(tx, &record.id(), &priority, &term)
                },
                None => for_sync.clear_target(tx, &record.id()),
            }),
            clear: Box::new(move |tx, id| for_clear.clear_target(tx, id)),
            reset: Box::new(move |tx| for_reset.truncate(tx)),
        });
        self
    }

    /// Writes `record` and re-derives its index entries.
    ///
    /// A record with an unassigned id gets the next id from the bucket; the
    /// assigned id is written back into `record` and returned.
    ///
    /// # Errors
    ///
    /// Returns any bucket or index error; the caller's transaction should
    /// then be dropped without committing.
    pub fn upsert(&self, tx: &mut dyn WriteAccess, record: &mut R) -> Result<R::Id> {
        if record.id().as_u64() == 0 {
            let id = self.bucket.next_int_id(tx)?;
            record.set_id(id);
        }
        let id = record.id();
        self.bucket.write(tx, &id, record)?;
        for indexer in &self.indexers {
            (indexer.sync)(tx, record)?;
        }
        Ok(id)
    }

    /// Deletes the record under `id` and all of its index entries.
    ///
    /// Returns the removed record, or `None` if it did not exist. Index
    /// entries are cleared either way.
    ///
    /// # Errors
    ///
    /// Returns any bucket or index error.
    pub fn remove(&self, tx: &mut dyn WriteAccess, id: &R::Id) -> Result<Option<R>> {
        let existing = self.bucket.read(&*tx, id)?;
        for indexer in &self.indexers {
            (indexer.clear)(tx, id)?;
        }
        self.bucket.delete(tx, id)?;
        Ok(existing)
    }

    /// Returns the record under `id`.
    ///
    /// # Errors
    ///
    /// See [`Bucket::read`].
    pub fn get<T: ReadAccess + ?Sized>(&self, tx: &T, id: &R::Id) -> Result<Option<R>> {
        self.bucket.read(tx, id)
    }

    /// Every record in id order.
    ///
    /// # Errors
    ///
    /// See [`Bucket::iterate_all`].
    pub fn all<T: ReadAccess + ?Sized>(&self, tx: &T) -> Result<Vec<R>> {
        self.bucket.values(tx)
    }

    /// Records reached through `index` for `term`, in index order.
    ///
    /// Index entries whose record no longer exists are skipped.
    ///
    /// # Errors
    ///
    /// Returns any index or bucket error.
    pub fn lookup<T, P, X>(
        &self,
        tx: &X,
        index: &Index<T, P, R::Id>,
        term: &T,
        window: Window,
    ) -> Result<Vec<R>>
    where
        T: Key,
        P: Key,
        X: ReadAccess + ?Sized,
    {
        let ids = index.read_term_targets(tx, term, window)?;
        let records = self.bucket.read_many(tx, &ids)?;
        if records.len() < ids.len() {
            warn!(
                index = index.name(),
                stale = ids.len() - records.len(),
                "Index names records that no longer exist; reindex to repair"
            );
        }
        Ok(records)
    }

    /// Rebuilds every registered index from a scan of the bucket.
    ///
    /// Returns the number of records indexed.
    ///
    /// # Errors
    ///
    /// Returns any bucket or index error.
    pub fn reindex(&self, tx: &mut dyn WriteAccess) -> Result<usize> {
        for indexer in &self.indexers {
            (indexer.reset)(tx)?;
        }
        let records = self.bucket.values(&*tx)?;
        for record in &records {
            for indexer in &self.indexers {
                (indexer.sync)(tx, record)?;
            }
        }
        if self.indexers.is_empty() {
            debug!(bucket = self.bucket.name(), "No indexes to rebuild");
        } else {
            info!(
                bucket = self.bucket.name(),
                records = records.len(),
                indexes = self.indexers.len(),
                "Rebuilt indexes"
            );
        }
        Ok(records.len())
    }
}
