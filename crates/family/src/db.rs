//! The family database: every bucket, index and collection in one handle.
//!
//! [`FamilyDb`] declares the persisted layout, provisions it, and applies
//! pending one-time processes when opened. Queries and mutations live in
//! [`crate::queries`] and [`crate::mutations`]; both operate inside a
//! transaction supplied by the caller.

use std::path::Path;

use chrono::{DateTime, Utc};
use kinship_state::{Bucket, Collection, Index, Store, StateError, commit};
use kinship_store::{FileBackend, InMemoryBackend, ReadTransaction, StorageBackend, WriteAccess, WriteTransaction};
use kinship_types::{
    FamilyId, HeightId, ImageId, MilestoneId, PersonId, PostId, UserId, WeightId, config::StoreConfig,
};
use tracing::info;

use crate::{
    error::Result,
    records::{Family, Height, Image, Milestone, Person, Post, TokenGrant, User, Weight},
};

/// Stable bucket and index names. Renaming one without a migration orphans
/// its data.
pub mod names {
    /// Accounts by id.
    pub const USERS: &str = "users";
    /// Password hashes by user id.
    pub const PASSWORDS: &str = "password";
    /// User id by normalized email.
    pub const EMAILS: &str = "email";
    /// Password reset grants by token.
    pub const RESET_TOKENS: &str = "password-token";
    /// Refresh grants by token.
    pub const REFRESH_TOKENS: &str = "login-token";
    /// Families by id.
    pub const FAMILIES: &str = "family";
    /// Owning user → family.
    pub const FAMILIES_BY_OWNER: &str = "family_by_owner";
    /// People by id.
    pub const PEOPLE: &str = "people";
    /// Family → person.
    pub const PEOPLE_BY_FAMILY: &str = "people_by_family";
    /// Image metadata by id.
    pub const IMAGES: &str = "image";
    /// Family → image.
    pub const IMAGES_BY_FAMILY: &str = "images_by_family";
    /// Posts by id.
    pub const POSTS: &str = "posts";
    /// Person → post, by entry date.
    pub const POSTS_BY_PERSON: &str = "posts_by";
    /// Heights by id.
    pub const HEIGHTS: &str = "personHeight";
    /// Person → height, by date.
    pub const HEIGHTS_BY_PERSON: &str = "heights_by";
    /// Weights by id.
    pub const WEIGHTS: &str = "personWeight";
    /// Person → weight, by date.
    pub const WEIGHTS_BY_PERSON: &str = "weights_by";
    /// Milestones by id.
    pub const MILESTONES: &str = "personMilestones";
    /// Person → milestone, by date.
    pub const MILESTONES_BY_PERSON: &str = "milestones_by";
}

/// Name of the process that rebuilds every index from its records.
pub const REBUILD_INDEXES_PROCESS: &str = "2025-0310-rebuild-indexes";

type DatedIndex<G> = Index<PersonId, DateTime<Utc>, G>;

/// Handle to the family database.
pub struct FamilyDb<B: StorageBackend = FileBackend> {
    store: Store<B>,
    pub(crate) users: Collection<User>,
    pub(crate) passwords: Bucket<UserId, String>,
    pub(crate) emails: Bucket<String, UserId>,
    pub(crate) reset_tokens: Bucket<String, TokenGrant>,
    pub(crate) refresh_tokens: Bucket<String, TokenGrant>,
    pub(crate) families: Collection<Family>,
    pub(crate) families_by_owner: Index<UserId, (), FamilyId>,
    pub(crate) people: Collection<Person>,
    pub(crate) people_by_family: Index<FamilyId, (), PersonId>,
    pub(crate) images: Collection<Image>,
    pub(crate) images_by_family: Index<FamilyId, (), ImageId>,
    pub(crate) posts: Collection<Post>,
    pub(crate) posts_by_person: DatedIndex<PostId>,
    pub(crate) heights: Collection<Height>,
    pub(crate) heights_by_person: DatedIndex<HeightId>,
    pub(crate) weights: Collection<Weight>,
    pub(crate) weights_by_person: DatedIndex<WeightId>,
    pub(crate) milestones: Collection<Milestone>,
    pub(crate) milestones_by_person: DatedIndex<MilestoneId>,
}

impl<B: StorageBackend> std::fmt::Debug for FamilyDb<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FamilyDb").field("store", &self.store.id()).finish_non_exhaustive()
    }
}

impl FamilyDb<FileBackend> {
    /// Opens or creates the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is inaccessible or locked, if
    /// provisioning fails, or if a pending process fails.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        Self::from_store(Store::open(path, config)?)
    }
}

impl FamilyDb<InMemoryBackend> {
    /// Creates an empty in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if provisioning fails.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_store(Store::open_in_memory()?)
    }
}

impl<B: StorageBackend> FamilyDb<B> {
    /// Declares the layout on `store`, provisions it and applies pending
    /// processes.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::DuplicateDeclaration`] if `store` already has a
    /// conflicting declaration, or any provisioning error.
    pub fn from_store(store: Store<B>) -> Result<Self> {
        let families_by_owner = store.declare_index(names::FAMILIES_BY_OWNER)?;
        let people_by_family = store.declare_index(names::PEOPLE_BY_FAMILY)?;
        let images_by_family = store.declare_index(names::IMAGES_BY_FAMILY)?;
        let posts_by_person = store.declare_index(names::POSTS_BY_PERSON)?;
        let heights_by_person = store.declare_index(names::HEIGHTS_BY_PERSON)?;
        let weights_by_person = store.declare_index(names::WEIGHTS_BY_PERSON)?;
        let milestones_by_person = store.declare_index(names::MILESTONES_BY_PERSON)?;

        let db = Self {
            users: Collection::new(store.declare_bucket(names::USERS)?),
            passwords: store.declare_bucket(names::PASSWORDS)?,
            emails: store.declare_bucket(names::EMAILS)?,
            reset_tokens: store.declare_bucket(names::RESET_TOKENS)?,
            refresh_tokens: store.declare_bucket(names::REFRESH_TOKENS)?,
            families: Collection::new(store.declare_bucket(names::FAMILIES)?)
                .index_by(&families_by_owner, |family: &Family| {
                    family.owning_users.iter().map(|owner| (*owner, ())).collect()
                }),
            people: Collection::new(store.declare_bucket(names::PEOPLE)?)
                .index_single(&people_by_family, |person: &Person| Some((person.family_id, ()))),
            images: Collection::new(store.declare_bucket(names::IMAGES)?)
                .index_single(&images_by_family, |image: &Image| Some((image.family_id, ()))),
            posts: Collection::new(store.declare_bucket(names::POSTS)?)
                .index_single(&posts_by_person, |post: &Post| Some((post.person_id, post.entry_date))),
            heights: Collection::new(store.declare_bucket(names::HEIGHTS)?)
                .index_single(&heights_by_person, |height: &Height| Some((height.person_id, height.date))),
            weights: Collection::new(store.declare_bucket(names::WEIGHTS)?)
                .index_single(&weights_by_person, |weight: &Weight| Some((weight.person_id, weight.date))),
            milestones: Collection::new(store.declare_bucket(names::MILESTONES)?).index_single(
                &milestones_by_person,
                |milestone: &Milestone| Some((milestone.person_id, milestone.date)),
            ),
            families_by_owner,
            people_by_family,
            images_by_family,
            posts_by_person,
            heights_by_person,
            weights_by_person,
            milestones_by_person,
            store,
        };

        let created = db.store.init()?;
        if created > 0 {
            info!(created, "Provisioned family buckets");
        }
        db.migrate()?;
        Ok(db)
    }

    /// Applies every one-time process not yet recorded.
    fn migrate(&self) -> Result<()> {
        self.store.apply_process(REBUILD_INDEXES_PROCESS, |tx| {
            self.reindex_all(tx)?;
            Ok::<_, crate::error::DomainError>(())
        })?;
        Ok(())
    }

    /// The underlying store.
    pub fn store(&self) -> &Store<B> {
        &self.store
    }

    /// Runs `f` in a read transaction.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f`.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTransaction<'_, B>) -> Result<T>,
    {
        self.store.with_read_tx(f)
    }

    /// Runs `f` in a write transaction; `f` must call [`commit`] itself.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f`.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut WriteTransaction<'_, B>) -> Result<T>,
    {
        self.store.with_write_tx(f)
    }

    /// Runs `f` in a write transaction and commits if it succeeds.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f` (nothing is committed) or from the commit.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut WriteTransaction<'_, B>) -> Result<T>,
    {
        self.store.with_write_tx(|tx| {
            let value = f(tx)?;
            commit(tx)?;
            Ok(value)
        })
    }

    /// Rebuilds every index from a scan of its records.
    ///
    /// Returns the number of records scanned.
    ///
    /// # Errors
    ///
    /// Returns any bucket or index error.
    pub fn reindex_all(&self, tx: &mut dyn WriteAccess) -> Result<usize, StateError> {
        let mut scanned = self.users.reindex(tx)?;
        scanned += self.families.reindex(tx)?;
        scanned += self.people.reindex(tx)?;
        scanned += self.images.reindex(tx)?;
        scanned += self.posts.reindex(tx)?;
        scanned += self.heights.reindex(tx)?;
        scanned += self.weights.reindex(tx)?;
        scanned += self.milestones.reindex(tx)?;
        Ok(scanned)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use kinship_test_utils::TestDir;

    use super::*;

    #[test]
    fn test_open_provisions_every_bucket() {
        let db = FamilyDb::open_in_memory().unwrap();
        let names = db.read(|tx| Ok(kinship_store::ReadAccess::bucket_names(tx))).unwrap();
        for expected in [names::USERS, names::PEOPLE, names::HEIGHTS_BY_PERSON, "heights_by.targets"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert!(db.store().undeclared_buckets().unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_process_runs_once_across_reopen() {
        let dir = TestDir::new();
        let path = dir.store_path();
        {
            let db = FamilyDb::open(&path, StoreConfig::default()).unwrap();
            let applied = db.store().applied_processes().unwrap();
            assert_eq!(applied.len(), 1);
            assert_eq!(applied[0].0, REBUILD_INDEXES_PROCESS);
        }
        let db = FamilyDb::open(&path, StoreConfig::default()).unwrap();
        assert_eq!(db.store().applied_processes().unwrap().len(), 1);
    }

    #[test]
    fn test_update_commits_and_write_does_not() {
        let db = FamilyDb::open_in_memory().unwrap();
        db.write(|tx| {
            let mut family = Family::new("Uncommitted", UserId::new(1));
            db.families.upsert(tx, &mut family)?;
            Ok(())
        })
        .unwrap();
        assert!(db.read(|tx| Ok(db.families.all(tx)?)).unwrap().is_empty());

        db.update(|tx| {
            let mut family = Family::new("Committed", UserId::new(1));
            db.families.upsert(tx, &mut family)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(db.read(|tx| Ok(db.families.all(tx)?)).unwrap().len(), 1);
    }
}
