//! Bucket declarations and idempotent provisioning.
//!
//! Every bucket a program touches is declared once at startup. Declaring the
//! same name twice is a programming error and fails immediately rather than
//! letting two typed handles disagree about one bucket's encoding.
//! [`Schema::init`] then creates whatever declared buckets are missing.

use std::collections::BTreeMap;

use kinship_store::{MAX_BUCKET_NAME_LEN, ReadAccess, WriteAccess};
use kinship_types::KeyKind;
use tracing::{info, warn};

use crate::error::{Result, StateError};

/// Allocator high-water marks, keyed by bucket name.
pub(crate) const ID_BUCKET: &str = "__next_ids";

/// Names of applied one-time processes.
pub const PROCESS_BUCKET: &str = "processes";

/// Suffix of the reverse bucket kept for every index.
pub(crate) const INDEX_TARGETS_SUFFIX: &str = ".targets";

/// What a declared bucket holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketRole {
    /// Packed values under keys of the given kind.
    Records {
        /// Key encoding of the bucket.
        key: KeyKind,
    },
    /// Index entries: `term ‖ priority ‖ target`, empty values.
    IndexTerms,
    /// Per-target list of the index entries it owns.
    IndexTargets,
    /// Bookkeeping maintained by this crate.
    Internal,
}

/// Registry of declared buckets.
#[derive(Debug)]
pub struct Schema {
    declarations: BTreeMap<String, BucketRole>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// Creates a schema holding only the internal buckets.
    pub fn new() -> Self {
        let mut declarations = BTreeMap::new();
        declarations.insert(ID_BUCKET.to_string(), BucketRole::Internal);
        declarations.insert(PROCESS_BUCKET.to_string(), BucketRole::Internal);
        Self { declarations }
    }

    /// Registers `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidName`] for empty, overlong or reserved
    /// names, and [`StateError::DuplicateDeclaration`] if `name` is taken.
    pub fn declare(&mut self, name: &str, role: BucketRole) -> Result<()> {
        if name.is_empty() {
            return Err(StateError::InvalidName { name: name.to_string(), reason: "empty" });
        }
        if name.len() > MAX_BUCKET_NAME_LEN {
            return Err(StateError::InvalidName { name: name.to_string(), reason: "longer than 255 bytes" });
        }
        if name.starts_with("__") {
            return Err(StateError::InvalidName { name: name.to_string(), reason: "reserved prefix" });
        }
        if self.declarations.contains_key(name) {
            return Err(StateError::DuplicateDeclaration { name: name.to_string() });
        }
        self.declarations.insert(name.to_string(), role);
        Ok(())
    }

    /// Whether `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    /// Role of `name`, if declared.
    pub fn role(&self, name: &str) -> Option<BucketRole> {
        self.declarations.get(name).copied()
    }

    /// Declared names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.declarations.keys().map(String::as_str)
    }

    /// Creates every declared bucket that does not exist yet.
    ///
    /// Returns the number of buckets created. Running it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Store`] if a bucket cannot be created.
    pub fn init(&self, tx: &mut dyn WriteAccess) -> Result<usize> {
        let mut created = 0;
        for name in self.declarations.keys() {
            if tx.create_bucket(name)? {
                created += 1;
            }
        }
        for orphan in self.undeclared(&*tx) {
            warn!(bucket = %orphan, "Bucket on disk has no declaration");
        }
        if created > 0 {
            info!(created, declared = self.declarations.len(), "Provisioned buckets");
        }
        Ok(created)
    }

    /// Buckets that exist in the store but are not declared.
    ///
    /// Usually left behind by a rename without a migration.
    pub fn undeclared(&self, tx: &dyn ReadAccess) -> Vec<String> {
        tx.bucket_names().into_iter().filter(|name| !self.declarations.contains_key(name)).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use kinship_store::Database;

    use super::*;

    #[test]
    fn test_duplicate_declaration_fails() {
        let mut schema = Schema::new();
        schema.declare("users", BucketRole::Records { key: KeyKind::U64 }).unwrap();
        let err = schema.declare("users", BucketRole::IndexTerms).unwrap_err();
        assert!(matches!(err, StateError::DuplicateDeclaration { .. }));
    }

    #[test]
    fn test_reserved_and_empty_names_rejected() {
        let mut schema = Schema::new();
        assert!(matches!(
            schema.declare("", BucketRole::IndexTerms),
            Err(StateError::InvalidName { .. })
        ));
        assert!(matches!(
            schema.declare("__next_ids", BucketRole::IndexTerms),
            Err(StateError::InvalidName { .. })
        ));
        assert!(matches!(
            schema.declare(PROCESS_BUCKET, BucketRole::IndexTerms),
            Err(StateError::DuplicateDeclaration { .. })
        ));
    }

    #[test]
    fn test_init_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let mut schema = Schema::new();
        schema.declare("people", BucketRole::Records { key: KeyKind::U64 }).unwrap();

        let mut txn = db.write().unwrap();
        assert_eq!(schema.init(&mut txn).unwrap(), 3);
        assert_eq!(schema.init(&mut txn).unwrap(), 0);
        txn.commit().unwrap();

        let txn = db.read().unwrap();
        assert!(txn.has_bucket("people"));
        assert!(txn.has_bucket(PROCESS_BUCKET));
    }

    #[test]
    fn test_undeclared_lists_orphans() {
        let db = Database::open_in_memory().unwrap();
        let mut txn = db.write().unwrap();
        txn.create_bucket("old_people").unwrap();
        let schema = Schema::new();
        schema.init(&mut txn).unwrap();
        assert_eq!(schema.undeclared(&txn), vec!["old_people".to_string()]);
    }
}
