//! Typed buckets.
//!
//! A [`Bucket<K, V>`] is a named region of the store whose keys use the
//! order-preserving [`Key`] encoding and whose values go through the
//! versioned [`Pack`] codec. Handles are cheap to clone and are bound to the
//! store they were declared on.

use std::{marker::PhantomData, sync::Arc};

use kinship_store::{ReadAccess, StoreId, WriteAccess};
use kinship_types::{IntKey, Key, Pack, pack};
use snafu::ResultExt;

use crate::{
    error::{PackSnafu, Result, StateError},
    schema::ID_BUCKET,
};

/// A typed view of one bucket.
pub struct Bucket<K, V> {
    name: Arc<str>,
    store: StoreId,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for Bucket<K, V> {
    fn clone(&self) -> Self {
        Self { name: Arc::clone(&self.name), store: self.store, _marker: PhantomData }
    }
}

impl<K, V> std::fmt::Debug for Bucket<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket").field("name", &self.name).field("store", &self.store).finish()
    }
}

/// Fails unless `tx` came from `store`.
pub(crate) fn check_store<R: ReadAccess + ?Sized>(store: StoreId, tx: &R) -> Result<()> {
    let actual = tx.store_id();
    if actual == store {
        Ok(())
    } else {
        Err(StateError::ForeignTransaction { expected: store, actual })
    }
}

impl<K: Key, V: Pack + Clone> Bucket<K, V> {
    pub(crate) fn new(name: &str, store: StoreId) -> Self {
        Self { name: Arc::from(name), store, _marker: PhantomData }
    }

    /// Bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store this handle is bound to.
    pub fn store_id(&self) -> StoreId {
        self.store
    }

    fn decode_key(&self, raw: &[u8]) -> Result<K> {
        K::from_key_bytes(raw)
            .ok_or_else(|| StateError::KeyDecode { bucket: self.name.to_string(), key: raw.to_vec() })
    }

    fn decode_value(&self, raw: &[u8]) -> Result<V> {
        pack::decode(raw).context(PackSnafu { bucket: self.name.as_ref() })
    }

    /// Returns the value under `key`. Absence is `None`, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ForeignTransaction`] if `tx` belongs to another
    /// store, or [`StateError::Pack`] if the stored value is malformed.
    pub fn read<R: ReadAccess + ?Sized>(&self, tx: &R, key: &K) -> Result<Option<V>> {
        check_store(self.store, tx)?;
        match tx.get(&self.name, &key.to_key_bytes())? {
            Some(raw) => self.decode_value(raw).map(Some),
            None => Ok(None),
        }
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ForeignTransaction`] if `tx` belongs to another
    /// store, or [`StateError::Pack`] if the value cannot be packed.
    pub fn write<W: WriteAccess + ?Sized>(&self, tx: &mut W, key: &K, value: &V) -> Result<()> {
        check_store(self.store, tx)?;
        let raw = pack::encode(value).context(PackSnafu { bucket: self.name.as_ref() })?;
        tx.insert(&self.name, &key.to_key_bytes(), &raw)?;
        Ok(())
    }

    /// Removes `key`. Returns whether it was present.
    ///
    /// Index entries pointing at `key` are left alone; use
    /// [`Collection::remove`](crate::Collection::remove) to keep them in step.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ForeignTransaction`] if `tx` belongs to another store.
    pub fn delete<W: WriteAccess + ?Sized>(&self, tx: &mut W, key: &K) -> Result<bool> {
        check_store(self.store, tx)?;
        Ok(tx.delete(&self.name, &key.to_key_bytes())?)
    }

    /// Whether `key` is present.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ForeignTransaction`] if `tx` belongs to another store.
    pub fn has_key<R: ReadAccess + ?Sized>(&self, tx: &R, key: &K) -> Result<bool> {
        check_store(self.store, tx)?;
        Ok(tx.contains(&self.name, &key.to_key_bytes())?)
    }

    /// Visits every entry in key order until `visit` returns false.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::KeyDecode`] or [`StateError::Pack`] on the first
    /// malformed entry.
    pub fn iterate_all<R, F>(&self, tx: &R, mut visit: F) -> Result<()>
    where
        R: ReadAccess + ?Sized,
        F: FnMut(K, V) -> bool,
    {
        check_store(self.store, tx)?;
        for (raw_key, raw_value) in tx.iter(&self.name)? {
            let key = self.decode_key(raw_key)?;
            let value = self.decode_value(raw_value)?;
            if !visit(key, value) {
                break;
            }
        }
        Ok(())
    }

    /// Every value in key order.
    ///
    /// # Errors
    ///
    /// See [`Bucket::iterate_all`].
    pub fn values<R: ReadAccess + ?Sized>(&self, tx: &R) -> Result<Vec<V>> {
        let mut values = Vec::new();
        self.iterate_all(tx, |_, value| {
            values.push(value);
            true
        })?;
        Ok(values)
    }

    /// Values for `keys` in the order given. Missing keys are skipped.
    ///
    /// # Errors
    ///
    /// See [`Bucket::read`].
    pub fn read_many<'k, R, I>(&self, tx: &R, keys: I) -> Result<Vec<V>>
    where
        R: ReadAccess + ?Sized,
        I: IntoIterator<Item = &'k K>,
        K: 'k,
    {
        let mut values = Vec::new();
        for key in keys {
            if let Some(value) = self.read(tx, key)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Number of entries.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ForeignTransaction`] if `tx` belongs to another store.
    pub fn len<R: ReadAccess + ?Sized>(&self, tx: &R) -> Result<usize> {
        check_store(self.store, tx)?;
        Ok(tx.bucket_len(&self.name)?)
    }

    /// Whether the bucket has no entries.
    ///
    /// # Errors
    ///
    /// See [`Bucket::len`].
    pub fn is_empty<R: ReadAccess + ?Sized>(&self, tx: &R) -> Result<bool> {
        Ok(self.len(tx)? == 0)
    }
}

impl<K: IntKey, V: Pack + Clone> Bucket<K, V> {
    /// Allocates the next integer key.
    ///
    /// The result is greater than every key currently in the bucket and
    /// every key previously allocated, so deleting the highest record never
    /// leads to its id being handed out again. Calls within one transaction
    /// return strictly increasing values.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IdExhausted`] when `u64::MAX` has been handed out.
    pub fn next_int_id<W: WriteAccess + ?Sized>(&self, tx: &mut W) -> Result<K> {
        check_store(self.store, tx)?;

        let highest_key = match tx.last(&self.name)? {
            Some((raw, _)) => self.decode_key(raw)?.as_u64(),
            None => 0,
        };
        let high_water = match tx.get(ID_BUCKET, self.name.as_bytes())? {
            Some(raw) => pack::decode::<u64>(raw).context(PackSnafu { bucket: ID_BUCKET })?,
            None => 0,
        };

        let next = highest_key
            .max(high_water)
            .checked_add(1)
            .ok_or_else(|| StateError::IdExhausted { bucket: self.name.to_string() })?;
        let raw = pack::encode(&next).context(PackSnafu { bucket: ID_BUCKET })?;
        tx.insert(ID_BUCKET, self.name.as_bytes(), &raw)?;
        Ok(K::from_u64(next))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use kinship_types::PersonId;
    use proptest::prelude::*;

    use crate::Store;

    fn store_with_names() -> (Store<kinship_store::InMemoryBackend>, super::Bucket<PersonId, String>) {
        let store = Store::open_in_memory().unwrap();
        let names = store.declare_bucket::<PersonId, String>("names").unwrap();
        store.init().unwrap();
        (store, names)
    }

    #[test]
    fn test_read_write_delete() {
        let (store, names) = store_with_names();
        let mut txn = store.database().write().unwrap();
        names.write(&mut txn, &PersonId::new(1), &"ada".to_string()).unwrap();
        assert_eq!(names.read(&txn, &PersonId::new(1)).unwrap().as_deref(), Some("ada"));
        assert!(names.has_key(&txn, &PersonId::new(1)).unwrap());

        assert!(names.delete(&mut txn, &PersonId::new(1)).unwrap());
        assert!(!names.delete(&mut txn, &PersonId::new(1)).unwrap());
        assert_eq!(names.read(&txn, &PersonId::new(1)).unwrap(), None);
    }

    #[test]
    fn test_iterate_all_stops_early() {
        let (store, names) = store_with_names();
        let mut txn = store.database().write().unwrap();
        for (id, name) in [(3, "c"), (1, "a"), (2, "b")] {
            names.write(&mut txn, &PersonId::new(id), &name.to_string()).unwrap();
        }

        let mut seen = Vec::new();
        names
            .iterate_all(&txn, |id, name| {
                seen.push((id.value(), name));
                id.value() < 2
            })
            .unwrap();
        assert_eq!(seen, vec![(1, "a".to_string()), (2, "b".to_string())]);
    }

    #[test]
    fn test_read_many_skips_missing() {
        let (store, names) = store_with_names();
        let mut txn = store.database().write().unwrap();
        names.write(&mut txn, &PersonId::new(1), &"a".to_string()).unwrap();
        names.write(&mut txn, &PersonId::new(3), &"c".to_string()).unwrap();

        let keys = [PersonId::new(3), PersonId::new(2), PersonId::new(1)];
        assert_eq!(names.read_many(&txn, &keys).unwrap(), vec!["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_next_int_id_never_reuses_deleted_highest() {
        let (store, names) = store_with_names();
        let mut txn = store.database().write().unwrap();
        let first = names.next_int_id(&mut txn).unwrap();
        names.write(&mut txn, &first, &"a".to_string()).unwrap();
        let second = names.next_int_id(&mut txn).unwrap();
        names.write(&mut txn, &second, &"b".to_string()).unwrap();
        names.delete(&mut txn, &second).unwrap();
        txn.commit().unwrap();
        drop(txn);

        let mut txn = store.database().write().unwrap();
        let third = names.next_int_id(&mut txn).unwrap();
        assert_eq!((first.value(), second.value(), third.value()), (1, 2, 3));
    }

    #[test]
    fn test_next_int_id_respects_explicit_keys() {
        let (store, names) = store_with_names();
        let mut txn = store.database().write().unwrap();
        names.write(&mut txn, &PersonId::new(41), &"explicit".to_string()).unwrap();
        assert_eq!(names.next_int_id(&mut txn).unwrap(), PersonId::new(42));
    }

    #[test]
    fn test_foreign_transaction_rejected() {
        let (_store, names) = store_with_names();
        let (other, _) = store_with_names();
        let txn = other.database().read().unwrap();
        let err = names.read(&txn, &PersonId::new(1)).unwrap_err();
        assert!(matches!(err, crate::StateError::ForeignTransaction { .. }));
    }

    proptest! {
        #[test]
        fn prop_next_int_id_strictly_increasing(deletes in proptest::collection::vec(any::<bool>(), 1..30)) {
            let (store, names) = store_with_names();
            let mut txn = store.database().write().unwrap();
            let mut previous = 0;
            for delete in deletes {
                let id = names.next_int_id(&mut txn).unwrap();
                prop_assert!(id.value() > previous);
                previous = id.value();
                names.write(&mut txn, &id, &String::new()).unwrap();
                if delete {
                    names.delete(&mut txn, &id).unwrap();
                }
            }
        }
    }
}
