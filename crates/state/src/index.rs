//! Secondary indexes with optional priority ordering.
//!
//! An [`Index<T, P, G>`] maps a term `T` to a set of targets `G`, each entry
//! carrying a priority `P`. Entries for one term read back ordered by
//! priority, then by target. Use `P = ()` for an index without priority.
//!
//! Two buckets back every index:
//!
//! ```text
//! <name>          term ‖ priority ‖ target  ->  (empty)
//! <name>.targets  target                    ->  [(term, priority), ...]
//! ```
//!
//! The reverse bucket makes "replace every term of this target" a point
//! lookup instead of a scan.

use std::{collections::BTreeSet, marker::PhantomData, sync::Arc};

use kinship_store::{Entries, ReadAccess, StoreId, WriteAccess};
use kinship_types::{Key, codec};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::{
    bucket::check_store,
    error::{CodecSnafu, Result, StateError},
};

/// Read order of an index lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Lowest priority first.
    #[default]
    Ascending,
    /// Highest priority first.
    Descending,
}

/// Slice of an index lookup.
///
/// The default window returns every entry in ascending order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    /// Entries to skip.
    pub offset: usize,
    /// Maximum entries to return; `None` means unlimited.
    pub limit: Option<usize>,
    /// Read order.
    pub direction: Direction,
}

impl Window {
    /// Every entry, ascending.
    pub fn all() -> Self {
        Self::default()
    }

    /// At most `limit` entries.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` entries.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Reads highest priority first.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.direction = Direction::Descending;
        self
    }

    fn apply<'a>(&self, entries: Entries<'a>) -> Vec<&'a [u8]> {
        let limit = self.limit.unwrap_or(usize::MAX);
        match self.direction {
            Direction::Ascending => entries.skip(self.offset).take(limit).map(|(k, _)| k).collect(),
            Direction::Descending => entries.rev().skip(self.offset).take(limit).map(|(k, _)| k).collect(),
        }
    }
}

/// Encoded `(term, priority)` pairs owned by one target.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TargetEdges {
    edges: Vec<(Vec<u8>, Vec<u8>)>,
}

type EdgeSet = BTreeSet<(Vec<u8>, Vec<u8>)>;

/// A typed secondary index.
pub struct Index<T, P, G> {
    name: Arc<str>,
    targets: Arc<str>,
    store: StoreId,
    _marker: PhantomData<fn() -> (T, P, G)>,
}

impl<T, P, G> Clone for Index<T, P, G> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            targets: Arc::clone(&self.targets),
            store: self.store,
            _marker: PhantomData,
        }
    }
}

impl<T, P, G> std::fmt::Debug for Index<T, P, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index").field("name", &self.name).field("store", &self.store).finish()
    }
}

impl<T: Key, P: Key, G: Key> Index<T, P, G> {
    pub(crate) fn new(name: &str, targets: &str, store: StoreId) -> Self {
        Self { name: Arc::from(name), targets: Arc::from(targets), store, _marker: PhantomData }
    }

    /// Index name (also the name of its entry bucket).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the reverse bucket.
    pub fn targets_name(&self) -> &str {
        &self.targets
    }

    fn load_edges<R: ReadAccess + ?Sized>(&self, tx: &R, target: &[u8]) -> Result<EdgeSet> {
        match tx.get(&self.targets, target)? {
            Some(raw) => {
                let stored: TargetEdges =
                    codec::decode(raw).context(CodecSnafu { bucket: self.targets.as_ref() })?;
                Ok(stored.edges.into_iter().collect())
            },
            None => Ok(EdgeSet::new()),
        }
    }

    fn entry_key(term: &[u8], priority: &[u8], target: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(term.len() + priority.len() + target.len());
        key.extend_from_slice(term);
        key.extend_from_slice(priority);
        key.extend_from_slice(target);
        key
    }

    /// Makes `target`'s entries exactly `next`, touching only what changed.
    fn replace_edges<W: WriteAccess + ?Sized>(&self, tx: &mut W, target: &G, next: EdgeSet) -> Result<()> {
        check_store(self.store, tx)?;
        let target_key = target.to_key_bytes();
        let previous = self.load_edges(tx, &target_key)?;

        for (term, priority) in previous.difference(&next) {
            tx.delete(&self.name, &Self::entry_key(term, priority, &target_key))?;
        }
        for (term, priority) in next.difference(&previous) {
            tx.insert(&self.name, &Self::entry_key(term, priority, &target_key), &[])?;
        }

        if next.is_empty() {
            tx.delete(&self.targets, &target_key)?;
        } else if next != previous {
            let stored = TargetEdges { edges: next.into_iter().collect() };
            let raw = codec::encode(&stored).context(CodecSnafu { bucket: self.targets.as_ref() })?;
            tx.insert(&self.targets, &target_key, &raw)?;
        }
        Ok(())
    }

    /// Replaces all of `target`'s terms with `terms`, each at its own priority.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ForeignTransaction`] if `tx` belongs to another
    /// store, or [`StateError::Store`] if a write fails.
    pub fn set_target_terms<W: WriteAccess + ?Sized>(
        &self,
        tx: &mut W,
        target: &G,
        terms: &[(T, P)],
    ) -> Result<()> {
        let next =
            terms.iter().map(|(term, priority)| (term.to_key_bytes(), priority.to_key_bytes())).collect();
        self.replace_edges(tx, target, next)
    }

    /// Replaces all of `target`'s terms with `terms` at the default priority.
    ///
    /// Terms that were previously set for `target` and are absent from
    /// `terms` no longer return it.
    ///
    /// # Errors
    ///
    /// See [`Index::set_target_terms`].
    pub fn set_target_terms_plain<W: WriteAccess + ?Sized>(
        &self,
        tx: &mut W,
        target: &G,
        terms: &[T],
    ) -> Result<()>
    where
        P: Default,
    {
        let priority = P::default().to_key_bytes();
        let next = terms.iter().map(|term| (term.to_key_bytes(), priority.clone())).collect();
        self.replace_edges(tx, target, next)
    }

    /// Associates `target` with exactly one term at `priority`.
    ///
    /// # Errors
    ///
    /// See [`Index::set_target_terms`].
    pub fn set_target_single_term_ext<W: WriteAccess + ?Sized>(
        &self,
        tx: &mut W,
        target: &G,
        priority: &P,
        term: &T,
    ) -> Result<()> {
        let next = EdgeSet::from([(term.to_key_bytes(), priority.to_key_bytes())]);
        self.replace_edges(tx, target, next)
    }

    /// Removes every entry of `target`.
    ///
    /// # Errors
    ///
    /// See [`Index::set_target_terms`].
    pub fn clear_target<W: WriteAccess + ?Sized>(&self, tx: &mut W, target: &G) -> Result<()> {
        self.replace_edges(tx, target, EdgeSet::new())
    }

    /// Targets for `term`, ordered by priority then target, sliced by `window`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::KeyDecode`] if an entry is malformed.
    pub fn read_term_targets<R: ReadAccess + ?Sized>(
        &self,
        tx: &R,
        term: &T,
        window: Window,
    ) -> Result<Vec<G>> {
        Ok(self.read_term_entries(tx, term, window)?.into_iter().map(|(_, target)| target).collect())
    }

    /// Like [`Index::read_term_targets`], also returning each priority.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::KeyDecode`] if an entry is malformed.
    pub fn read_term_entries<R: ReadAccess + ?Sized>(
        &self,
        tx: &R,
        term: &T,
        window: Window,
    ) -> Result<Vec<(P, G)>> {
        check_store(self.store, tx)?;
        let prefix = term.to_key_bytes();
        let entries = tx.prefix(&self.name, &prefix)?;
        window.apply(entries).into_iter().map(|key| self.decode_entry(key, prefix.len())).collect()
    }

    fn decode_entry(&self, key: &[u8], term_len: usize) -> Result<(P, G)> {
        let malformed = || StateError::KeyDecode { bucket: self.name.to_string(), key: key.to_vec() };
        let rest = key.get(term_len..).ok_or_else(malformed)?;
        let (priority, used) = P::decode_key(rest).ok_or_else(malformed)?;
        let target = G::from_key_bytes(&rest[used..]).ok_or_else(malformed)?;
        Ok((priority, target))
    }

    /// Number of targets under `term`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ForeignTransaction`] if `tx` belongs to another store.
    pub fn count<R: ReadAccess + ?Sized>(&self, tx: &R, term: &T) -> Result<usize> {
        check_store(self.store, tx)?;
        Ok(tx.prefix(&self.name, &term.to_key_bytes())?.count())
    }

    /// Terms and priorities currently set for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Codec`] or [`StateError::KeyDecode`] if the
    /// reverse entry is malformed.
    pub fn target_terms<R: ReadAccess + ?Sized>(&self, tx: &R, target: &G) -> Result<Vec<(T, P)>> {
        check_store(self.store, tx)?;
        let target_key = target.to_key_bytes();
        self.load_edges(tx, &target_key)?
            .into_iter()
            .map(|(term, priority)| {
                let malformed =
                    || StateError::KeyDecode { bucket: self.targets.to_string(), key: target_key.clone() };
                let term = T::from_key_bytes(&term).ok_or_else(malformed)?;
                let priority = P::from_key_bytes(&priority).ok_or_else(malformed)?;
                Ok((term, priority))
            })
            .collect()
    }

    /// Removes every entry of the index.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Store`] if the buckets cannot be recreated.
    pub fn truncate<W: WriteAccess + ?Sized>(&self, tx: &mut W) -> Result<()> {
        check_store(self.store, tx)?;
        for name in [&*self.name, &*self.targets] {
            tx.drop_bucket(name)?;
            tx.create_bucket(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use kinship_store::InMemoryBackend;
    use kinship_types::{HeightId, PersonId};
    use proptest::prelude::*;

    use super::*;
    use crate::Store;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + n * 86_400, 0).unwrap()
    }

    fn timeline() -> (Store<InMemoryBackend>, Index<PersonId, DateTime<Utc>, HeightId>) {
        let store = Store::open_in_memory().unwrap();
        let index = store.declare_index("heights_by").unwrap();
        store.init().unwrap();
        (store, index)
    }

    fn tags() -> (Store<InMemoryBackend>, Index<String, (), PersonId>) {
        let store = Store::open_in_memory().unwrap();
        let index = store.declare_index("tags").unwrap();
        store.init().unwrap();
        (store, index)
    }

    #[test]
    fn test_plain_terms_replace_previous() {
        let (store, index) = tags();
        let mut txn = store.database().write().unwrap();
        let ada = PersonId::new(1);

        index.set_target_terms_plain(&mut txn, &ada, &["math".to_string(), "poetry".to_string()]).unwrap();
        index.set_target_terms_plain(&mut txn, &ada, &["math".to_string(), "engines".to_string()]).unwrap();

        assert_eq!(index.read_term_targets(&txn, &"math".to_string(), Window::all()).unwrap(), vec![ada]);
        assert_eq!(index.read_term_targets(&txn, &"engines".to_string(), Window::all()).unwrap(), vec![ada]);
        assert!(index.read_term_targets(&txn, &"poetry".to_string(), Window::all()).unwrap().is_empty());
    }

    #[test]
    fn test_unprioritized_targets_in_key_order() {
        let (store, index) = tags();
        let mut txn = store.database().write().unwrap();
        for id in [30, 10, 20] {
            index.set_target_terms_plain(&mut txn, &PersonId::new(id), &["kid".to_string()]).unwrap();
        }
        let ids: Vec<u64> = index
            .read_term_targets(&txn, &"kid".to_string(), Window::all())
            .unwrap()
            .into_iter()
            .map(PersonId::value)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_terms_sharing_a_prefix_do_not_mix() {
        let (store, index) = tags();
        let mut txn = store.database().write().unwrap();
        index.set_target_terms_plain(&mut txn, &PersonId::new(1), &["ab".to_string()]).unwrap();
        index.set_target_terms_plain(&mut txn, &PersonId::new(2), &["abc".to_string()]).unwrap();

        let targets = index.read_term_targets(&txn, &"ab".to_string(), Window::all()).unwrap();
        assert_eq!(targets, vec![PersonId::new(1)]);
        assert_eq!(index.count(&txn, &"abc".to_string()).unwrap(), 1);
    }

    #[test]
    fn test_term_followed_by_escaped_nul_stays_separate() {
        let (store, index) = tags();
        let mut txn = store.database().write().unwrap();
        index.set_target_terms_plain(&mut txn, &PersonId::new(1), &["ab".to_string()]).unwrap();
        index.set_target_terms_plain(&mut txn, &PersonId::new(2), &["ab\0c".to_string()]).unwrap();

        assert_eq!(index.count(&txn, &"ab".to_string()).unwrap(), 1);
        assert_eq!(
            index.read_term_targets(&txn, &"ab".to_string(), Window::all()).unwrap(),
            vec![PersonId::new(1)]
        );
        assert_eq!(
            index.read_term_targets(&txn, &"ab\0c".to_string(), Window::all()).unwrap(),
            vec![PersonId::new(2)]
        );
    }

    #[test]
    fn test_priority_orders_targets() {
        let (store, index) = timeline();
        let mut txn = store.database().write().unwrap();
        let kid = PersonId::new(5);
        index.set_target_single_term_ext(&mut txn, &HeightId::new(1), &day(3), &kid).unwrap();
        index.set_target_single_term_ext(&mut txn, &HeightId::new(2), &day(1), &kid).unwrap();
        index.set_target_single_term_ext(&mut txn, &HeightId::new(3), &day(2), &kid).unwrap();

        let ids: Vec<u64> = index
            .read_term_targets(&txn, &kid, Window::all())
            .unwrap()
            .into_iter()
            .map(HeightId::value)
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let newest: Vec<u64> = index
            .read_term_targets(&txn, &kid, Window::all().descending().with_limit(2))
            .unwrap()
            .into_iter()
            .map(HeightId::value)
            .collect();
        assert_eq!(newest, vec![1, 3]);

        let page: Vec<u64> = index
            .read_term_targets(&txn, &kid, Window::all().with_offset(1).with_limit(1))
            .unwrap()
            .into_iter()
            .map(HeightId::value)
            .collect();
        assert_eq!(page, vec![3]);
    }

    #[test]
    fn test_single_term_moves_target() {
        let (store, index) = timeline();
        let mut txn = store.database().write().unwrap();
        let height = HeightId::new(9);
        index.set_target_single_term_ext(&mut txn, &height, &day(1), &PersonId::new(1)).unwrap();
        index.set_target_single_term_ext(&mut txn, &height, &day(4), &PersonId::new(2)).unwrap();

        assert_eq!(index.count(&txn, &PersonId::new(1)).unwrap(), 0);
        let entries = index.read_term_entries(&txn, &PersonId::new(2), Window::all()).unwrap();
        assert_eq!(entries, vec![(day(4), height)]);
        assert_eq!(index.target_terms(&txn, &height).unwrap(), vec![(PersonId::new(2), day(4))]);
    }

    #[test]
    fn test_clear_target_removes_reverse_entry() {
        let (store, index) = timeline();
        let mut txn = store.database().write().unwrap();
        let height = HeightId::new(1);
        index.set_target_single_term_ext(&mut txn, &height, &day(1), &PersonId::new(1)).unwrap();
        index.clear_target(&mut txn, &height).unwrap();

        assert_eq!(index.count(&txn, &PersonId::new(1)).unwrap(), 0);
        assert!(index.target_terms(&txn, &height).unwrap().is_empty());
        assert_eq!(txn.bucket_len(index.targets_name()).unwrap(), 0);
    }

    #[test]
    fn test_truncate_empties_both_buckets() {
        let (store, index) = timeline();
        let mut txn = store.database().write().unwrap();
        index.set_target_single_term_ext(&mut txn, &HeightId::new(1), &day(1), &PersonId::new(1)).unwrap();
        index.truncate(&mut txn).unwrap();
        assert_eq!(txn.bucket_len(index.name()).unwrap(), 0);
        assert_eq!(txn.bucket_len(index.targets_name()).unwrap(), 0);
    }

    proptest! {
        #[test]
        fn prop_ascending_priorities_read_back_sorted(
            offsets in proptest::collection::vec(-5000i64..5000, 1..25),
        ) {
            let (store, index) = timeline();
            let mut txn = store.database().write().unwrap();
            let kid = PersonId::new(1);
            for (i, offset) in offsets.iter().enumerate() {
                let target = HeightId::new(i as u64 + 1);
                index.set_target_single_term_ext(&mut txn, &target, &day(*offset), &kid).unwrap();
            }
            let entries = index.read_term_entries(&txn, &kid, Window::all()).unwrap();
            prop_assert_eq!(entries.len(), offsets.len());
            prop_assert!(entries.windows(2).all(|pair| pair[0] <= pair[1]));
        }

        #[test]
        fn prop_plain_resync_matches_latest_terms(
            first in proptest::collection::btree_set("[a-e]", 0..5),
            second in proptest::collection::btree_set("[a-e]", 0..5),
        ) {
            let (store, index) = tags();
            let mut txn = store.database().write().unwrap();
            let target = PersonId::new(7);
            let first: Vec<String> = first.into_iter().collect();
            let second: Vec<String> = second.into_iter().collect();
            index.set_target_terms_plain(&mut txn, &target, &first).unwrap();
            index.set_target_terms_plain(&mut txn, &target, &second).unwrap();

            for term in ["a", "b", "c", "d", "e"] {
                let hits = index.read_term_targets(&txn, &term.to_string(), Window::all()).unwrap();
                let expected = second.iter().any(|t| t == term);
                prop_assert_eq!(hits == vec![target], expected);
                prop_assert_eq!(hits.is_empty(), !expected);
            }
        }
    }
}
