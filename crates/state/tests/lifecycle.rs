//! Buckets, indexes and processes over a file-backed store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::{
    path::Path,
    sync::Barrier,
    thread,
};

use chrono::{DateTime, Duration, TimeZone, Utc};
use kinship_state::{Bucket, Index, StateError, Store, Window, commit};
use kinship_store::FileBackend;
use kinship_test_utils::{TestDir, init_test_tracing};
use kinship_types::{FamilyId, PersonId, config::StoreConfig};

struct Layout {
    store: Store<FileBackend>,
    names: Bucket<PersonId, String>,
    by_family: Index<FamilyId, (), PersonId>,
    by_birthday: Index<FamilyId, DateTime<Utc>, PersonId>,
}

fn open(path: &Path) -> Layout {
    let store = Store::open(path, StoreConfig::default()).unwrap();
    let names = store.declare_bucket("names").unwrap();
    let by_family = store.declare_index("names_by_family").unwrap();
    let by_birthday = store.declare_index("names_by_birthday").unwrap();
    store.init().unwrap();
    Layout { store, names, by_family, by_birthday }
}

#[test]
fn test_allocated_ids_survive_reopen_and_deletes() {
    init_test_tracing();
    let dir = TestDir::new();
    let path = dir.store_path();
    let highest = {
        let layout = open(&path);
        layout
            .store
            .with_write_tx(|tx| {
                let mut last = PersonId::new(0);
                for name in ["ada", "grace", "emmy"] {
                    let id = layout.names.next_int_id(tx)?;
                    assert!(id > last);
                    layout.names.write(tx, &id, &name.to_string())?;
                    last = id;
                }
                layout.names.delete(tx, &last)?;
                commit(tx)?;
                Ok::<_, StateError>(last)
            })
            .unwrap()
    };

    let layout = open(&path);
    let next = layout
        .store
        .with_write_tx(|tx| {
            let id = layout.names.next_int_id(tx)?;
            commit(tx)?;
            Ok::<_, StateError>(id)
        })
        .unwrap();
    assert!(next > highest, "{next} reused or preceded deleted {highest}");
    assert_eq!(layout.store.with_read_tx(|tx| layout.names.len(tx)).unwrap(), 2);
}

#[test]
fn test_index_entries_follow_target_updates() {
    let dir = TestDir::new();
    let layout = open(&dir.store_path());
    let (ada, grace) = (PersonId::new(1), PersonId::new(2));
    let (first, second) = (FamilyId::new(10), FamilyId::new(20));

    layout
        .store
        .with_write_tx(|tx| {
            layout.by_family.set_target_terms_plain(tx, &ada, &[first, second])?;
            layout.by_family.set_target_terms_plain(tx, &grace, &[first])?;
            commit(tx)
        })
        .unwrap();
    layout
        .store
        .with_write_tx(|tx| {
            layout.by_family.set_target_terms_plain(tx, &ada, &[second])?;
            commit(tx)
        })
        .unwrap();

    layout
        .store
        .with_read_tx(|tx| {
            assert_eq!(layout.by_family.read_term_targets(tx, &first, Window::all())?, vec![grace]);
            assert_eq!(layout.by_family.read_term_targets(tx, &second, Window::all())?, vec![ada]);
            assert_eq!(layout.by_family.count(tx, &first)?, 1);
            Ok::<_, StateError>(())
        })
        .unwrap();
}

#[test]
fn test_priorities_order_and_window_targets() {
    let dir = TestDir::new();
    let layout = open(&dir.store_path());
    let family = FamilyId::new(1);
    let base = Utc.with_ymd_and_hms(2015, 5, 1, 0, 0, 0).single().unwrap();

    layout
        .store
        .with_write_tx(|tx| {
            // Written out of order; ids descend as birthdays ascend.
            for (id, days) in [(3, 10), (1, 30), (4, 0), (2, 20)] {
                let birthday = base + Duration::days(days);
                layout.by_birthday.set_target_single_term_ext(tx, &PersonId::new(id), &birthday, &family)?;
            }
            commit(tx)
        })
        .unwrap();

    let ids = |window| {
        layout
            .store
            .with_read_tx(|tx| layout.by_birthday.read_term_targets(tx, &family, window))
            .unwrap()
            .into_iter()
            .map(|id: PersonId| id.value())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(Window::all()), vec![4, 3, 2, 1]);
    assert_eq!(ids(Window::all().with_offset(1).with_limit(2)), vec![3, 2]);
    assert_eq!(ids(Window::all().descending().with_limit(1)), vec![1]);
}

#[test]
fn test_reader_snapshot_is_stable_during_commit() {
    let dir = TestDir::new();
    let layout = open(&dir.store_path());
    let ada = PersonId::new(1);
    layout
        .store
        .with_write_tx(|tx| {
            layout.names.write(tx, &ada, &"ada".to_string())?;
            commit(tx)
        })
        .unwrap();

    let opened = Barrier::new(2);
    let committed = Barrier::new(2);
    thread::scope(|scope| {
        scope.spawn(|| {
            layout
                .store
                .with_read_tx(|tx| {
                    opened.wait();
                    committed.wait();
                    assert_eq!(layout.names.read(tx, &ada)?.as_deref(), Some("ada"));
                    assert_eq!(layout.names.len(tx)?, 1);
                    Ok::<_, StateError>(())
                })
                .unwrap();
        });

        opened.wait();
        layout
            .store
            .with_write_tx(|tx| {
                layout.names.write(tx, &ada, &"countess".to_string())?;
                layout.names.write(tx, &PersonId::new(2), &"grace".to_string())?;
                commit(tx)
            })
            .unwrap();
        committed.wait();
    });

    let after = layout.store.with_read_tx(|tx| layout.names.read(tx, &ada)).unwrap();
    assert_eq!(after.as_deref(), Some("countess"));
}

#[test]
fn test_process_marker_survives_reopen() {
    let dir = TestDir::new();
    let path = dir.store_path();
    {
        let layout = open(&path);
        let ran = layout
            .store
            .apply_process("2024-seed-names", |tx| {
                layout.names.write(tx, &PersonId::new(1), &"seed".to_string())?;
                Ok::<_, StateError>(())
            })
            .unwrap();
        assert!(ran);
    }

    let layout = open(&path);
    let ran = layout.store.apply_process("2024-seed-names", |_| Ok::<_, StateError>(())).unwrap();
    assert!(!ran);
    assert_eq!(layout.store.applied_processes().unwrap()[0].0, "2024-seed-names");
    assert!(layout.store.with_read_tx(|tx| layout.names.has_key(tx, &PersonId::new(1))).unwrap());
}
