//! Snapshot isolation under concurrent readers and a writer.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::{sync::Arc, thread};

use kinship_store::{Database, InMemoryBackend, ReadAccess};

fn counter(txn: &impl ReadAccess) -> u64 {
    txn.get("counters", b"n")
        .unwrap()
        .map(|bytes| u64::from_be_bytes(bytes.try_into().unwrap()))
        .unwrap_or(0)
}

#[test]
fn test_readers_never_see_partial_commits() {
    let db: Arc<Database<InMemoryBackend>> = Arc::new(Database::open_in_memory().unwrap());
    {
        let mut txn = db.write().unwrap();
        txn.create_bucket("counters").unwrap();
        txn.commit().unwrap();
    }

    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for i in 1u64..=200 {
                let mut txn = db.write().unwrap();
                // Both keys always move together.
                txn.insert("counters", b"n", &i.to_be_bytes()).unwrap();
                txn.insert("counters", b"m", &i.to_be_bytes()).unwrap();
                txn.commit().unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let mut last_seen = 0;
                for _ in 0..200 {
                    let txn = db.read().unwrap();
                    let n = counter(&txn);
                    let m = txn.get("counters", b"m").unwrap().map(<[u8]>::to_vec);
                    assert_eq!(m.map(|b| u64::from_be_bytes(b.try_into().unwrap())).unwrap_or(0), n);
                    assert!(n >= last_seen, "snapshots go forward");
                    last_seen = n;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(counter(&db.read().unwrap()), 200);
    assert_eq!(db.stats().unwrap().live_readers, 0);
}

#[test]
fn test_long_reader_keeps_its_snapshot() {
    let db = Database::open_in_memory().unwrap();
    {
        let mut txn = db.write().unwrap();
        txn.create_bucket("counters").unwrap();
        txn.insert("counters", b"n", &1u64.to_be_bytes()).unwrap();
        txn.commit().unwrap();
    }

    let pinned = db.read().unwrap();
    for i in 2u64..10 {
        let mut txn = db.write().unwrap();
        txn.insert("counters", b"n", &i.to_be_bytes()).unwrap();
        txn.commit().unwrap();
    }
    db.compact().unwrap();

    assert_eq!(counter(&pinned), 1);
    assert_eq!(counter(&db.read().unwrap()), 9);
}
