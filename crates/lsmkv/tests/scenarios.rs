//! End-to-end scenarios exercising `Database` through its public API only, against the
//! in-memory filesystem so tests are deterministic and do not touch disk.

use std::path::PathBuf;
use std::sync::Arc;

use lsmkv::{Database, MergeOperator, Options, ReadOptions, StringAppendOperator, WriteOptions};
use lsmkv_vfs::{Env, MemoryFs};

fn env() -> Arc<dyn Env> {
    Arc::new(MemoryFs::new())
}

fn options() -> Options {
    Options { create_if_missing: true, ..Options::default() }
}

fn open(env: Arc<dyn Env>) -> Database {
    Database::open_with_env(env, PathBuf::from("/db"), options()).unwrap()
}

#[test]
fn scenario_a_basic_put_get_delete() {
    let db = open(env());

    db.put(b"a", b"1", WriteOptions::default()).unwrap();
    db.put(b"b", b"2", WriteOptions::default()).unwrap();
    db.delete(b"a", WriteOptions::default()).unwrap();
    db.put(b"c", b"3", WriteOptions::default()).unwrap();

    assert_eq!(db.get(b"a", ReadOptions::default()).unwrap(), None);
    assert_eq!(db.get(b"b", ReadOptions::default()).unwrap(), Some(b"2".to_vec()));
    assert_eq!(db.get(b"c", ReadOptions::default()).unwrap(), Some(b"3".to_vec()));

    let mut iter = db.iter(ReadOptions::default()).unwrap();
    let mut seen = Vec::new();
    while iter.valid() {
        seen.push((iter.key().unwrap().to_vec(), iter.value().unwrap().to_vec()));
        iter.advance();
    }
    assert_eq!(seen, vec![(b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())]);
}

#[test]
fn scenario_b_snapshot_isolation() {
    let db = open(env());

    db.put(b"k", b"v1", WriteOptions::default()).unwrap();
    let s1 = db.snapshot();
    db.put(b"k", b"v2", WriteOptions::default()).unwrap();

    assert_eq!(db.get(b"k", ReadOptions::default()).unwrap(), Some(b"v2".to_vec()));
    let read_at_s1 = ReadOptions { snapshot: Some(s1), ..ReadOptions::default() };
    assert_eq!(db.get(b"k", read_at_s1).unwrap(), Some(b"v1".to_vec()));

    db.delete(b"k", WriteOptions::default()).unwrap();
    assert_eq!(db.get(b"k", ReadOptions::default()).unwrap(), None);
    assert_eq!(db.get(b"k", read_at_s1).unwrap(), Some(b"v1".to_vec()));

    db.release_snapshot(s1);
}

#[test]
fn scenario_c_merge_fold() {
    let mut opts = options();
    opts.merge_operator = Some(Arc::new(StringAppendOperator) as Arc<dyn MergeOperator>);
    let db = Database::open_with_env(env(), PathBuf::from("/db"), opts).unwrap();

    db.put(b"k", b"a", WriteOptions::default()).unwrap();
    db.merge(b"k", b"b", WriteOptions::default()).unwrap();
    db.merge(b"k", b"c", WriteOptions::default()).unwrap();

    assert_eq!(db.get(b"k", ReadOptions::default()).unwrap(), Some(b"a,b,c".to_vec()));
}

#[test]
fn scenario_d_crash_recovery() {
    let shared_env = env();
    {
        let db = open(Arc::clone(&shared_env));
        db.put(b"x", b"1", WriteOptions { sync: true }).unwrap();
        // No explicit close: `db` is simply dropped here, simulating a crash with no
        // further operations reaching the log.
    }

    let reopened = open(shared_env);
    assert_eq!(reopened.get(b"x", ReadOptions::default()).unwrap(), Some(b"1".to_vec()));
}

#[test]
fn scenario_e_overlapping_flushes_stay_correct_after_compaction() {
    let mut opts = options();
    // Small enough that every handful of writes forces a flush, and a low L0 trigger forces
    // compaction well before the keyspace grows large.
    opts.write_buffer_size = 256;
    opts.compaction.l0_compaction_trigger = 2;
    let db = Database::open_with_env(env(), PathBuf::from("/db"), opts).unwrap();

    // Writes interleave ranges across flushes (a..d, c..f, e..h-style overlap) rather than
    // landing in disjoint blocks, so successive L0 files are forced to overlap.
    let letters: Vec<char> = ('a'..='h').collect();
    for round in 0..6 {
        for &c in &letters {
            let key = format!("{c}{round}");
            db.put(key.as_bytes(), b"value", WriteOptions::default()).unwrap();
        }
    }

    for round in 0..6 {
        for &c in &letters {
            let key = format!("{c}{round}");
            assert_eq!(
                db.get(key.as_bytes(), ReadOptions::default()).unwrap(),
                Some(b"value".to_vec()),
                "key {key} should survive compaction"
            );
        }
    }

    let mut iter = db.iter(ReadOptions::default()).unwrap();
    let mut count = 0;
    let mut previous: Option<Vec<u8>> = None;
    while iter.valid() {
        let key = iter.key().unwrap().to_vec();
        if let Some(prev) = &previous {
            assert!(prev < &key, "iterator must yield strictly ascending keys");
        }
        previous = Some(key);
        count += 1;
        iter.advance();
    }
    assert_eq!(count, letters.len() * 6);
}
