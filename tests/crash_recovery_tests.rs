// Crash Recovery Tests for CaskDb
// These tests verify data consistency after simulated crashes

use caskdb::data::log_record::{encode_log_record_key, BATCH_FINISHED_KEY};
use caskdb::data::{data_file_name, list_data_file_ids, DataFile, LogRecord, LogRecordType};
use caskdb::{Options, WriteBatchOptions, DB};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Helper function to simulate a crash by dropping DB without proper close
/// Uses mem::forget to prevent Drop from running (simulates abrupt termination)
fn simulate_crash(db: DB) {
    std::mem::forget(db);
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The data file new records go to.
fn active_file(path: &Path) -> DataFile {
    let ids = list_data_file_ids(path).unwrap();
    DataFile::open(path, *ids.last().unwrap()).unwrap()
}

/// Test recovery after crash during write operations
#[test]
fn test_recovery_after_write_crash() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    // First session: write data and simulate crash
    {
        let db = DB::open(&path, Options::default()).unwrap();

        for i in 0..100 {
            let key = format!("key_{}", i);
            let value = format!("value_{}", i);
            db.put(key.as_bytes(), value.as_bytes()).unwrap();
        }

        simulate_crash(db);
    }

    // Second session: recover and verify
    {
        let db = DB::open(&path, Options::default()).unwrap();

        for i in 0..100 {
            let key = format!("key_{}", i);
            let expected = format!("value_{}", i);
            assert_eq!(
                db.get(key.as_bytes()).unwrap(),
                Some(expected.into_bytes()),
                "Key {} should be recovered after crash",
                key
            );
        }
    }
}

/// Opening the same directory repeatedly must yield the same state
#[test]
fn test_recovery_is_idempotent() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let options = Options::default().data_file_size(1024);

    {
        let db = DB::open(dir.path(), options.clone()).unwrap();
        for i in 0..200 {
            db.put(format!("key{}", i % 50).as_bytes(), format!("v{}", i).as_bytes()).unwrap();
            if i % 7 == 0 {
                db.delete(format!("key{}", i % 13).as_bytes()).unwrap();
            }
        }
        simulate_crash(db);
    }

    let snapshot = |db: &DB| -> Vec<(Vec<u8>, Vec<u8>)> {
        db.iter(Default::default()).collect::<Result<_, _>>().unwrap()
    };

    let first = {
        let db = DB::open(dir.path(), options.clone()).unwrap();
        let state = snapshot(&db);
        simulate_crash(db);
        state
    };
    let second = {
        let db = DB::open(dir.path(), options.clone()).unwrap();
        snapshot(&db)
    };

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

/// A record cut short by a crash is ignored and later writes still recover
#[test]
fn test_recovery_with_torn_tail() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    {
        let db = DB::open(&path, Options::default()).unwrap();
        db.put(b"intact", b"value").unwrap();
        simulate_crash(db);
    }

    // Half a record at the end of the active file
    let torn = LogRecord::normal(encode_log_record_key(b"torn", 0), vec![7u8; 64]).encode();
    {
        let file_path = path.join(data_file_name(0));
        let mut file = OpenOptions::new().append(true).open(file_path).unwrap();
        file.write_all(&torn[..torn.len() / 2]).unwrap();
        file.sync_all().unwrap();
    }

    {
        let db = DB::open(&path, Options::default()).unwrap();
        assert_eq!(db.get(b"intact").unwrap(), Some(b"value".to_vec()));
        assert_eq!(db.get(b"torn").unwrap(), None);

        db.put(b"after", b"crash").unwrap();
    }

    let db = DB::open(&path, Options::default()).unwrap();
    assert_eq!(db.get(b"intact").unwrap(), Some(b"value".to_vec()));
    assert_eq!(db.get(b"after").unwrap(), Some(b"crash".to_vec()));
}

/// Records of a batch whose finished marker never hit the disk are dropped
#[test]
fn test_uncommitted_batch_discarded() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    {
        let db = DB::open(&path, Options::default()).unwrap();
        db.put(b"A", b"old").unwrap();
        simulate_crash(db);
    }

    // A batch setting A and creating B, interrupted before its marker
    {
        let file = active_file(&path);
        let seq = 1;
        let set_a = LogRecord::normal(encode_log_record_key(b"A", seq), b"new".to_vec());
        let set_b = LogRecord::normal(encode_log_record_key(b"B", seq), b"b".to_vec());
        file.write(&set_a.encode()).unwrap();
        file.write(&set_b.encode()).unwrap();
        file.sync().unwrap();
    }

    let db = DB::open(&path, Options::default()).unwrap();
    assert_eq!(db.get(b"A").unwrap(), Some(b"old".to_vec()));
    assert_eq!(db.get(b"B").unwrap(), None);
}

/// A batch that sets A and deletes B leaves both untouched without its marker
#[test]
fn test_uncommitted_batch_delete_discarded() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    {
        let db = DB::open(&path, Options::default()).unwrap();
        db.put(b"B", b"kept").unwrap();
        simulate_crash(db);
    }

    {
        let file = active_file(&path);
        let seq = 1;
        let set_a = LogRecord::normal(encode_log_record_key(b"A", seq), b"new".to_vec());
        let delete_b = LogRecord::deleted(encode_log_record_key(b"B", seq));
        file.write(&set_a.encode()).unwrap();
        file.write(&delete_b.encode()).unwrap();
        file.sync().unwrap();
    }

    let db = DB::open(&path, Options::default()).unwrap();
    assert_eq!(db.get(b"A").unwrap(), None);
    assert_eq!(db.get(b"B").unwrap(), Some(b"kept".to_vec()));
    assert_eq!(db.stat().unwrap().key_num, 1);
}

/// The same batch is applied once its finished marker is present
#[test]
fn test_batch_applied_when_marker_present() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    {
        let db = DB::open(&path, Options::default()).unwrap();
        db.put(b"A", b"old").unwrap();
        simulate_crash(db);
    }

    {
        let file = active_file(&path);
        let seq = 1;
        let set_a = LogRecord::normal(encode_log_record_key(b"A", seq), b"new".to_vec());
        let set_b = LogRecord::normal(encode_log_record_key(b"B", seq), b"b".to_vec());
        let finished = LogRecord::new(
            encode_log_record_key(BATCH_FINISHED_KEY, seq),
            Vec::new(),
            LogRecordType::BatchFinished,
        );
        for record in [set_a, set_b, finished] {
            file.write(&record.encode()).unwrap();
        }
        file.sync().unwrap();
    }

    let db = DB::open(&path, Options::default()).unwrap();
    assert_eq!(db.get(b"A").unwrap(), Some(b"new".to_vec()));
    assert_eq!(db.get(b"B").unwrap(), Some(b"b".to_vec()));

    // New batches get a sequence number past the recovered one
    let batch = db.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.put(b"C", b"c").unwrap();
    batch.commit().unwrap();
    drop(db);

    let db = DB::open(&path, Options::default()).unwrap();
    assert_eq!(db.get(b"C").unwrap(), Some(b"c".to_vec()));
}

/// Committed batches survive a crash right after commit
#[test]
fn test_committed_batch_survives_crash() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    {
        let db = DB::open(&path, Options::default()).unwrap();
        let batch = db.new_write_batch(WriteBatchOptions::default()).unwrap();
        for i in 0..100 {
            batch.put(format!("batch_key_{}", i).as_bytes(), b"v").unwrap();
        }
        batch.delete(b"batch_key_0").unwrap();
        batch.commit().unwrap();
        simulate_crash(db);
    }

    let db = DB::open(&path, Options::default()).unwrap();
    assert_eq!(db.stat().unwrap().key_num, 99);
    assert_eq!(db.get(b"batch_key_0").unwrap(), None);
    assert_eq!(db.get(b"batch_key_99").unwrap(), Some(b"v".to_vec()));
}

/// Deletes and overwrites replay in log order across rotated files
#[test]
fn test_recovery_across_rotated_files() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let options = Options::default().data_file_size(512);

    {
        let db = DB::open(dir.path(), options.clone()).unwrap();
        db.put(b"a", b"1").unwrap();
        db.put(b"a", b"2").unwrap();
        for i in 0..100 {
            db.put(format!("filler{}", i).as_bytes(), &[0u8; 16]).unwrap();
        }
        db.delete(b"a").unwrap();
        for i in 0..100 {
            db.put(format!("filler{}", i).as_bytes(), &[1u8; 16]).unwrap();
        }
        db.put(b"a", b"3").unwrap();
        simulate_crash(db);
    }

    assert!(list_data_file_ids(dir.path()).unwrap().len() > 2);

    let db = DB::open(dir.path(), options).unwrap();
    assert_eq!(db.get(b"a").unwrap(), Some(b"3".to_vec()));
    assert_eq!(db.get(b"filler42").unwrap(), Some(vec![1u8; 16]));
}
