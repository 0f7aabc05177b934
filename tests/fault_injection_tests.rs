// Fault Injection Tests for CaskDb
// These tests damage files on disk and verify the damage is detected

use caskdb::data::{data_file_name, HINT_FILE_NAME};
use caskdb::{Error, Options, DB};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::TempDir;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Flip one bit of the byte at `offset` (negative counts from the end).
fn flip_bit(file: &Path, offset: i64) {
    let mut f = OpenOptions::new().read(true).write(true).open(file).unwrap();
    let pos = if offset < 0 {
        f.seek(SeekFrom::End(offset)).unwrap()
    } else {
        f.seek(SeekFrom::Start(offset as u64)).unwrap()
    };

    let mut byte = [0u8; 1];
    f.read_exact(&mut byte).unwrap();
    byte[0] ^= 0x01;

    f.seek(SeekFrom::Start(pos)).unwrap();
    f.write_all(&byte).unwrap();
    f.sync_all().unwrap();
}

/// A flipped bit in a replayed record makes open fail
#[test]
fn test_bit_flip_detected_at_open() {
    init_logger();
    let dir = TempDir::new().unwrap();

    {
        let db = DB::open(dir.path(), Options::default()).unwrap();
        db.put(b"key1", b"value1").unwrap();
        db.put(b"key2", b"value2").unwrap();
        db.close().unwrap();
    }

    // Last byte of the file belongs to the value of key2
    flip_bit(&dir.path().join(data_file_name(0)), -1);

    match DB::open(dir.path(), Options::default()) {
        Err(Error::ChecksumMismatch { expected, actual }) => assert_ne!(expected, actual),
        Err(e) => panic!("expected checksum mismatch, got {}", e),
        Ok(_) => panic!("open should refuse a corrupted log"),
    }
}

/// A flipped bit in the middle of the log is fatal too
#[test]
fn test_bit_flip_in_first_record() {
    init_logger();
    let dir = TempDir::new().unwrap();

    {
        let db = DB::open(dir.path(), Options::default()).unwrap();
        db.put(b"first", b"aaaaaaaa").unwrap();
        db.put(b"second", b"bbbbbbbb").unwrap();
    }

    // Inside the first record's value: crc(4) type(1) sizes(2) key(1 + 5)
    flip_bit(&dir.path().join(data_file_name(0)), 14);

    let err = DB::open(dir.path(), Options::default()).err().unwrap();
    assert!(err.is_integrity(), "unexpected error: {}", err);
}

/// Files covered by a hint are not replayed, so damage surfaces on read
#[test]
fn test_bit_flip_in_merged_file_detected_on_get() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    {
        let db = DB::open(&path, Options::default()).unwrap();
        db.put(b"key", b"value").unwrap();
        db.put(b"key", b"value").unwrap();
        db.merge().unwrap();
    }
    assert!(path.join(HINT_FILE_NAME).exists());

    flip_bit(&path.join(data_file_name(0)), -1);

    let db = DB::open(&path, Options::default()).unwrap();
    let err = db.get(b"key").unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch { .. }), "unexpected error: {}", err);
}

/// Zero padding at the end of a file reads as end of log
#[test]
fn test_zero_padding_is_end_of_log() {
    init_logger();
    let dir = TempDir::new().unwrap();

    {
        let db = DB::open(dir.path(), Options::default()).unwrap();
        db.put(b"key", b"value").unwrap();
    }

    {
        let mut f = OpenOptions::new()
            .append(true)
            .open(dir.path().join(data_file_name(0)))
            .unwrap();
        f.write_all(&[0u8; 64]).unwrap();
    }

    let db = DB::open(dir.path(), Options::default()).unwrap();
    assert_eq!(db.get(b"key").unwrap(), Some(b"value".to_vec()));

    db.put(b"next", b"write").unwrap();
    drop(db);

    let db = DB::open(dir.path(), Options::default()).unwrap();
    assert_eq!(db.get(b"next").unwrap(), Some(b"write".to_vec()));
}

/// Unrelated files in the directory are ignored
#[test]
fn test_foreign_files_ignored() {
    init_logger();
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("README"), b"not a data file").unwrap();
    fs::write(dir.path().join("abc.data"), b"bad name").unwrap();

    let db = DB::open(dir.path(), Options::default()).unwrap();
    db.put(b"k", b"v").unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
}
