// Integration tests for CaskDb
// These tests exercise the public API end to end

use caskdb::{
    DataType, Executor, Instruction, IteratorOptions, Options, Structure, WriteBatchOptions, DB,
};
use std::sync::Arc;
use tempfile::TempDir;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn args(items: &[&str]) -> Vec<Vec<u8>> {
    items.iter().map(|s| s.as_bytes().to_vec()).collect()
}

#[test]
fn test_basic_workflow() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), Options::default()).unwrap();

    // Insert
    for i in 0..100 {
        db.put(format!("key{:03}", i).as_bytes(), format!("value{}", i).as_bytes()).unwrap();
    }

    // Update
    for i in 0..50 {
        db.put(format!("key{:03}", i).as_bytes(), b"updated").unwrap();
    }

    // Delete
    for i in 90..100 {
        db.delete(format!("key{:03}", i).as_bytes()).unwrap();
    }

    assert_eq!(db.get(b"key010").unwrap(), Some(b"updated".to_vec()));
    assert_eq!(db.get(b"key060").unwrap(), Some(b"value60".to_vec()));
    assert_eq!(db.get(b"key095").unwrap(), None);
    assert_eq!(db.list_keys().len(), 90);

    let stat = db.stat().unwrap();
    assert_eq!(stat.key_num, 90);
    assert!(stat.reclaimable_size > 0);
}

#[test]
fn test_options_from_json() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let options = Options::from_json(
        r#"{ "data_file_size": 4096, "index_type": "SkipList", "sync_writes": true }"#,
    )
    .unwrap();

    let db = DB::open(dir.path(), options).unwrap();
    db.put(b"k", b"v").unwrap();
    assert_eq!(db.options().data_file_size, 4096);
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_invalid_options_rejected() {
    let dir = TempDir::new().unwrap();
    assert!(DB::open(dir.path(), Options::default().data_file_size(0)).is_err());
    assert!(DB::open(dir.path(), Options::default().merge_ratio(1.5)).is_err());
}

#[test]
fn test_prefix_scan_after_reopen() {
    init_logger();
    let dir = TempDir::new().unwrap();
    {
        let db = DB::open(dir.path(), Options::default()).unwrap();
        for user in ["alice", "bob", "carol"] {
            db.put(format!("user:{}", user).as_bytes(), user.as_bytes()).unwrap();
            db.put(format!("order:{}", user).as_bytes(), b"1").unwrap();
        }
    }

    let db = DB::open(dir.path(), Options::default()).unwrap();
    let users: Vec<_> = db
        .iter(IteratorOptions::default().prefix(b"user:"))
        .map(|entry| entry.unwrap().1)
        .collect();
    assert_eq!(users, vec![b"alice".to_vec(), b"bob".to_vec(), b"carol".to_vec()]);
}

#[test]
fn test_batch_visible_atomically() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), Options::default()).unwrap();
    db.put(b"B", b"to-delete").unwrap();

    let batch = db.new_write_batch(WriteBatchOptions::default()).unwrap();
    batch.put(b"A", b"1").unwrap();
    batch.delete(b"B").unwrap();

    assert_eq!(db.get(b"A").unwrap(), None);
    assert_eq!(db.get(b"B").unwrap(), Some(b"to-delete".to_vec()));

    batch.commit().unwrap();
    assert_eq!(db.get(b"A").unwrap(), Some(b"1".to_vec()));
    assert_eq!(db.get(b"B").unwrap(), None);
}

/// A recreated hash hides fields of its previous version without deleting them
#[test]
fn test_composite_versioning() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let db = Arc::new(DB::open(dir.path(), Options::default()).unwrap());
    let s = Structure::new(Arc::clone(&db));

    s.hset(b"h", b"f", b"v").unwrap();
    let keys_with_field = db.list_keys().len();

    // Replacing the value drops it logically in O(1)
    s.del(b"h").unwrap();
    s.hset(b"h", b"g", b"w").unwrap();

    assert_eq!(s.hget(b"h", b"f").unwrap(), None);
    assert_eq!(s.hget(b"h", b"g").unwrap(), Some(b"w".to_vec()));
    assert_eq!(s.hlen(b"h").unwrap(), 1);

    // Meta plus two generations of fields are still indexed
    assert_eq!(db.list_keys().len(), keys_with_field + 1);
}

#[test]
fn test_structures_survive_reopen_and_merge() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");
    let options = Options::default().data_file_size(2048);

    {
        let db = Arc::new(DB::open(&path, options.clone()).unwrap());
        let s = Structure::new(Arc::clone(&db));

        for i in 0..30 {
            s.hset(b"hash", format!("f{}", i).as_bytes(), b"v").unwrap();
            s.rpush(b"list", format!("e{}", i).as_bytes()).unwrap();
            s.zadd(b"zset", i as f64, format!("m{}", i).as_bytes()).unwrap();
        }
        for i in 0..10 {
            s.hdel(b"hash", format!("f{}", i).as_bytes()).unwrap();
            s.lpop(b"list").unwrap();
            s.zadd(b"zset", 100.0 + i as f64, format!("m{}", i).as_bytes()).unwrap();
        }
        db.merge().unwrap();
    }

    let db = Arc::new(DB::open(&path, options).unwrap());
    let s = Structure::new(db);

    assert_eq!(s.key_type(b"hash").unwrap(), Some(DataType::Hash));
    assert_eq!(s.hlen(b"hash").unwrap(), 20);
    assert_eq!(s.hgetall(b"hash").unwrap().len(), 20);
    assert_eq!(s.llen(b"list").unwrap(), 20);
    assert_eq!(s.lindex(b"list", 0).unwrap(), Some(b"e10".to_vec()));
    assert_eq!(s.zcard(b"zset").unwrap(), 30);

    let top = s.zrange_by_score(b"zset", 100.0, f64::INFINITY).unwrap();
    assert_eq!(top.len(), 10);
    assert_eq!(top[0], (b"m0".to_vec(), 100.0));
    assert_eq!(s.zrange_by_score(b"zset", 0.0, 9.5).unwrap().len(), 0);
}

#[test]
fn test_executor_end_to_end() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let db = Arc::new(DB::open(dir.path(), Options::default()).unwrap());
    let executor = Executor::new(Structure::new(db));

    let exec = |name: &str, items: &[&str]| {
        let instruction: Instruction = name.parse().unwrap();
        executor.exec(instruction, &args(items))
    };

    assert!(exec("set", &["greeting", "hello"]).success);
    assert_eq!(exec("GET", &["greeting"]).data, b"hello");
    assert_eq!(exec("hset", &["user", "name", "ada"]).data, b"1");
    assert_eq!(exec("hget", &["user", "name"]).data, b"ada");
    assert_eq!(exec("type", &["user"]).data, b"hash");
    assert_eq!(exec("zadd", &["board", "-1.25", "ada"]).data, b"1");
    assert_eq!(exec("zscore", &["board", "ada"]).data, b"-1.25");

    let wrong = exec("lpush", &["user", "x"]);
    assert!(!wrong.success);
    assert!(wrong.error.unwrap().contains("Wrong type"));

    assert_eq!(exec("delete", &["user"]).data, b"1");
    assert!(!exec("hget", &["user", "name"]).success);
}
