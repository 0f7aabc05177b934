//! Basic usage example for CaskDb
//!
//! This example demonstrates the fundamental operations:
//! - Opening a database
//! - Writing, reading and deleting keys
//! - Committing a write batch
//! - Running commands through the executor
//! - Merging stale records away

use caskdb::{Executor, Instruction, Options, Structure, WriteBatchOptions, DB};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    // Configure database options
    let options = Options::default()
        .data_file_size(4 * 1024 * 1024) // 4MB
        .sync_writes(false);

    // Open database (will be created if it doesn't exist)
    let db = Arc::new(DB::open("./example_data", options)?);
    println!("Database opened successfully");

    // Write some key-value pairs
    println!("Writing data...");
    db.put(b"key1", b"value1")?;
    db.put(b"key2", b"value2")?;
    db.put(b"key3", b"value3")?;

    // Read values
    if let Some(value) = db.get(b"key1")? {
        println!("key1 => {:?}", String::from_utf8_lossy(&value));
    }

    // Delete a key
    db.delete(b"key2")?;
    match db.get(b"key2")? {
        Some(_) => println!("key2 still exists (unexpected)"),
        None => println!("key2 was successfully deleted"),
    }

    // Atomic multi-key write
    let batch = db.new_write_batch(WriteBatchOptions::default())?;
    batch.put(b"account:alice", b"90")?;
    batch.put(b"account:bob", b"110")?;
    batch.commit()?;
    println!("Batch committed, {} keys live", db.list_keys().len());

    // Commands over the composite types
    let executor = Executor::new(Structure::new(Arc::clone(&db)));
    let commands: [(&str, &[&str]); 4] = [
        ("HSET", &["user:1", "name", "ada"]),
        ("HGET", &["user:1", "name"]),
        ("RPUSH", &["queue", "job-1"]),
        ("LLEN", &["queue"]),
    ];
    for (name, args) in commands {
        let instruction: Instruction = name.parse()?;
        let args: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        let result = executor.exec(instruction, &args);
        match result.error {
            Some(error) => println!("{} failed: {}", name, error),
            None => println!("{} => {}", name, String::from_utf8_lossy(&result.data)),
        }
    }

    // Drop stale records
    db.merge()?;
    let stat = db.stat()?;
    println!(
        "After merge: {} keys, {} data files, {} bytes on disk",
        stat.key_num, stat.data_file_num, stat.disk_size
    );

    db.close()?;
    println!("Database closed");

    Ok(())
}
