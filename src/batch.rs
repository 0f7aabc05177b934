//! Write batch for atomic multi-key updates.
//!
//! A batch collects puts and deletes in memory. On commit every record is
//! appended under one fresh sequence number, followed by a finished marker;
//! recovery applies the records only if that marker made it to disk.

use crate::config::WriteBatchOptions;
use crate::data::LogRecord;
use crate::error::{Error, Result};
use crate::DB;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A batch of write operations that are applied atomically.
///
/// Later operations on a key replace earlier ones in the same batch.
///
/// # Example
///
/// ```rust,no_run
/// use caskdb::{DB, Options, WriteBatchOptions};
///
/// # fn main() -> Result<(), caskdb::Error> {
/// let db = DB::open("./data", Options::default())?;
/// let batch = db.new_write_batch(WriteBatchOptions::default())?;
/// batch.put(b"key1", b"value1")?;
/// batch.put(b"key2", b"value2")?;
/// batch.delete(b"key3")?;
/// batch.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct WriteBatch<'a> {
    pending: Mutex<HashMap<Vec<u8>, LogRecord>>,
    db: &'a DB,
    options: WriteBatchOptions,
}

impl DB {
    /// Creates a write batch bound to this database.
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> Result<WriteBatch<'_>> {
        if options.max_batch_num == 0 {
            return Err(Error::invalid_argument("max_batch_num must be greater than 0"));
        }
        Ok(WriteBatch { pending: Mutex::new(HashMap::new()), db: self, options })
    }
}

impl<'a> WriteBatch<'a> {
    /// Stages a put operation.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("key must not be empty"));
        }
        let record = LogRecord::normal(key.to_vec(), value.to_vec());
        self.pending.lock().insert(key.to_vec(), record);
        Ok(())
    }

    /// Stages a delete operation.
    ///
    /// Deleting a key the database doesn't hold only drops a pending put.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("key must not be empty"));
        }

        let mut pending = self.pending.lock();
        if self.db.get(key)?.is_none() {
            pending.remove(key);
            return Ok(());
        }
        pending.insert(key.to_vec(), LogRecord::deleted(key.to_vec()));
        Ok(())
    }

    /// Returns the number of staged operations.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drops every staged operation.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Applies every staged operation atomically.
    ///
    /// Committing an empty batch is a no-op. The staged operations are
    /// cleared on success and kept on failure.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num {
            return Err(Error::capacity(format!(
                "Batch holds {} operations, limit is {}",
                pending.len(),
                self.options.max_batch_num
            )));
        }

        self.db.write_batch_records(&pending, self.options.sync_writes)?;
        pending.clear();
        Ok(())
    }
}
