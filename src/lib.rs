//! # CaskDb - An Embedded Log-Structured Storage Engine
//!
//! CaskDb is a persistent key-value storage engine built on an append-only
//! log with an in-memory position index, in the style of Bitcask. On top of
//! the flat key space it layers Redis-like hash, list, set and sorted-set
//! types.
//!
//! ## Architecture
//!
//! The storage engine consists of several key components:
//!
//! - **Data files**: Append-only files of CRC-checked log records
//! - **Index**: In-memory map from key to record position (B-tree, skip list or hash)
//! - **Write batch**: Atomic, sequence-numbered multi-key commits
//! - **Merge**: Online compaction that rewrites live records and emits a hint file
//! - **Structure**: Hash/list/set/sorted-set types encoded over flat keys
//! - **Command**: A synchronous dispatch entry point for protocol handlers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use caskdb::{DB, Options};
//!
//! # fn main() -> Result<(), caskdb::Error> {
//! // Open or create a database
//! let options = Options::default();
//! let db = DB::open("./data", options)?;
//!
//! // Write operations
//! db.put(b"key1", b"value1")?;
//! db.put(b"key2", b"value2")?;
//!
//! // Read operations
//! if let Some(value) = db.get(b"key1")? {
//!     println!("Found: {:?}", value);
//! }
//!
//! // Delete operations
//! db.delete(b"key1")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod batch;
pub mod command;
pub mod config;
pub mod data;
pub mod error;
pub mod index;
pub mod iterator;
pub mod merge;
pub mod structure;
pub mod util;

// Re-exports
pub use batch::WriteBatch;
pub use command::{CommandResult, Executor, Instruction};
pub use config::{IndexType, IteratorOptions, Options, WriteBatchOptions};
pub use error::{Error, Result};
pub use iterator::DBIterator;
pub use structure::{DataType, Structure};

use data::log_record::{encode_log_record_key, parse_log_record_key, NON_TRANSACTION_SEQ_NO};
use data::{DataFile, LogRecord, LogRecordPos, LogRecordType};
use index::Indexer;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Files and counters guarded by the database's exclusive write lock.
pub(crate) struct FileState {
    /// The file new records are appended to
    pub(crate) active: Arc<DataFile>,

    /// Immutable files, keyed by id
    pub(crate) older: HashMap<u32, Arc<DataFile>>,

    /// Sequence number of the last committed write batch
    pub(crate) seq_no: u64,
}

impl FileState {
    /// Resolve a file id to its data file.
    pub(crate) fn file(&self, file_id: u32) -> Result<Arc<DataFile>> {
        if self.active.file_id() == file_id {
            return Ok(Arc::clone(&self.active));
        }
        self.older
            .get(&file_id)
            .cloned()
            .ok_or_else(|| Error::corruption(format!("Data file {} is missing", file_id)))
    }
}

/// Statistics about a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Number of live keys
    pub key_num: usize,
    /// Number of data files, active one included
    pub data_file_num: usize,
    /// Bytes held by stale records that a merge would reclaim
    pub reclaimable_size: u64,
    /// Bytes used by the database directory
    pub disk_size: u64,
}

/// The main database handle.
///
/// This is the primary interface for interacting with the storage engine.
/// It supports basic key-value operations: put, get, and delete.
///
/// # Thread Safety
///
/// `DB` is designed to be thread-safe and can be safely shared across threads
/// using `Arc<DB>`. Reads run concurrently; writes, batch commits and file
/// rotation are serialized behind one exclusive lock.
pub struct DB {
    /// Database directory path
    path: PathBuf,

    /// Configuration options
    options: Options,

    /// Active file, older files and the sequence counter
    state: RwLock<FileState>,

    /// Key -> position index
    index: Box<dyn Indexer>,

    /// Set while a merge is running
    merging: AtomicBool,

    /// Bytes appended since the last sync
    bytes_write: AtomicUsize,

    /// Bytes held by records no longer referenced by the index
    reclaim_size: AtomicU64,
}

impl DB {
    /// Opens a database at the specified path with the given options.
    ///
    /// If the database does not exist, it will be created.
    /// If it exists, it will be opened and the index rebuilt from disk.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored
    /// * `options` - Configuration options for the database
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path is invalid or inaccessible
    /// - Recovery finds a record whose checksum does not match
    /// - Insufficient permissions
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use caskdb::{DB, Options};
    ///
    /// # fn main() -> Result<(), caskdb::Error> {
    /// let options = Options::default();
    /// let db = DB::open("./my_database", options)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Validate options
        options.validate()?;

        // Step 1: Create directory if not exists
        if !path.exists() {
            if options.create_if_missing {
                std::fs::create_dir_all(&path)?;
            } else {
                return Err(Error::NotFound(format!(
                    "Database directory does not exist: {:?}",
                    path
                )));
            }
        } else if options.error_if_exists {
            return Err(Error::AlreadyExists(format!("Database already exists: {:?}", path)));
        }

        // Step 2: Finish or discard a merge interrupted by a crash
        merge::apply_pending_merge(&path)?;

        // Step 3: Open every data file; the newest one becomes active
        let file_ids = data::list_data_file_ids(&path)?;
        let mut older = HashMap::new();
        let mut active = None;
        for (i, &file_id) in file_ids.iter().enumerate() {
            let file = Arc::new(DataFile::open(&path, file_id)?);
            if i == file_ids.len() - 1 {
                active = Some(file);
            } else {
                older.insert(file_id, file);
            }
        }
        let active = match active {
            Some(file) => file,
            None => Arc::new(DataFile::open(&path, 0)?),
        };

        let db = DB {
            index: index::new_indexer(options.index_type),
            path,
            options,
            state: RwLock::new(FileState { active, older, seq_no: NON_TRANSACTION_SEQ_NO }),
            merging: AtomicBool::new(false),
            bytes_write: AtomicUsize::new(0),
            reclaim_size: AtomicU64::new(0),
        };

        // Step 4: Rebuild the index, hint file first
        let non_merge_file_id = db.load_index_from_hint_file()?;
        let seq_no = db.load_index_from_data_files(&file_ids, non_merge_file_id)?;
        db.state.write().seq_no = seq_no;

        log::info!(
            "Opened database at {:?}: {} keys in {} data files",
            db.path,
            db.index.size(),
            file_ids.len().max(1)
        );

        Ok(db)
    }

    /// Inserts a key-value pair into the database.
    ///
    /// If the key already exists, its value will be overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty, the record does not fit in a
    /// data file, or the write fails due to I/O errors.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use caskdb::{DB, Options};
    /// # fn main() -> Result<(), caskdb::Error> {
    /// # let db = DB::open("./data", Options::default())?;
    /// db.put(b"key", b"value")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        check_key(key)?;

        let record =
            LogRecord::normal(encode_log_record_key(key, NON_TRANSACTION_SEQ_NO), value.to_vec());

        let mut state = self.state.write();
        let pos = self.append_log_record(&mut state, &record)?;
        self.sync_if_needed(&state)?;

        // The index changes only once the record is on disk
        if let Some(old) = self.index.put(key.to_vec(), pos) {
            self.reclaim_size.fetch_add(old.size as u64, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Retrieves the value associated with a key.
    ///
    /// Returns `None` if the key does not exist or has been deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails due to I/O errors or if the
    /// record's checksum does not match.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use caskdb::{DB, Options};
    /// # fn main() -> Result<(), caskdb::Error> {
    /// # let db = DB::open("./data", Options::default())?;
    /// if let Some(value) = db.get(b"key")? {
    ///     println!("Found: {:?}", value);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        check_key(key)?;

        // Resolve under the shared lock so a merge cannot swap files in between
        let (pos, file) = {
            let state = self.state.read();
            let pos = match self.index.get(key) {
                Some(pos) => pos,
                None => return Ok(None),
            };
            (pos, state.file(pos.file_id)?)
        };

        let record = file.read_at_pos(&pos)?;
        match record.rec_type {
            LogRecordType::Deleted => Ok(None),
            _ => Ok(Some(record.value)),
        }
    }

    /// Deletes a key from the database.
    ///
    /// A tombstone is appended even if the key is unknown; stale records are
    /// removed by the next merge.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use caskdb::{DB, Options};
    /// # fn main() -> Result<(), caskdb::Error> {
    /// # let db = DB::open("./data", Options::default())?;
    /// db.delete(b"key")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        check_key(key)?;

        let record = LogRecord::deleted(encode_log_record_key(key, NON_TRANSACTION_SEQ_NO));

        let mut state = self.state.write();
        let pos = self.append_log_record(&mut state, &record)?;
        self.sync_if_needed(&state)?;

        // The tombstone itself is garbage as soon as it is written
        self.reclaim_size.fetch_add(pos.size as u64, Ordering::SeqCst);
        if let Some(old) = self.index.delete(key) {
            self.reclaim_size.fetch_add(old.size as u64, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Returns all live keys in ascending order.
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        self.index.list_keys()
    }

    /// Calls `f` for every live key-value pair in key order until it returns false.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let mut iter = self.iter(IteratorOptions::default());
        for entry in &mut iter {
            let (key, value) = entry?;
            if !f(&key, &value) {
                break;
            }
        }
        Ok(())
    }

    /// Returns an iterator over the database.
    pub fn iter(&self, options: IteratorOptions) -> DBIterator<'_> {
        DBIterator::new(self, self.index.iterator(options))
    }

    /// Syncs the active data file to disk.
    pub fn sync(&self) -> Result<()> {
        let state = self.state.read();
        state.active.sync()?;
        self.bytes_write.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Closes the database, ensuring all data is synced to disk.
    pub fn close(&self) -> Result<()> {
        self.sync()?;
        log::info!("Database closed successfully");
        Ok(())
    }

    /// Returns statistics about the database.
    pub fn stat(&self) -> Result<Stat> {
        let data_file_num = {
            let state = self.state.read();
            state.older.len() + 1
        };
        Ok(Stat {
            key_num: self.index.size(),
            data_file_num,
            reclaimable_size: self.reclaim_size.load(Ordering::SeqCst),
            disk_size: util::dir_disk_size(&self.path)?,
        })
    }

    /// Copies the database files into `dir`.
    ///
    /// Writers are blocked for the duration of the copy.
    pub fn backup<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let state = self.state.read();
        state.active.sync()?;
        util::copy_dir(&self.path, dir.as_ref(), &[])?;
        log::info!("Backed up {:?} to {:?}", self.path, dir.as_ref());
        Ok(())
    }

    /// Returns the database directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the options the database was opened with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Appends a record to the active file, rotating it first if the record
    /// would push it past `data_file_size`.
    pub(crate) fn append_log_record(
        &self,
        state: &mut FileState,
        record: &LogRecord,
    ) -> Result<LogRecordPos> {
        let encoded = record.encode();
        let len = encoded.len() as u64;

        if len > self.options.data_file_size {
            return Err(Error::capacity(format!(
                "Record of {} bytes exceeds data_file_size {}",
                len, self.options.data_file_size
            )));
        }

        if state.active.write_offset() + len > self.options.data_file_size {
            self.rotate_active_file(state)?;
        }

        let offset = state.active.write(&encoded)?;
        self.bytes_write.fetch_add(encoded.len(), Ordering::SeqCst);

        Ok(LogRecordPos { file_id: state.active.file_id(), offset, size: len as u32 })
    }

    /// Seals the active file and opens the next one.
    pub(crate) fn rotate_active_file(&self, state: &mut FileState) -> Result<()> {
        state.active.sync()?;
        self.bytes_write.store(0, Ordering::SeqCst);

        let new_file_id = state.active.file_id() + 1;
        let new_active = Arc::new(DataFile::open(&self.path, new_file_id)?);
        let old_active = std::mem::replace(&mut state.active, new_active);

        log::info!("Rotated data file {} -> {}", old_active.file_id(), new_file_id);
        state.older.insert(old_active.file_id(), old_active);

        Ok(())
    }

    /// Applies the sync policy after a write.
    pub(crate) fn sync_if_needed(&self, state: &FileState) -> Result<()> {
        let unsynced = self.bytes_write.load(Ordering::SeqCst);
        let threshold_hit =
            self.options.bytes_per_sync > 0 && unsynced >= self.options.bytes_per_sync;

        if self.options.sync_writes || threshold_hit {
            state.active.sync()?;
            self.bytes_write.store(0, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Appends every record of a batch under one sequence number, then the
    /// marker that commits them, and only then updates the index.
    pub(crate) fn write_batch_records(
        &self,
        records: &HashMap<Vec<u8>, LogRecord>,
        sync: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        state.seq_no += 1;
        let seq_no = state.seq_no;

        let mut positions = Vec::with_capacity(records.len());
        for (key, record) in records {
            let on_disk = LogRecord::new(
                encode_log_record_key(key, seq_no),
                record.value.clone(),
                record.rec_type,
            );
            let pos = self.append_log_record(&mut state, &on_disk)?;
            positions.push((key, record.rec_type, pos));
        }

        let finished = LogRecord::new(
            encode_log_record_key(data::log_record::BATCH_FINISHED_KEY, seq_no),
            Vec::new(),
            LogRecordType::BatchFinished,
        );
        let finished_pos = self.append_log_record(&mut state, &finished)?;
        self.reclaim_size.fetch_add(finished_pos.size as u64, Ordering::SeqCst);

        if sync {
            state.active.sync()?;
            self.bytes_write.store(0, Ordering::SeqCst);
        } else {
            self.sync_if_needed(&state)?;
        }

        for (key, rec_type, pos) in positions {
            self.apply_to_index(key.clone(), rec_type, pos);
        }

        Ok(())
    }

    /// Folds one committed record into the index.
    fn apply_to_index(&self, key: Vec<u8>, rec_type: LogRecordType, pos: LogRecordPos) {
        let displaced = match rec_type {
            LogRecordType::Normal => self.index.put(key, pos),
            LogRecordType::Deleted => {
                self.reclaim_size.fetch_add(pos.size as u64, Ordering::SeqCst);
                self.index.delete(&key)
            }
            LogRecordType::BatchFinished => None,
        };
        if let Some(old) = displaced {
            self.reclaim_size.fetch_add(old.size as u64, Ordering::SeqCst);
        }
    }

    /// Replays data files into the index, returning the largest sequence
    /// number seen.
    ///
    /// Files below `non_merge_file_id` are covered by the hint file and
    /// skipped. Batched records are held back until their batch's finished
    /// marker is read; batches without one are discarded.
    fn load_index_from_data_files(
        &self,
        file_ids: &[u32],
        non_merge_file_id: Option<u32>,
    ) -> Result<u64> {
        let mut current_seq = NON_TRANSACTION_SEQ_NO;
        let mut pending: HashMap<u64, Vec<(Vec<u8>, LogRecordType, LogRecordPos)>> =
            HashMap::new();

        let state = self.state.read();
        for (i, &file_id) in file_ids.iter().enumerate() {
            if non_merge_file_id.is_some_and(|non_merge| file_id < non_merge) {
                continue;
            }

            let file = state.file(file_id)?;
            let mut offset = 0u64;
            while let Some(read) = file.read_log_record(offset)? {
                let pos = LogRecordPos { file_id, offset, size: read.size as u32 };
                let (real_key, seq_no) = parse_log_record_key(&read.record.key)?;
                let rec_type = read.record.rec_type;

                if seq_no == NON_TRANSACTION_SEQ_NO {
                    self.apply_to_index(real_key, rec_type, pos);
                } else if rec_type == LogRecordType::BatchFinished {
                    self.reclaim_size.fetch_add(pos.size as u64, Ordering::SeqCst);
                    for (key, rec_type, pos) in pending.remove(&seq_no).unwrap_or_default() {
                        self.apply_to_index(key, rec_type, pos);
                    }
                } else {
                    pending.entry(seq_no).or_default().push((real_key, rec_type, pos));
                }

                current_seq = current_seq.max(seq_no);
                offset += read.size as u64;
            }

            if offset < file.write_offset() {
                log::warn!(
                    "Data file {} has {} unreadable trailing bytes after offset {}",
                    file_id,
                    file.write_offset() - offset,
                    offset
                );
                // New appends must follow the last valid record
                if i == file_ids.len() - 1 {
                    file.truncate(offset)?;
                }
            }
        }

        if !pending.is_empty() {
            log::warn!("Discarded {} uncommitted write batch(es) during recovery", pending.len());
            for records in pending.into_values() {
                for (_, _, pos) in records {
                    self.reclaim_size.fetch_add(pos.size as u64, Ordering::SeqCst);
                }
            }
        }

        Ok(current_seq)
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        // Ignore errors during drop as we can't propagate them
        if let Err(e) = self.state.read().active.sync() {
            log::error!("Error syncing data file during drop: {}", e);
        }
    }
}

/// Keys must be non-empty.
fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_argument("key must not be empty"));
    }
    Ok(())
}
