//! Append-only data file.

use super::file_io::FileIO;
use super::log_record::{
    decode_header, Decoded, LogRecord, LogRecordPos, MAX_LOG_RECORD_HEADER_SIZE,
};
use super::{data_file_name, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME};
use crate::error::{Error, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A record read back from a data file, with its encoded size.
#[derive(Debug, Clone)]
pub struct ReadLogRecord {
    /// The decoded record
    pub record: LogRecord,
    /// Number of bytes the record occupies on disk
    pub size: usize,
}

/// One numbered file of the log.
///
/// Exactly one data file is active (the append target); the rest are
/// read-only. Callers serialize appends.
pub struct DataFile {
    file_id: u32,
    write_offset: AtomicU64,
    io: FileIO,
    /// Set when a failed append could not be rolled back
    poisoned: AtomicBool,
}

impl DataFile {
    /// Open or create the data file with the given id inside `dir`.
    pub fn open<P: AsRef<Path>>(dir: P, file_id: u32) -> Result<Self> {
        Self::open_path(dir.as_ref().join(data_file_name(file_id)), file_id)
    }

    /// Open or create the hint file written by merge.
    pub fn open_hint_file<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_path(dir.as_ref().join(HINT_FILE_NAME), 0)
    }

    /// Open or create the marker written when a merge completes.
    pub fn open_merge_finished_file<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_path(dir.as_ref().join(MERGE_FINISHED_FILE_NAME), 0)
    }

    fn open_path(path: impl AsRef<Path>, file_id: u32) -> Result<Self> {
        let io = FileIO::new(path)?;
        let size = io.size()?;
        Ok(Self {
            file_id,
            write_offset: AtomicU64::new(size),
            io,
            poisoned: AtomicBool::new(false),
        })
    }

    /// Id of this file.
    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Offset at which the next append lands.
    pub fn write_offset(&self) -> u64 {
        self.write_offset.load(Ordering::SeqCst)
    }

    /// Append encoded bytes, returning the offset they were written at.
    ///
    /// A failed append is cut back off the file so the next one lands at
    /// the returned offset. If that fails too, the file refuses writes.
    pub fn write(&self, buf: &[u8]) -> Result<u64> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(Error::InvalidState(format!(
                "Data file {} has an unrecoverable partial write",
                self.file_id
            )));
        }

        let offset = self.write_offset();
        match self.io.write(buf) {
            Ok(written) => {
                self.write_offset.fetch_add(written as u64, Ordering::SeqCst);
                Ok(offset)
            }
            Err(e) => {
                self.discard_partial_write(offset);
                Err(e)
            }
        }
    }

    fn discard_partial_write(&self, offset: u64) {
        if let Err(e) = self.io.truncate(offset) {
            log::error!(
                "Failed to roll data file {} back to offset {}: {}",
                self.file_id,
                offset,
                e
            );
            self.poisoned.store(true, Ordering::SeqCst);
        }
    }

    /// Append a hint entry mapping `key` to `pos`.
    pub fn write_hint_record(&self, key: &[u8], pos: &LogRecordPos) -> Result<()> {
        let record = LogRecord::normal(key.to_vec(), pos.encode());
        self.write(&record.encode())?;
        Ok(())
    }

    /// Read the record starting at `offset`.
    ///
    /// Returns `Ok(None)` at the logical end of the file: past the last
    /// byte, at an all-zero header, or at a record cut short by a crash.
    pub fn read_log_record(&self, offset: u64) -> Result<Option<ReadLogRecord>> {
        let file_size = self.write_offset();
        if offset >= file_size {
            return Ok(None);
        }

        let header_len = (file_size - offset).min(MAX_LOG_RECORD_HEADER_SIZE as u64) as usize;
        let mut header_buf = vec![0u8; header_len];
        let read = self.io.read(&mut header_buf, offset)?;
        header_buf.truncate(read);

        let (header, header_size) = match decode_header(&header_buf) {
            Some(decoded) => decoded,
            None => return Ok(None),
        };
        if header.is_end_of_log() {
            return Ok(None);
        }

        let total = header_size + header.key_size as usize + header.value_size as usize;
        if offset + total as u64 > file_size {
            return Ok(None);
        }

        let mut buf = vec![0u8; total];
        let read = self.io.read(&mut buf, offset)?;
        if read < total {
            return Ok(None);
        }

        match LogRecord::decode(&buf)? {
            Decoded::Record(record, size) => Ok(Some(ReadLogRecord { record, size })),
            Decoded::EndOfLog | Decoded::Incomplete => Ok(None),
        }
    }

    /// Read the record a position points to. Missing bytes are corruption here.
    pub fn read_at_pos(&self, pos: &LogRecordPos) -> Result<LogRecord> {
        match self.read_log_record(pos.offset)? {
            Some(read) => Ok(read.record),
            None => Err(Error::corruption(format!(
                "No record at offset {} of data file {}",
                pos.offset, pos.file_id
            ))),
        }
    }

    /// Drop everything from `len` on, typically a torn tail found at recovery.
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.io.truncate(len)?;
        self.write_offset.store(len, Ordering::SeqCst);
        Ok(())
    }

    /// Length of the file on disk, torn bytes included.
    pub fn file_size(&self) -> Result<u64> {
        self.io.size()
    }

    /// Flush the file to persistent storage.
    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    /// Path of the file on disk.
    pub fn path(&self) -> &Path {
        self.io.path()
    }
}
