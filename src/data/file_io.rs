//! Standard file I/O used by data files.

use crate::error::Result;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// An append-only file with positional reads.
///
/// Appends and reads share one handle behind a mutex, so a read never
/// observes a partially written append.
pub struct FileIO {
    path: PathBuf,
    fd: Mutex<File>,
}

impl FileIO {
    /// Open the file, creating it if it doesn't exist.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        Ok(Self { path, fd: Mutex::new(file) })
    }

    /// Read into `buf` starting at `offset`.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()`
    /// only when the end of the file is reached.
    pub fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut file = self.fd.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    /// Append `buf` to the end of the file.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut file = self.fd.lock();
        file.write_all(buf)?;
        Ok(buf.len())
    }

    /// Flush file contents and metadata to persistent storage.
    pub fn sync(&self) -> Result<()> {
        self.fd.lock().sync_all()?;
        Ok(())
    }

    /// Cut the file down to `len` bytes. Later appends land at the new end.
    pub fn truncate(&self, len: u64) -> Result<()> {
        let file = self.fd.lock();
        file.set_len(len)?;
        file.sync_all()?;
        Ok(())
    }

    /// Current length of the file on disk.
    pub fn size(&self) -> Result<u64> {
        Ok(self.fd.lock().metadata()?.len())
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
