//! Database iterator for scanning key-value pairs.
//!
//! Keys come from a snapshot of the index taken when the iterator is
//! created; values are read when each entry is reached.

use crate::index::IndexIterator;
use crate::{Result, DB};

/// An iterator over key-value pairs in the database.
///
/// Keys deleted after the iterator was created are skipped; keys written
/// after it was created are not visited.
///
/// # Example
///
/// ```rust,no_run
/// use caskdb::{DB, IteratorOptions, Options};
///
/// # fn main() -> Result<(), caskdb::Error> {
/// let db = DB::open("./data", Options::default())?;
///
/// db.put(b"user:1", b"alice")?;
/// db.put(b"user:2", b"bob")?;
/// db.put(b"order:1", b"book")?;
///
/// // Visit every user in key order
/// for entry in db.iter(IteratorOptions::default().prefix(b"user:")) {
///     let (key, value) = entry?;
///     println!("{:?} => {:?}", key, value);
/// }
/// # Ok(())
/// # }
/// ```
pub struct DBIterator<'a> {
    /// Reference to the database
    db: &'a DB,

    /// Cursor over the index snapshot
    index_iter: Box<dyn IndexIterator>,
}

impl<'a> DBIterator<'a> {
    pub(crate) fn new(db: &'a DB, index_iter: Box<dyn IndexIterator>) -> Self {
        Self { db, index_iter }
    }

    /// Goes back to the first entry.
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
    }

    /// Positions the iterator at the first key >= `key`, or <= `key` when
    /// iterating in reverse.
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
    }
}

impl<'a> Iterator for DBIterator<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = {
                let (key, _) = self.index_iter.next()?;
                key.to_vec()
            };

            // Resolve through the live index so a concurrent merge cannot
            // leave us pointing at a replaced file
            match self.db.get(&key) {
                Ok(Some(value)) => return Some(Ok((key, value))),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
