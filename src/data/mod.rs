//! Data file management.
//!
//! The log is a directory of numbered, append-only data files. Exactly one
//! file is active; older files are immutable until a merge replaces them.
//!
//! ## Layout
//!
//! ```text
//! 000000000.data   older file
//! 000000001.data   active file
//! hint-index       key -> position entries written by merge
//! merge-finished   marker recording which files a merge replaced
//! ```

pub mod data_file;
pub mod file_io;
pub mod log_record;

pub use data_file::{DataFile, ReadLogRecord};
pub use log_record::{LogRecord, LogRecordPos, LogRecordType};

use crate::error::Result;
use std::path::Path;

/// Suffix of numbered data files
pub const DATA_FILE_SUFFIX: &str = ".data";

/// Name of the hint file produced by merge
pub const HINT_FILE_NAME: &str = "hint-index";

/// Name of the marker written once a merge completes
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";

/// Generate the file name for a data file id
pub fn data_file_name(file_id: u32) -> String {
    format!("{:09}{}", file_id, DATA_FILE_SUFFIX)
}

/// Parse a data file name to extract its id
pub fn parse_data_file_name(filename: &str) -> Option<u32> {
    let name = filename.strip_suffix(DATA_FILE_SUFFIX)?;
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Ids of every data file in `dir`, ascending.
pub fn list_data_file_ids(dir: &Path) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(id) = entry.file_name().to_str().and_then(parse_data_file_name) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_file_name() {
        assert_eq!(data_file_name(0), "000000000.data");
        assert_eq!(data_file_name(123), "000000123.data");
    }

    #[test]
    fn test_parse_data_file_name() {
        assert_eq!(parse_data_file_name("000000001.data"), Some(1));
        assert_eq!(parse_data_file_name("000000123.data"), Some(123));
        assert_eq!(parse_data_file_name("hint-index"), None);
        assert_eq!(parse_data_file_name("123.log"), None);
        assert_eq!(parse_data_file_name("-1.data"), None);
        assert_eq!(parse_data_file_name(".data"), None);
    }

    #[test]
    fn test_list_data_file_ids_sorted() {
        let dir = TempDir::new().unwrap();
        for id in [10, 2, 7] {
            std::fs::write(dir.path().join(data_file_name(id)), b"").unwrap();
        }
        std::fs::write(dir.path().join(HINT_FILE_NAME), b"").unwrap();

        assert_eq!(list_data_file_ids(dir.path()).unwrap(), vec![2, 7, 10]);
    }
}
