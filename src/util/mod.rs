//! Shared helpers.

pub mod coding;

use std::path::Path;

/// Total size in bytes of the regular files directly inside `dir`.
pub fn dir_disk_size(dir: &Path) -> crate::Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(dir)? {
        let metadata = entry?.metadata()?;
        if metadata.is_file() {
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Copies every regular file of `src` into `dst`, skipping names in `exclude`.
pub fn copy_dir(src: &Path, dst: &Path, exclude: &[&str]) -> crate::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|e| name.to_str() == Some(*e)) {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            copy_dir(&path, &dst.join(&name), exclude)?;
        } else {
            std::fs::copy(&path, dst.join(&name))?;
        }
    }
    Ok(())
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
