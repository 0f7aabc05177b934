//! Online merge (compaction) of data files.
//!
//! A merge seals the active file, rewrites every live record from the sealed
//! files into a sibling `<dir>-merge` directory and writes a hint file
//! mapping each rewritten key to its new position. A `merge-finished` marker
//! is synced last; only a merge directory holding that marker is ever moved
//! into the database directory, so a crash at any point leaves either the
//! old files or the complete merged set in place.
//!
//! Writes keep flowing to the new active file while records are rewritten.
//! When the merged files are swapped in, each rewritten key is moved to its
//! new position only if the index still points where the merge read it.

use crate::data::log_record::{encode_log_record_key, parse_log_record_key, NON_TRANSACTION_SEQ_NO};
use crate::data::{
    data_file_name, DataFile, LogRecord, LogRecordPos, LogRecordType, HINT_FILE_NAME,
    MERGE_FINISHED_FILE_NAME,
};
use crate::error::{Error, Result};
use crate::{util, Options, DB};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const MERGE_DIR_SUFFIX: &str = "-merge";
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

/// Contents of the `merge-finished` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MergeFinished {
    /// Files with a smaller id were merge inputs
    pub(crate) non_merge_file_id: u32,
    /// The merge produced files `0..merged_file_count`
    pub(crate) merged_file_count: u32,
}

impl MergeFinished {
    /// Merged files must take ids left free by the inputs.
    fn validate(&self) -> Result<()> {
        if self.merged_file_count > self.non_merge_file_id {
            return Err(Error::InvalidState(format!(
                "Merge produced {} files for {} input ids",
                self.merged_file_count, self.non_merge_file_id
            )));
        }
        Ok(())
    }
}

/// A live record moved by the merge.
struct Rewritten {
    key: Vec<u8>,
    old_pos: LogRecordPos,
    new_pos: LogRecordPos,
}

/// Output of the rewrite phase, waiting to be swapped in.
struct PreparedMerge {
    merge_dir: PathBuf,
    finished: MergeFinished,
    rewritten: Vec<Rewritten>,
    reclaim_at_start: u64,
}

/// Clears the merging flag however the merge ends.
struct MergeGuard<'a>(&'a AtomicBool);

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Directory a merge of `dir` writes into.
pub(crate) fn merge_path(dir: &Path) -> PathBuf {
    match dir.file_name() {
        Some(name) => {
            let mut name = name.to_os_string();
            name.push(MERGE_DIR_SUFFIX);
            dir.with_file_name(name)
        }
        None => dir.join(MERGE_DIR_SUFFIX),
    }
}

impl DB {
    /// Rewrites live records into fresh files and drops the stale ones.
    ///
    /// Reads and writes continue while the merge runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MergeInProgress`] if another merge is running.
    pub fn merge(&self) -> Result<()> {
        if self
            .merging
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::MergeInProgress);
        }
        let _guard = MergeGuard(&self.merging);

        self.run_merge()
    }

    /// Merges only if the reclaimable share of disk usage has reached
    /// `merge_ratio`. Returns whether a merge ran.
    pub fn maybe_merge(&self) -> Result<bool> {
        let disk_size = util::dir_disk_size(&self.path)?;
        if disk_size == 0 {
            return Ok(false);
        }

        let reclaimable = self.reclaim_size.load(Ordering::SeqCst);
        let ratio = reclaimable as f64 / disk_size as f64;
        if ratio < self.options.merge_ratio as f64 {
            log::debug!(
                "Skipping merge: reclaimable ratio {:.2} below {:.2}",
                ratio,
                self.options.merge_ratio
            );
            return Ok(false);
        }

        self.merge()?;
        Ok(true)
    }

    fn run_merge(&self) -> Result<()> {
        match self.prepare_merge()? {
            Some(prepared) => self.install_merge(prepared),
            None => Ok(()),
        }
    }

    /// Writes the merged files, hint and marker into the merge directory.
    /// Returns `None` when there is nothing to merge.
    fn prepare_merge(&self) -> Result<Option<PreparedMerge>> {
        // Step 1: seal the active file so every input is immutable
        let (inputs, non_merge_file_id, reclaim_at_start) = {
            let mut state = self.state.write();
            if state.older.is_empty() && state.active.write_offset() == 0 {
                log::debug!("Nothing to merge");
                return Ok(None);
            }
            self.rotate_active_file(&mut state)?;

            let mut inputs: Vec<Arc<DataFile>> = state.older.values().cloned().collect();
            inputs.sort_by_key(|f| f.file_id());
            (inputs, state.active.file_id(), self.reclaim_size.load(Ordering::SeqCst))
        };

        log::info!(
            "Starting merge of {} data files below id {}",
            inputs.len(),
            non_merge_file_id
        );

        // Step 2: rewrite live records into a fresh directory
        let merge_dir = merge_path(&self.path);
        if merge_dir.exists() {
            fs::remove_dir_all(&merge_dir)?;
        }

        let merge_options = Options {
            create_if_missing: true,
            error_if_exists: false,
            sync_writes: false,
            bytes_per_sync: 0,
            ..self.options.clone()
        };
        let merge_db = DB::open(&merge_dir, merge_options)?;
        let hint_file = DataFile::open_hint_file(&merge_dir)?;

        let mut rewritten = Vec::new();
        for file in &inputs {
            let mut offset = 0u64;
            while let Some(read) = file.read_log_record(offset)? {
                let old_pos = LogRecordPos {
                    file_id: file.file_id(),
                    offset,
                    size: read.size as u32,
                };
                offset += read.size as u64;

                if read.record.rec_type != LogRecordType::Normal {
                    continue;
                }
                let (key, _) = parse_log_record_key(&read.record.key)?;
                if !self.index.get(&key).is_some_and(|pos| same_location(&pos, &old_pos)) {
                    continue;
                }

                let record = LogRecord::normal(
                    encode_log_record_key(&key, NON_TRANSACTION_SEQ_NO),
                    read.record.value,
                );
                let new_pos = {
                    let mut merge_state = merge_db.state.write();
                    merge_db.append_log_record(&mut merge_state, &record)?
                };
                hint_file.write_hint_record(&key, &new_pos)?;
                rewritten.push(Rewritten { key, old_pos, new_pos });
            }
        }

        merge_db.sync()?;
        hint_file.sync()?;
        let merged_file_count = merge_db.state.read().active.file_id() + 1;
        drop(merge_db);

        let finished = MergeFinished { non_merge_file_id, merged_file_count };
        // A marker that cannot be applied must never reach the disk
        if let Err(e) = finished.validate() {
            fs::remove_dir_all(&merge_dir)?;
            return Err(e);
        }
        write_merge_finished(&merge_dir, &finished)?;

        Ok(Some(PreparedMerge { merge_dir, finished, rewritten, reclaim_at_start }))
    }

    /// Swaps the merged files in under the exclusive lock.
    fn install_merge(&self, prepared: PreparedMerge) -> Result<()> {
        let PreparedMerge { merge_dir, finished, rewritten, reclaim_at_start } = prepared;

        let mut state = self.state.write();

        for file_id in 0..finished.non_merge_file_id {
            state.older.remove(&file_id);
        }
        apply_merge_dir(&self.path, &merge_dir, &finished)?;
        for file_id in 0..finished.merged_file_count {
            state.older.insert(file_id, Arc::new(DataFile::open(&self.path, file_id)?));
        }

        let mut moved = 0usize;
        for entry in rewritten {
            // A write or delete that raced the merge keeps its own position
            if self.index.get(&entry.key).is_some_and(|pos| same_location(&pos, &entry.old_pos)) {
                self.index.put(entry.key, entry.new_pos);
                moved += 1;
            }
        }

        // Garbage counted before the merge lived in the inputs, which are gone
        let _ = self.reclaim_size.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |size| {
            Some(size.saturating_sub(reclaim_at_start))
        });

        log::info!(
            "Merge finished: {} live records moved into {} data files",
            moved,
            finished.merged_file_count
        );
        Ok(())
    }

    /// Loads the hint file left by a completed merge, returning the first
    /// file id it does not cover.
    pub(crate) fn load_index_from_hint_file(&self) -> Result<Option<u32>> {
        let finished = match read_merge_finished(&self.path)? {
            Some(finished) => finished,
            None => return Ok(None),
        };

        if self.path.join(HINT_FILE_NAME).exists() {
            let hint_file = DataFile::open_hint_file(&self.path)?;
            let mut offset = 0u64;
            let mut loaded = 0usize;
            while let Some(read) = hint_file.read_log_record(offset)? {
                let pos = LogRecordPos::decode(&read.record.value)?;
                self.index.put(read.record.key, pos);
                offset += read.size as u64;
                loaded += 1;
            }
            log::info!("Loaded {} keys from hint file", loaded);
        }

        Ok(Some(finished.non_merge_file_id))
    }
}

/// Completes or discards a merge directory left by an earlier process.
///
/// Called before the database files are opened.
pub(crate) fn apply_pending_merge(dir: &Path) -> Result<()> {
    let merge_dir = merge_path(dir);
    if !merge_dir.is_dir() {
        return Ok(());
    }

    match read_merge_finished(&merge_dir) {
        Ok(Some(finished)) if finished.validate().is_err() => {
            log::warn!(
                "Discarding merge at {:?}: {} merged files do not fit below id {}",
                merge_dir,
                finished.merged_file_count,
                finished.non_merge_file_id
            );
            fs::remove_dir_all(&merge_dir)?;
            Ok(())
        }
        Ok(Some(finished)) => {
            log::info!("Completing interrupted merge from {:?}", merge_dir);
            apply_merge_dir(dir, &merge_dir, &finished)
        }
        Ok(None) => {
            log::warn!("Discarding incomplete merge at {:?}", merge_dir);
            fs::remove_dir_all(&merge_dir)?;
            Ok(())
        }
        Err(e) => {
            log::warn!("Discarding merge at {:?} with unreadable marker: {}", merge_dir, e);
            fs::remove_dir_all(&merge_dir)?;
            Ok(())
        }
    }
}

/// Moves a finished merge into `dir`. Safe to repeat after a crash.
fn apply_merge_dir(dir: &Path, merge_dir: &Path, finished: &MergeFinished) -> Result<()> {
    finished.validate()?;

    for file_id in 0..finished.non_merge_file_id {
        let src = merge_dir.join(data_file_name(file_id));
        let dst = dir.join(data_file_name(file_id));
        if file_id < finished.merged_file_count {
            if src.exists() {
                fs::rename(&src, &dst)?;
            }
        } else if dst.exists() {
            fs::remove_file(&dst)?;
        }
    }

    // The marker moves last: once it is in `dir` the hint beside it is current
    let hint = merge_dir.join(HINT_FILE_NAME);
    if hint.exists() {
        fs::rename(&hint, dir.join(HINT_FILE_NAME))?;
    }
    let marker = merge_dir.join(MERGE_FINISHED_FILE_NAME);
    if marker.exists() {
        fs::rename(&marker, dir.join(MERGE_FINISHED_FILE_NAME))?;
    }

    fs::remove_dir_all(merge_dir)?;
    Ok(())
}

fn write_merge_finished(dir: &Path, finished: &MergeFinished) -> Result<()> {
    let marker = DataFile::open_merge_finished_file(dir)?;
    let record = LogRecord::normal(MERGE_FINISHED_KEY.to_vec(), bincode::serialize(finished)?);
    marker.write(&record.encode())?;
    marker.sync()
}

/// Reads the marker in `dir`, if a complete one exists.
fn read_merge_finished(dir: &Path) -> Result<Option<MergeFinished>> {
    if !dir.join(MERGE_FINISHED_FILE_NAME).exists() {
        return Ok(None);
    }

    let marker = DataFile::open_merge_finished_file(dir)?;
    match marker.read_log_record(0)? {
        Some(read) => Ok(Some(bincode::deserialize(&read.record.value)?)),
        None => Ok(None),
    }
}

fn same_location(a: &LogRecordPos, b: &LogRecordPos) -> bool {
    a.file_id == b.file_id && a.offset == b.offset
}
