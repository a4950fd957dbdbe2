#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Partition-safe CSV append writer.
//!
//! Each partition key owns one CSV file. The first append to a
//! not-yet-existing file writes the header row (the record's field paths)
//! followed by the first data row; every later append writes a data row
//! only. Many concurrent tasks share the writer, so each partition has an
//! async mutex that is held for the entire
//! exists-check → header-if-new → append → flush sequence. Rows therefore
//! never interleave, and the header is written exactly once per file.
//!
//! Locks for the known partition universe (50 states + `unknown` +
//! `failed`) are provisioned up front; an unexpected key gets its lock
//! lazily behind the table's own guard, so the lazy path is race-free too.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use npi_harvest_record::{FlatRecord, partition_universe};

/// Errors that can occur while appending a record.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Opening or creating the partition file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the row failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Appends flattened records to per-partition CSV files.
pub struct PartitionWriter {
    /// Directory holding all partition files.
    directory: PathBuf,
    /// File name prefix; a partition file is `{prefix}_{key}.csv`.
    prefix: String,
    /// One async mutex per partition key. The table itself is behind a
    /// plain mutex, held only long enough to clone out the per-key lock.
    locks: std::sync::Mutex<BTreeMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PartitionWriter {
    /// Creates a writer rooted at `directory`, creating it if needed,
    /// with locks provisioned for the whole partition-key universe.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Io`] if the directory cannot be created.
    pub fn new(directory: &Path, prefix: &str) -> Result<Self, WriteError> {
        std::fs::create_dir_all(directory)?;

        let locks = partition_universe()
            .map(|key| (key.to_owned(), Arc::new(tokio::sync::Mutex::new(()))))
            .collect();

        Ok(Self {
            directory: directory.to_owned(),
            prefix: prefix.to_owned(),
            locks: std::sync::Mutex::new(locks),
        })
    }

    /// Returns the path of the partition file for the given key.
    #[must_use]
    pub fn partition_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}_{key}.csv", self.prefix))
    }

    /// Returns the per-key lock, provisioning one if the key is outside
    /// the pre-allocated universe.
    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Appends one record to the partition's file, writing the header
    /// first if the file does not exist yet.
    ///
    /// The partition lock is held across the whole check-and-write
    /// sequence and released on every exit path, so an I/O error never
    /// wedges the partition. The file I/O itself runs on the blocking
    /// thread pool, keeping the async workers free for in-flight lookups.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] if the file cannot be opened or the row
    /// cannot be written. The error is also logged here, since a single
    /// lost row is not fatal to the run.
    pub async fn append(&self, key: &str, record: &FlatRecord) -> Result<(), WriteError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let path = self.partition_path(key);
        let row = record.clone();
        let result = match tokio::task::spawn_blocking(move || write_row(&path, &row)).await {
            Ok(result) => result,
            Err(e) => Err(WriteError::Io(std::io::Error::other(e))),
        };

        if let Err(ref e) = result {
            log::error!("Failed to append record to partition {key}: {e}");
        }
        result
    }
}

/// The critical section: exists-check, header-if-new, data row, flush.
/// Callers must hold the partition lock.
fn write_row(path: &Path, record: &FlatRecord) -> Result<(), WriteError> {
    let is_new = !path.exists();

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if is_new {
        writer.write_record(record.fields())?;
    }
    writer.write_record(record.values())?;
    writer.flush().map_err(WriteError::Io)?;

    Ok(())
}
