//! Ingestion layer for the departmental CSV exports
//!
//! This module loads source files into the store. It is the only writer
//! besides [`Database::reset`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  CSV exports    │ ──► │     Loader       │ ──► │    Database     │
//! │  (glob pattern) │     │                  │     │ (statistics)    │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────────┐
//!                    │  reader              │
//!                    │  ├─ read_yearly      │
//!                    │  └─ read_monthly     │
//!                    └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crimestat_core::{Config, Database};
//! use crimestat_core::ingest::{LoadKind, Loader};
//!
//! let db = Database::open(&Config::database_path())?;
//! db.migrate()?;
//! let summary = Loader::new(&db).load("data/*.csv", LoadKind::Yearly)?;
//! println!("Inserted {} rows from {} files", summary.rows_inserted, summary.files_loaded);
//! ```

pub mod reader;

pub use crate::types::LoadKind;

use crate::db::{Database, NewLoadRun};
use crate::error::{Error, Result};
use crate::types::LoadStatus;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Result of loading every file of a pattern.
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// Files loaded successfully
    pub files_loaded: usize,
    /// Files that failed as a whole
    pub files_failed: usize,
    pub rows_read: usize,
    pub rows_inserted: usize,
    /// Rows dropped because their key already exists or a reference is missing
    pub rows_ignored: usize,
    /// Rows dropped because a field could not be parsed
    pub rows_skipped: usize,
    /// Errors encountered (file path → error message)
    pub errors: Vec<(PathBuf, String)>,
    /// Warnings from parsing
    pub warnings: Vec<String>,
}

/// Result of loading a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLoad {
    pub path: PathBuf,
    /// SHA-256 of the file contents, hex encoded
    pub file_hash: String,
    pub rows_read: usize,
    pub rows_inserted: usize,
    pub rows_ignored: usize,
    pub rows_skipped: usize,
    pub warnings: Vec<String>,
}

/// Loads CSV exports into a [`Database`].
pub struct Loader<'a> {
    db: &'a Database,
}

impl<'a> Loader<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Files matching `pattern`, sorted.
    ///
    /// A plain path is a pattern matching itself.
    pub fn discover(pattern: &str) -> Result<Vec<PathBuf>> {
        let paths = glob::glob(pattern)
            .map_err(|e| Error::Validation(format!("invalid pattern {pattern:?}: {e}")))?;
        let mut files: Vec<PathBuf> = paths
            .filter_map(|entry| match entry {
                Ok(path) if path.is_file() => Some(path),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable path while expanding pattern");
                    None
                }
            })
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(Error::Validation(format!("no file matches {pattern:?}")));
        }
        Ok(files)
    }

    /// Load every file matching `pattern`.
    pub fn load(&self, pattern: &str, kind: LoadKind) -> Result<LoadSummary> {
        self.load_with_progress(pattern, kind, |_, _, _| {})
    }

    /// Load every file matching `pattern` with progress callback.
    ///
    /// The callback receives `(current_file_index, total_files, file_path)`
    /// before each file is processed. A failing file is recorded and the
    /// remaining files are still loaded.
    pub fn load_with_progress<F>(&self, pattern: &str, kind: LoadKind, mut on_progress: F) -> Result<LoadSummary>
    where
        F: FnMut(usize, usize, &Path),
    {
        let files = Self::discover(pattern)?;
        let total = files.len();
        let mut summary = LoadSummary::default();

        for (i, path) in files.iter().enumerate() {
            on_progress(i, total, path);

            match self.load_file(path, kind) {
                Ok(file) => {
                    summary.files_loaded += 1;
                    summary.rows_read += file.rows_read;
                    summary.rows_inserted += file.rows_inserted;
                    summary.rows_ignored += file.rows_ignored;
                    summary.rows_skipped += file.rows_skipped;
                    summary.warnings.extend(
                        file.warnings
                            .into_iter()
                            .map(|w| format!("{}: {w}", path.display())),
                    );
                }
                // The store itself is failing; later files would fail too.
                Err(e @ (Error::Database(_) | Error::Storage(_) | Error::Busy(_))) => return Err(e),
                Err(e) => {
                    summary.files_failed += 1;
                    summary.errors.push((path.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(
            kind = kind.as_str(),
            files = summary.files_loaded,
            failed = summary.files_failed,
            inserted = summary.rows_inserted,
            ignored = summary.rows_ignored,
            skipped = summary.rows_skipped,
            "Load finished"
        );
        Ok(summary)
    }

    /// Load a single file and record the run.
    pub fn load_file(&self, path: &Path, kind: LoadKind) -> Result<FileLoad> {
        let started_at = Utc::now();
        let started = Instant::now();

        let bytes = std::fs::read(path)?;
        let file_hash = hex::encode(Sha256::digest(&bytes));

        let outcome = self.apply(&bytes, kind);
        let duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(mut file) => {
                file.path = path.to_path_buf();
                file.file_hash = file_hash;
                self.db.record_load_run(&NewLoadRun {
                    kind,
                    source_path: path,
                    file_hash: &file.file_hash,
                    started_at,
                    duration_ms,
                    rows_read: file.rows_read as i64,
                    rows_inserted: file.rows_inserted as i64,
                    rows_skipped: (file.rows_skipped + file.rows_ignored) as i64,
                    status: LoadStatus::Success,
                    error_message: None,
                })?;
                tracing::info!(
                    path = %path.display(),
                    kind = kind.as_str(),
                    read = file.rows_read,
                    inserted = file.rows_inserted,
                    ignored = file.rows_ignored,
                    skipped = file.rows_skipped,
                    duration_ms,
                    "Loaded file"
                );
                Ok(file)
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(record_err) = self.db.record_load_run(&NewLoadRun {
                    kind,
                    source_path: path,
                    file_hash: &file_hash,
                    started_at,
                    duration_ms,
                    rows_read: 0,
                    rows_inserted: 0,
                    rows_skipped: 0,
                    status: LoadStatus::Failed,
                    error_message: Some(&message),
                }) {
                    tracing::warn!(error = %record_err, "Failed to record load run");
                }
                tracing::warn!(path = %path.display(), error = %err, "Load failed");
                Err(err)
            }
        }
    }

    fn apply(&self, bytes: &[u8], kind: LoadKind) -> Result<FileLoad> {
        let mut file = FileLoad {
            path: PathBuf::new(),
            file_hash: String::new(),
            rows_read: 0,
            rows_inserted: 0,
            rows_ignored: 0,
            rows_skipped: 0,
            warnings: Vec::new(),
        };
        match kind {
            LoadKind::Yearly => {
                let batch = reader::read_yearly(bytes)?;
                let outcome = self.db.apply_yearly_batch(
                    &batch.regions,
                    &batch.departments,
                    &batch.categories,
                    &batch.statistics,
                )?;
                file.rows_read = batch.rows_read;
                file.rows_skipped = batch.rows_skipped;
                file.rows_inserted = outcome.inserted;
                file.rows_ignored = outcome.ignored;
                file.warnings = batch.warnings;
            }
            LoadKind::Monthly => {
                let batch = reader::read_monthly(bytes)?;
                let outcome = self.db.apply_monthly_batch(&batch.statistics)?;
                file.rows_read = batch.rows_read;
                file.rows_skipped = batch.rows_skipped;
                file.rows_inserted = outcome.inserted;
                file.rows_ignored = outcome.ignored;
                file.warnings = batch.warnings;
            }
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const YEARLY: &str = "Code.département;Code.région;annee;classe;unité.de.compte;faits;POP;LOG;tauxpourmille\n\
        75;11;21;Vols;infraction;4200;2150000;1390000;1,95\n\
        75;11;22;Vols;infraction;4600;2100000;1400000;2,19\n\
        92;11;22;Vols;infraction;1500;1600000;750000;0,94\n\
        92;11;22;Vols;infraction;1500;1600000;750000;0,94\n";

    fn setup() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        (dir, db)
    }

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_reload_does_not_duplicate() {
        let (dir, db) = setup();
        let path = write(&dir, "stats.csv", YEARLY);
        let loader = Loader::new(&db);

        let first = loader.load_file(&path, LoadKind::Yearly).unwrap();
        assert_eq!(first.rows_read, 4);
        assert_eq!(first.rows_inserted, 3);
        assert_eq!(first.rows_ignored, 1);

        let second = loader.load_file(&path, LoadKind::Yearly).unwrap();
        assert_eq!(second.rows_inserted, 0);
        assert_eq!(second.file_hash, first.file_hash);
        assert_eq!(db.counts().unwrap().yearly_statistics, 3);
        assert_eq!(db.list_load_runs(10).unwrap().len(), 2);
    }

    #[test]
    fn test_pattern_loads_every_file() {
        let (dir, db) = setup();
        write(&dir, "a.csv", YEARLY);
        write(&dir, "b.csv", "annee;classe\n22;Vols\n");
        let pattern = dir.path().join("*.csv");

        let mut seen = Vec::new();
        let summary = Loader::new(&db)
            .load_with_progress(&pattern.to_string_lossy(), LoadKind::Yearly, |i, total, _| {
                seen.push((i, total))
            })
            .unwrap();
        assert_eq!(seen, vec![(0, 2), (1, 2)]);
        assert_eq!(summary.files_loaded, 1);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.rows_inserted, 3);

        let runs = db.list_load_runs(10).unwrap();
        assert!(runs.iter().any(|r| r.status == LoadStatus::Failed));
    }

    #[test]
    fn test_monthly_rows_need_known_department() {
        let (dir, db) = setup();
        let loader = Loader::new(&db);
        loader
            .load_file(&write(&dir, "y.csv", YEARLY), LoadKind::Yearly)
            .unwrap();
        let monthly = "Code.département;classe;annee;mois;faits\n\
                       75;Vols;22;1;380\n\
                       99;Vols;22;1;10\n";
        let file = loader
            .load_file(&write(&dir, "m.csv", monthly), LoadKind::Monthly)
            .unwrap();
        assert_eq!(file.rows_inserted, 1);
        assert_eq!(file.rows_ignored, 1);
    }

    #[test]
    fn test_empty_pattern_is_validation_error() {
        let (dir, _db) = setup();
        let pattern = dir.path().join("*.csv");
        let err = Loader::discover(&pattern.to_string_lossy()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
