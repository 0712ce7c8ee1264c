//! Database repository layer
//!
//! Reference data lookups, the load/reset write paths and the guarded read
//! entry points the query library runs its statements through.

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Number of SQLite VM steps between two progress-handler calls.
const PROGRESS_STEPS: i32 = 1_000;

/// Execution limits applied to every statement.
#[derive(Debug, Clone)]
struct Limits {
    query_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl From<&StorageConfig> for Limits {
    fn from(config: &StorageConfig) -> Self {
        Self {
            query_timeout: config.query_timeout(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// Rows written by one load batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    /// Rows ignored because their key already exists or a reference is missing
    pub ignored: usize,
}

/// New load run, before it gets an id.
#[derive(Debug, Clone)]
pub struct NewLoadRun<'a> {
    pub kind: LoadKind,
    pub source_path: &'a Path,
    pub file_hash: &'a str,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub rows_read: i64,
    pub rows_inserted: i64,
    pub rows_skipped: i64,
    pub status: LoadStatus,
    pub error_message: Option<&'a str>,
}

/// Database handle with connection pooling (single connection for now)
///
/// The single connection sits behind a mutex, so a load or reset holding it
/// for its transaction excludes every analytical read of the same handle.
pub struct Database {
    conn: Mutex<Connection>,
    limits: Limits,
}

impl Database {
    /// Open or create a database at the given path with default limits
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &StorageConfig::default())
    }

    /// Open or create a database at the given path
    pub fn open_with(path: &Path, storage: &StorageConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;
        conn.busy_timeout(storage.busy_timeout())?;

        tracing::debug!(path = %path.display(), "Opened database");

        Ok(Self {
            conn: Mutex::new(conn),
            limits: Limits::from(storage),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(&StorageConfig::default())
    }

    /// Open an in-memory database with explicit limits
    pub fn open_in_memory_with(storage: &StorageConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
            limits: Limits::from(storage),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection()?;
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("database connection lock poisoned".to_string()))
    }

    // ============================================
    // Guarded execution
    // ============================================

    /// Run a read against the store.
    ///
    /// The closure runs under the per-query time bound and is retried with
    /// linear backoff while it fails with a transient BUSY/LOCKED error.
    pub fn read<T, F>(&self, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut(&Connection) -> Result<T>,
    {
        self.with_retry(op, false, |conn| f(conn))
    }

    /// Run a read with `PRAGMA query_only` set for its duration.
    ///
    /// SQLite refuses any write issued while the pragma is on, whatever the
    /// statement text looks like.
    pub fn read_only<T, F>(&self, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut(&Connection) -> Result<T>,
    {
        self.with_retry(op, true, |conn| f(conn))
    }

    fn with_retry<T, F>(&self, op: &str, query_only: bool, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> Result<T>,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = {
                let mut conn = self.connection()?;
                if query_only {
                    conn.pragma_update(None, "query_only", true)?;
                }
                self.install_deadline(&conn);
                let result = f(&mut *conn);
                conn.progress_handler(0, None::<fn() -> bool>);
                if query_only {
                    conn.pragma_update(None, "query_only", false)?;
                }
                result
            };

            match result {
                Err(err) if err.is_transient() && attempt < self.limits.max_retries => {
                    attempt += 1;
                    let wait = self.limits.retry_backoff * attempt;
                    tracing::warn!(op, attempt, wait_ms = wait.as_millis() as u64, error = %err, "Transient store failure, retrying");
                    std::thread::sleep(wait);
                }
                Err(err) => return Err(self.map_interrupt(op, err)),
                Ok(value) => return Ok(value),
            }
        }
    }

    fn install_deadline(&self, conn: &Connection) {
        let deadline = Instant::now() + self.limits.query_timeout;
        conn.progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
    }

    fn map_interrupt(&self, op: &str, err: Error) -> Error {
        match &err {
            Error::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::OperationInterrupted =>
            {
                tracing::warn!(op, timeout_ms = self.limits.query_timeout.as_millis() as u64, "Query interrupted");
                Error::Storage(format!(
                    "{op} exceeded the {} ms query timeout",
                    self.limits.query_timeout.as_millis()
                ))
            }
            _ => err,
        }
    }

    // ============================================
    // Load operations
    // ============================================

    /// Insert one yearly load batch in a single transaction.
    ///
    /// Regions and categories are inserted if absent. Departments keep the
    /// figures of their most recent year. Statistics whose
    /// (category, year, department) key already exists are ignored.
    pub fn apply_yearly_batch(
        &self,
        regions: &[Region],
        departments: &[Department],
        categories: &[CrimeCategory],
        statistics: &[YearlyStatistic],
    ) -> Result<BatchOutcome> {
        self.with_retry("apply_yearly_batch", false, |conn| {
            let tx = conn.transaction()?;
            let mut outcome = BatchOutcome::default();
            {
                let mut region_stmt =
                    tx.prepare_cached("INSERT OR IGNORE INTO regions (code, name) VALUES (?1, ?2)")?;
                for region in regions {
                    region_stmt.execute(params![region.code, region.name])?;
                }

                let mut dept_stmt = tx.prepare_cached(
                    r#"
                    INSERT INTO departments (code, region_code, population, housing_units, reference_year)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(code) DO UPDATE SET
                        region_code = excluded.region_code,
                        population = excluded.population,
                        housing_units = excluded.housing_units,
                        reference_year = excluded.reference_year
                    WHERE excluded.reference_year >= departments.reference_year
                    "#,
                )?;
                for dept in departments {
                    dept_stmt.execute(params![
                        dept.code,
                        dept.region_code,
                        dept.population,
                        dept.housing_units,
                        dept.reference_year,
                    ])?;
                }

                let mut cat_stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO crime_categories (name, unit_label) VALUES (?1, ?2)",
                )?;
                for cat in categories {
                    cat_stmt.execute(params![cat.name, cat.unit_label])?;
                }

                let mut stat_stmt = tx.prepare_cached(
                    r#"
                    INSERT OR IGNORE INTO yearly_statistics
                        (category, year, department, incident_count, rate_per_mille)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )?;
                for stat in statistics {
                    let changed = stat_stmt.execute(params![
                        stat.category,
                        stat.year,
                        stat.department,
                        stat.incident_count,
                        stat.rate_per_mille,
                    ])?;
                    if changed > 0 {
                        outcome.inserted += 1;
                    } else {
                        outcome.ignored += 1;
                    }
                }
            }
            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Insert one monthly load batch in a single transaction.
    ///
    /// Rows naming an unknown department or category are ignored, as are
    /// duplicate (category, year, month, department) keys.
    pub fn apply_monthly_batch(&self, statistics: &[MonthlyStatistic]) -> Result<BatchOutcome> {
        self.with_retry("apply_monthly_batch", false, |conn| {
            let tx = conn.transaction()?;
            let mut outcome = BatchOutcome::default();
            {
                let mut stmt = tx.prepare_cached(
                    r#"
                    INSERT OR IGNORE INTO monthly_statistics
                        (category, year, month, department, incident_count)
                    SELECT ?1, ?2, ?3, ?4, ?5
                    WHERE EXISTS (SELECT 1 FROM crime_categories WHERE name = ?1)
                      AND EXISTS (SELECT 1 FROM departments WHERE code = ?4)
                    "#,
                )?;
                for stat in statistics {
                    let changed = stmt.execute(params![
                        stat.category,
                        stat.year,
                        stat.month,
                        stat.department,
                        stat.incident_count,
                    ])?;
                    if changed > 0 {
                        outcome.inserted += 1;
                    } else {
                        outcome.ignored += 1;
                    }
                }
            }
            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Empty every data table, keeping the schema and the load history.
    ///
    /// Returns the counts held before the reset.
    pub fn reset(&self) -> Result<StoreCounts> {
        self.with_retry("reset", false, |conn| {
            let before = Self::counts_on(conn)?;
            let tx = conn.transaction()?;
            for table in super::schema::DATA_TABLES {
                tx.execute(&format!("DELETE FROM {table}"), [])?;
            }
            tx.commit()?;
            tracing::info!(
                yearly = before.yearly_statistics,
                monthly = before.monthly_statistics,
                "Store reset"
            );
            Ok(before)
        })
    }

    // ============================================
    // Load history
    // ============================================

    /// Record a finished load run
    pub fn record_load_run(&self, run: &NewLoadRun<'_>) -> Result<i64> {
        self.with_retry("record_load_run", false, |conn| {
            conn.execute(
                r#"
                INSERT INTO load_runs
                    (kind, source_path, file_hash, started_at, duration_ms,
                     rows_read, rows_inserted, rows_skipped, status, error_message)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    run.kind.as_str(),
                    run.source_path.to_string_lossy().to_string(),
                    run.file_hash,
                    run.started_at.to_rfc3339(),
                    run.duration_ms,
                    run.rows_read,
                    run.rows_inserted,
                    run.rows_skipped,
                    run.status.as_str(),
                    run.error_message,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Most recent load runs, newest first
    pub fn list_load_runs(&self, limit: usize) -> Result<Vec<LoadRun>> {
        self.read("list_load_runs", |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM load_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
            )?;
            let runs = stmt
                .query_map([limit as i64], Self::row_to_load_run)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(runs)
        })
    }

    fn row_to_load_run(row: &Row) -> rusqlite::Result<LoadRun> {
        let kind_str: String = row.get("kind")?;
        let status_str: String = row.get("status")?;
        let started_str: String = row.get("started_at")?;
        let path_str: String = row.get("source_path")?;

        Ok(LoadRun {
            id: row.get("id")?,
            kind: kind_str.parse().unwrap_or(LoadKind::Yearly),
            source_path: PathBuf::from(path_str),
            file_hash: row.get("file_hash")?,
            started_at: DateTime::parse_from_rfc3339(&started_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            duration_ms: row.get("duration_ms")?,
            rows_read: row.get("rows_read")?,
            rows_inserted: row.get("rows_inserted")?,
            rows_skipped: row.get("rows_skipped")?,
            status: status_str.parse().unwrap_or(LoadStatus::Failed),
            error_message: row.get("error_message")?,
        })
    }

    // ============================================
    // Reference data
    // ============================================

    /// Row counts of every data table
    pub fn counts(&self) -> Result<StoreCounts> {
        self.read("counts", |conn| Self::counts_on(conn))
    }

    fn counts_on(conn: &Connection) -> Result<StoreCounts> {
        let count = |table: &str| -> Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
        };
        Ok(StoreCounts {
            regions: count("regions")?,
            departments: count("departments")?,
            categories: count("crime_categories")?,
            yearly_statistics: count("yearly_statistics")?,
            monthly_statistics: count("monthly_statistics")?,
        })
    }

    /// Get a department by code
    pub fn get_department(&self, code: &str) -> Result<Option<Department>> {
        self.read("get_department", |conn| {
            conn.query_row(
                "SELECT * FROM departments WHERE code = ?",
                [code],
                Self::row_to_department,
            )
            .optional()
            .map_err(Error::from)
        })
    }

    /// Get a region by code
    pub fn get_region(&self, code: &str) -> Result<Option<Region>> {
        self.read("get_region", |conn| {
            conn.query_row("SELECT * FROM regions WHERE code = ?", [code], |row| {
                Ok(Region {
                    code: row.get("code")?,
                    name: row.get("name")?,
                })
            })
            .optional()
            .map_err(Error::from)
        })
    }

    /// All regions, ordered by code
    pub fn list_regions(&self) -> Result<Vec<Region>> {
        self.read("list_regions", |conn| {
            let mut stmt = conn.prepare("SELECT code, name FROM regions ORDER BY code")?;
            let regions = stmt
                .query_map([], |row| {
                    Ok(Region {
                        code: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(regions)
        })
    }

    /// Departments of a region, ordered by code
    pub fn list_departments_in_region(&self, region_code: &str) -> Result<Vec<Department>> {
        self.read("list_departments_in_region", |conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM departments WHERE region_code = ? ORDER BY code")?;
            let depts = stmt
                .query_map([region_code], Self::row_to_department)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(depts)
        })
    }

    /// All crime categories, ordered by name
    pub fn list_categories(&self) -> Result<Vec<CrimeCategory>> {
        self.read("list_categories", |conn| {
            let mut stmt =
                conn.prepare("SELECT name, unit_label FROM crime_categories ORDER BY name")?;
            let cats = stmt
                .query_map([], |row| {
                    Ok(CrimeCategory {
                        name: row.get(0)?,
                        unit_label: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(cats)
        })
    }

    fn row_to_department(row: &Row) -> rusqlite::Result<Department> {
        Ok(Department {
            code: row.get("code")?,
            region_code: row.get("region_code")?,
            population: row.get("population")?,
            housing_units: row.get("housing_units")?,
            reference_year: row.get("reference_year")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn seed(db: &Database) {
        let regions = vec![Region {
            code: "11".to_string(),
            name: Region::default_name("11"),
        }];
        let departments = vec![Department {
            code: "75".to_string(),
            region_code: "11".to_string(),
            population: 2_100_000,
            housing_units: 1_400_000,
            reference_year: 2021,
        }];
        let categories = vec![CrimeCategory {
            name: "Vols de véhicules".to_string(),
            unit_label: "véhicule".to_string(),
        }];
        let stats = vec![YearlyStatistic {
            category: "Vols de véhicules".to_string(),
            year: 2021,
            department: "75".to_string(),
            incident_count: 4200,
            rate_per_mille: Some(2.0),
        }];
        db.apply_yearly_batch(&regions, &departments, &categories, &stats)
            .unwrap();
    }

    #[test]
    fn test_yearly_batch_ignores_duplicates() {
        let db = test_db();
        seed(&db);

        let dup = YearlyStatistic {
            category: "Vols de véhicules".to_string(),
            year: 2021,
            department: "75".to_string(),
            incident_count: 1,
            rate_per_mille: Some(0.1),
        };
        let outcome = db.apply_yearly_batch(&[], &[], &[], &[dup]).unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.ignored, 1);
        assert_eq!(db.counts().unwrap().yearly_statistics, 1);
    }

    #[test]
    fn test_department_keeps_latest_figures() {
        let db = test_db();
        seed(&db);

        let older = Department {
            code: "75".to_string(),
            region_code: "11".to_string(),
            population: 1,
            housing_units: 1,
            reference_year: 2016,
        };
        let newer = Department {
            population: 2_150_000,
            reference_year: 2022,
            ..older.clone()
        };
        db.apply_yearly_batch(&[], &[older], &[], &[]).unwrap();
        assert_eq!(db.get_department("75").unwrap().unwrap().population, 2_100_000);

        db.apply_yearly_batch(&[], &[newer], &[], &[]).unwrap();
        let dept = db.get_department("75").unwrap().unwrap();
        assert_eq!(dept.population, 2_150_000);
        assert_eq!(dept.reference_year, 2022);
    }

    #[test]
    fn test_monthly_batch_skips_unknown_references() {
        let db = test_db();
        seed(&db);

        let known = MonthlyStatistic {
            category: "Vols de véhicules".to_string(),
            year: 2021,
            month: 1,
            department: "75".to_string(),
            incident_count: 300,
        };
        let unknown = MonthlyStatistic {
            department: "99".to_string(),
            ..known.clone()
        };
        let outcome = db.apply_monthly_batch(&[known, unknown]).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.ignored, 1);
    }

    #[test]
    fn test_reset_empties_data_tables() {
        let db = test_db();
        seed(&db);

        let before = db.reset().unwrap();
        assert_eq!(before.yearly_statistics, 1);
        assert_eq!(db.counts().unwrap(), StoreCounts::default());
    }

    #[test]
    fn test_load_run_roundtrip() {
        let db = test_db();
        let path = PathBuf::from("/data/departements.csv");
        let id = db
            .record_load_run(&NewLoadRun {
                kind: LoadKind::Yearly,
                source_path: &path,
                file_hash: "abc123",
                started_at: Utc::now(),
                duration_ms: 12,
                rows_read: 10,
                rows_inserted: 9,
                rows_skipped: 1,
                status: LoadStatus::Success,
                error_message: None,
            })
            .unwrap();

        let runs = db.list_load_runs(5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, id);
        assert_eq!(runs[0].source_path, path);
        assert_eq!(runs[0].rows_skipped, 1);
        assert_eq!(runs[0].status, LoadStatus::Success);
    }

    #[test]
    fn test_read_only_blocks_writes() {
        let db = test_db();
        seed(&db);

        let result = db.read_only("test", |conn| {
            conn.execute("REPLACE INTO regions (code, name) VALUES ('11', 'x')", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(db.get_region("11").unwrap().unwrap().name, "Region 11");

        // query_only is lifted afterwards
        seed(&db);
    }

    #[test]
    fn test_query_timeout_interrupts() {
        let storage = StorageConfig {
            query_timeout_ms: 50,
            ..Default::default()
        };
        let db = Database::open_in_memory_with(&storage).unwrap();

        let result = db.read("endless", |conn| {
            let n: i64 = conn.query_row(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT COUNT(*) FROM c",
                [],
                |r| r.get(0),
            )?;
            Ok(n)
        });
        match result {
            Err(Error::Storage(msg)) => assert!(msg.contains("timeout")),
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let storage = StorageConfig {
            retry_backoff_ms: 1,
            ..Default::default()
        };
        let db = Database::open_in_memory_with(&storage).unwrap();
        let attempts = Cell::new(0);

        let value = db
            .read("flaky", |_| {
                attempts.set(attempts.get() + 1);
                if attempts.get() < 3 {
                    Err(Error::Busy("locked".to_string()))
                } else {
                    Ok(7)
                }
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_permanent_failures_are_not_retried() {
        let db = test_db();
        let attempts = Cell::new(0);

        let result: Result<()> = db.read("bad", |_| {
            attempts.set(attempts.get() + 1);
            Err(Error::Validation("nope".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }
}
