//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Data tables emptied by a reset, children first.
pub const DATA_TABLES: &[&str] = &[
    "monthly_statistics",
    "yearly_statistics",
    "crime_categories",
    "departments",
    "regions",
];

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: reference data and yearly statistics
    r#"
    -- ============================================
    -- Reference data
    -- ============================================

    CREATE TABLE IF NOT EXISTS regions (
        code             TEXT PRIMARY KEY,
        name             TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS departments (
        code             TEXT PRIMARY KEY,
        region_code      TEXT NOT NULL REFERENCES regions(code),
        population       INTEGER NOT NULL CHECK (population >= 0),
        housing_units    INTEGER NOT NULL CHECK (housing_units >= 0),
        reference_year   INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS crime_categories (
        name             TEXT PRIMARY KEY,
        unit_label       TEXT NOT NULL
    );

    -- ============================================
    -- Statistics
    -- ============================================

    CREATE TABLE IF NOT EXISTS yearly_statistics (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        category         TEXT NOT NULL REFERENCES crime_categories(name),
        year             INTEGER NOT NULL,
        department       TEXT NOT NULL REFERENCES departments(code),
        incident_count   INTEGER NOT NULL CHECK (incident_count >= 0),
        rate_per_mille   REAL,

        UNIQUE(category, year, department)
    );

    CREATE INDEX IF NOT EXISTS idx_yearly_department ON yearly_statistics(department, year);
    CREATE INDEX IF NOT EXISTS idx_yearly_category_year ON yearly_statistics(category, year);
    CREATE INDEX IF NOT EXISTS idx_departments_region ON departments(region_code);
    "#,
    // Version 2: monthly statistics and load bookkeeping
    r#"
    CREATE TABLE IF NOT EXISTS monthly_statistics (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        category         TEXT NOT NULL REFERENCES crime_categories(name),
        year             INTEGER NOT NULL,
        month            INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
        department       TEXT NOT NULL REFERENCES departments(code),
        incident_count   INTEGER NOT NULL CHECK (incident_count >= 0),

        UNIQUE(category, year, month, department)
    );

    CREATE INDEX IF NOT EXISTS idx_monthly_department ON monthly_statistics(department, category);

    CREATE TABLE IF NOT EXISTS load_runs (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        kind             TEXT NOT NULL,
        source_path      TEXT NOT NULL,
        file_hash        TEXT NOT NULL,
        started_at       DATETIME NOT NULL,
        duration_ms      INTEGER NOT NULL,
        rows_read        INTEGER NOT NULL,
        rows_inserted    INTEGER NOT NULL,
        rows_skipped     INTEGER NOT NULL,
        status           TEXT NOT NULL,
        error_message    TEXT
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
