//! Core domain types for crimestat
//!
//! These types mirror the persisted reference data (regions, departments,
//! crime categories) and the per-year / per-month statistics the analytical
//! services read.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Region** | French administrative region; groups several Departments |
//! | **Department** | French department, identified by its code ("75", "2A", "971") |
//! | **Crime category** | A class of recorded incidents ("Vols de véhicules", ...) |
//! | **Rate per mille** | Incidents per 1000 inhabitants of the department |
//! | **Observation** | One (department, category, year) statistic joined with its department data |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Normalise a year parameter.
///
/// Two-digit years are read as 20xx (`22` becomes `2022`), full years pass
/// through unchanged.
pub fn normalize_year(year: i32) -> i32 {
    if (0..100).contains(&year) {
        year + 2000
    } else {
        year
    }
}

// ============================================
// Reference data
// ============================================

/// French administrative region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub code: String,
    pub name: String,
}

impl Region {
    /// Placeholder name used when the source only carries the code.
    pub fn default_name(code: &str) -> String {
        format!("Region {code}")
    }
}

/// French department with the demographic figures used as denominators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub code: String,
    pub region_code: String,
    /// Inhabitants
    pub population: i64,
    /// Housing units
    pub housing_units: i64,
    /// Year the population and housing figures were taken from
    pub reference_year: i32,
}

/// Crime category ("crime type").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrimeCategory {
    pub name: String,
    /// Counting unit of the source ("victime", "infraction", ...)
    pub unit_label: String,
}

// ============================================
// Statistics
// ============================================

/// Yearly incident count for one (category, year, department).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyStatistic {
    pub category: String,
    pub year: i32,
    pub department: String,
    pub incident_count: i64,
    /// None only when the source omitted it and the population is zero
    pub rate_per_mille: Option<f64>,
}

/// Monthly incident count, feeding the seasonal profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStatistic {
    pub category: String,
    pub year: i32,
    /// 1..=12
    pub month: u32,
    pub department: String,
    pub incident_count: i64,
}

/// Yearly statistic joined with the department figures.
///
/// This is the row shape the analytical queries hand to the metric engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub department: String,
    pub region_code: String,
    pub category: String,
    pub year: i32,
    pub incident_count: i64,
    /// Stored rate; absent when the source left it empty and it could not be derived
    pub rate_per_mille: Option<f64>,
    pub population: i64,
    pub housing_units: i64,
}

// ============================================
// Load bookkeeping
// ============================================

/// Outcome of a load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Success,
    Failed,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Success => "success",
            LoadStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for LoadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(LoadStatus::Success),
            "failed" => Ok(LoadStatus::Failed),
            _ => Err(format!("unknown load status: {}", s)),
        }
    }
}

/// Which table a load run fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadKind {
    Yearly,
    Monthly,
}

impl LoadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadKind::Yearly => "yearly",
            LoadKind::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for LoadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yearly" => Ok(LoadKind::Yearly),
            "monthly" => Ok(LoadKind::Monthly),
            _ => Err(format!("unknown load kind: {}", s)),
        }
    }
}

/// One recorded CSV load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadRun {
    pub id: i64,
    pub kind: LoadKind,
    pub source_path: PathBuf,
    /// SHA-256 of the file contents, hex encoded
    pub file_hash: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub rows_read: i64,
    pub rows_inserted: i64,
    pub rows_skipped: i64,
    pub status: LoadStatus,
    pub error_message: Option<String>,
}

/// Row counts of the data tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub regions: i64,
    pub departments: i64,
    pub categories: i64,
    pub yearly_statistics: i64,
    pub monthly_statistics: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_year() {
        assert_eq!(normalize_year(22), 2022);
        assert_eq!(normalize_year(2019), 2019);
        assert_eq!(normalize_year(0), 2000);
    }

    #[test]
    fn test_load_status_roundtrip() {
        for status in [LoadStatus::Success, LoadStatus::Failed] {
            assert_eq!(status.as_str().parse::<LoadStatus>().unwrap(), status);
        }
        assert!("partial".parse::<LoadStatus>().is_err());
    }

    #[test]
    fn test_default_region_name() {
        assert_eq!(Region::default_name("11"), "Region 11");
    }
}
