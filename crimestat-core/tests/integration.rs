//! Integration tests for the load pipeline and the service façade
//!
//! These tests load the CSV fixtures in `tests/fixtures/` into a fresh
//! database and drive every service end to end.

use crimestat_core::ingest::{LoadKind, Loader};
use crimestat_core::queries::validate_freeform;
use crimestat_core::{
    Config, Database, ErrorKind, ResponseStatus, ServiceFacade, ServiceParams, ServiceResponse,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tempfile::TempDir;

/// Rows in `departements.csv`.
const YEARLY_ROWS: i64 = 144;

/// Get the path to a fixture file
fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn load_fixtures(db: &Database) {
    let loader = Loader::new(db);
    loader
        .load_file(&fixture_path("departements.csv"), LoadKind::Yearly)
        .expect("yearly load should succeed");
    loader
        .load_file(&fixture_path("mensuel.csv"), LoadKind::Monthly)
        .expect("monthly load should succeed");
}

/// Façade over a temp-file database holding both fixtures.
fn facade() -> (TempDir, ServiceFacade) {
    facade_with(Config::default())
}

fn facade_with(config: Config) -> (TempDir, ServiceFacade) {
    crimestat_core::logging::init_test();
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("crimestat.db")).unwrap();
    db.migrate().unwrap();
    load_fixtures(&db);
    (dir, ServiceFacade::new(db, config))
}

fn params(pairs: &[(&str, &str)]) -> ServiceParams {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

fn column<'a>(response: &'a ServiceResponse, name: &str) -> Vec<&'a Value> {
    response.table.values(name)
}

fn strings(values: Vec<&Value>) -> BTreeSet<String> {
    values
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn assert_ok(response: &ServiceResponse) {
    assert!(
        response.status.is_ok(),
        "{} failed: {}",
        response.service,
        response.text
    );
    assert!(!response.table.is_empty());
    assert!(!response.text.is_empty());
}

// ============================================
// Loading
// ============================================

#[test]
fn test_reload_keeps_row_count() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("crimestat.db")).unwrap();
    db.migrate().unwrap();
    let loader = Loader::new(&db);

    let first = loader
        .load_file(&fixture_path("departements.csv"), LoadKind::Yearly)
        .unwrap();
    assert_eq!(first.rows_inserted as i64, YEARLY_ROWS);
    assert_eq!(db.counts().unwrap().yearly_statistics, YEARLY_ROWS);

    let second = loader
        .load_file(&fixture_path("departements.csv"), LoadKind::Yearly)
        .unwrap();
    assert_eq!(second.rows_inserted, 0);
    assert_eq!(second.rows_ignored as i64, YEARLY_ROWS);
    assert_eq!(db.counts().unwrap().yearly_statistics, YEARLY_ROWS);

    let counts = db.counts().unwrap();
    assert_eq!(counts.regions, 3);
    assert_eq!(counts.departments, 6);
    assert_eq!(counts.categories, 4);
}

#[test]
fn test_department_figures_from_latest_year() {
    let (_dir, facade) = facade();
    let dept = facade.database().get_department("75").unwrap().unwrap();
    assert_eq!(dept.region_code, "11");
    assert_eq!(dept.reference_year, 2022);
    assert_eq!(dept.population, 2_125_000);
}

#[test]
fn test_reset_empties_store() {
    let (_dir, facade) = facade();
    let before = facade.database().reset().unwrap();
    assert_eq!(before.yearly_statistics, YEARLY_ROWS);
    assert_eq!(facade.database().counts().unwrap().yearly_statistics, 0);

    let response = facade.invoke(
        "regional_diagnostic",
        &params(&[("region_code", "11")]),
    );
    assert_eq!(response.status, ResponseStatus::Empty);
}

// ============================================
// Security services
// ============================================

#[test]
fn test_real_estate_security_paris_2022() {
    let (_dir, facade) = facade();
    let response = facade.invoke(
        "real_estate_security",
        &params(&[("department_code", "75"), ("year", "2022")]),
    );
    assert_ok(&response);
    for name in ["local_rate", "national_rate", "risk_level"] {
        assert!(response.table.column(name).is_some(), "missing column {name}");
    }
    let allowed: BTreeSet<String> = ["high", "moderate", "low"].iter().map(|s| s.to_string()).collect();
    assert!(strings(column(&response, "risk_level")).is_subset(&allowed));
    assert_eq!(response.table.len(), 4);
    assert!(response.text.contains("75"));
    assert!(!response.charts.is_empty());
}

#[test]
fn test_requests_are_deterministic() {
    let (_dir, facade) = facade();
    let full = params(&[("department_code", "75"), ("year", "2022")]);
    let short = params(&[("department_code", "75"), ("year", "22")]);

    let a = facade.invoke("real_estate_security", &full);
    let b = facade.invoke("real_estate_security", &full);
    let c = facade.invoke("Real estate security", &short);
    assert_eq!(a, b);
    assert_eq!(a.table, c.table);
    assert_eq!(a.text, c.text);
}

#[test]
fn test_neighborhood_alert_levels() {
    let (_dir, facade) = facade();
    let response = facade.invoke(
        "neighborhood_alert",
        &params(&[("department_code", "93"), ("year", "2022"), ("radius", "5")]),
    );
    assert_ok(&response);
    let allowed: BTreeSet<String> = ["red alert", "orange alert", "watch", "normal"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert!(strings(column(&response, "alert_level")).is_subset(&allowed));
    assert!(response.text.contains("93"));
}

#[test]
fn test_business_security_defaults_to_latest_year() {
    let (_dir, facade) = facade();
    let response = facade.invoke("business_security", &params(&[("department_code", "13")]));
    assert_ok(&response);
    assert!(column(&response, "year").iter().all(|y| y.as_i64() == Some(2022)));
}

#[test]
fn test_insurance_quintiles() {
    let (_dir, facade) = facade();
    let response = facade.invoke(
        "insurance_optimization",
        &params(&[("department_code", "75"), ("year", "2022")]),
    );
    assert_ok(&response);
    // Four categories give four single-member bins.
    let mut bins: Vec<i64> = column(&response, "quintile")
        .iter()
        .filter_map(|v| v.as_i64())
        .collect();
    bins.sort_unstable();
    assert_eq!(bins, vec![1, 2, 3, 4]);
}

#[test]
fn test_insurance_labels_follow_configured_bins() {
    let mut config = Config::default();
    config.thresholds.quintile_bins = 2;
    let (_dir, facade) = facade_with(config);
    let response = facade.invoke(
        "insurance_optimization",
        &params(&[("department_code", "75"), ("year", "2022")]),
    );
    assert_ok(&response);
    assert_eq!(
        strings(column(&response, "risk_level")),
        BTreeSet::from(["high".to_string(), "low".to_string()])
    );
    assert!(response.text.contains("Risk level high:"));
    assert!(response.text.contains("Risk level low:"));
}

#[test]
fn test_transport_security_scores_bounded() {
    let (_dir, facade) = facade();
    let response = facade.invoke(
        "transport_security",
        &params(&[("department_code", "75"), ("dest_department", "13")]),
    );
    assert_ok(&response);
    // Two fixture categories are transport categories, for both departments.
    assert_eq!(response.table.len(), 4);
    for score in column(&response, "score") {
        let score = score.as_f64().unwrap();
        assert!((0.0..=100.0).contains(&score));
    }
    assert!(response.text.contains("75"));
    assert!(response.text.contains("13"));
}

#[test]
fn test_transport_security_single_category() {
    let (_dir, facade) = facade();
    let response = facade.invoke(
        "transport_security",
        &params(&[
            ("department_code", "75"),
            ("dest_department", "13"),
            ("crime_type", "Vols de véhicules"),
            ("month", "6"),
        ]),
    );
    assert_ok(&response);
    assert_eq!(
        strings(column(&response, "category")),
        BTreeSet::from(["Vols de véhicules".to_string()])
    );
}

// ============================================
// Predictive services
// ============================================

#[test]
fn test_trend_projection_reaches_target() {
    let (_dir, facade) = facade();
    let response = facade.invoke(
        "trend_projection",
        &params(&[
            ("department_code", "75"),
            ("crime_type", "Cambriolages de logement"),
            ("target_year", "25"),
        ]),
    );
    assert_ok(&response);
    let years: Vec<i64> = column(&response, "year").iter().filter_map(|v| v.as_i64()).collect();
    assert_eq!(years.first(), Some(&2017));
    assert_eq!(years.last(), Some(&2025));
    let kinds = strings(column(&response, "kind"));
    assert!(kinds.contains("historical") && kinds.contains("projection"));
    for r2 in column(&response, "r_squared") {
        let r2 = r2.as_f64().unwrap();
        assert!((0.0..=1.0).contains(&r2));
    }
    assert!(response.text.starts_with("Projection analysis - Department 75:"));
}

#[test]
fn test_trend_projection_rejects_target_outside_range() {
    let (_dir, facade) = facade();
    for target in ["23", "31", "abc"] {
        let response = facade.invoke(
            "trend_projection",
            &params(&[("department_code", "75"), ("target_year", target)]),
        );
        assert_eq!(response.status.kind(), Some(ErrorKind::Validation), "{target}");
        assert!(response.table.is_empty());
    }
}

#[test]
fn test_trend_projection_unknown_category_is_empty() {
    let (_dir, facade) = facade();
    let response = facade.invoke(
        "trend_projection",
        &params(&[
            ("department_code", "75"),
            ("crime_type", "Piraterie"),
            ("target_year", "2026"),
        ]),
    );
    assert_eq!(response.status, ResponseStatus::Empty);
    assert_eq!(response.text, "No data available for this selection");
}

#[test]
fn test_emerging_risk() {
    let (_dir, facade) = facade();
    let response = facade.invoke("emerging_risk", &params(&[("department_code", "13")]));
    assert_ok(&response);
    assert_eq!(response.table.len(), 4);
    assert!(response.table.column("correlated_category").is_some());
    assert!(response.text.starts_with("Risk analysis - Department 13:"));
}

#[test]
fn test_seasonal_profile_groupings() {
    let (_dir, facade) = facade();
    let seasons = facade.invoke("seasonal_profile", &params(&[("department_code", "75")]));
    assert_ok(&seasons);
    assert_eq!(
        strings(column(&seasons, "bucket")),
        ["autumn", "spring", "summer", "winter"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    );
    assert!(seasons.text.contains("Peak period: winter"));

    let quarters = facade.invoke(
        "seasonal_profile",
        &params(&[
            ("department_code", "75"),
            ("crime_type", "Vols de véhicules"),
            ("grouping", "quarter"),
        ]),
    );
    assert_ok(&quarters);
    assert_eq!(quarters.table.len(), 4);

    let bad = facade.invoke(
        "seasonal_profile",
        &params(&[("department_code", "75"), ("grouping", "weekly")]),
    );
    assert_eq!(bad.status.kind(), Some(ErrorKind::Validation));
}

// ============================================
// Territorial services
// ============================================

#[test]
fn test_single_department_region_diagnostic() {
    let (_dir, facade) = facade();
    let response = facade.invoke("regional_diagnostic", &params(&[("region_code", "04")]));
    assert_ok(&response);
    assert!(response.text.contains("This region has only one department."));
    assert!(!response.text.contains("significant deviations"));
}

#[test]
fn test_regional_diagnostic_ranks_departments() {
    let (_dir, facade) = facade();
    let response = facade.invoke("regional_diagnostic", &params(&[("region_code", "11")]));
    assert_ok(&response);
    assert_eq!(response.table.len(), 12);
    assert_eq!(
        strings(column(&response, "department")),
        ["75", "92", "93"].iter().map(|s| s.to_string()).collect()
    );
    // Seine-Saint-Denis has the highest rates of the region in every category.
    let rank = response.table.column("rank").unwrap();
    let dept = response.table.column("department").unwrap();
    for row in &response.table.rows {
        if row[dept] == "93" {
            assert_eq!(row[rank].as_i64(), Some(1));
        }
    }
    assert!(response.text.contains("Departments in the region: 3"));
}

#[test]
fn test_regional_comparison() {
    let (_dir, facade) = facade();
    let response = facade.invoke(
        "regional_comparison",
        &params(&[("region_code", "11"), ("comparison_region_code", "93")]),
    );
    assert_ok(&response);
    assert_eq!(response.table.len(), 8);
    assert!(response.text.contains("Region 11 vs Region 93"));
}

#[test]
fn test_regional_evolution() {
    let (_dir, facade) = facade();
    let response = facade.invoke("regional_evolution", &params(&[("region_code", "93")]));
    assert_ok(&response);
    assert_eq!(response.table.len(), 24);
    let first_years: Vec<&Value> = response
        .table
        .rows
        .iter()
        .filter(|r| r[2] == 2017)
        .map(|r| &r[9])
        .collect();
    assert!(first_years.iter().all(|t| *t == "initial year"));
}

// ============================================
// Queries
// ============================================

#[test]
fn test_predefined_query() {
    let (_dir, facade) = facade();
    let response = facade.invoke(
        "predefined_query",
        &params(&[
            ("query_name", "top_departments"),
            ("crime_type", "Vols de véhicules"),
            ("year", "22"),
        ]),
    );
    assert_ok(&response);
    assert_eq!(response.table.len(), 6);
    assert_eq!(response.table.rows[0][0], "93");

    let unknown = facade.invoke("predefined_query", &params(&[("query_name", "nope")]));
    assert_eq!(unknown.status.kind(), Some(ErrorKind::NotFound));

    let analytical = facade.invoke(
        "predefined_query",
        &params(&[("query_name", "national_totals")]),
    );
    assert_eq!(analytical.status.kind(), Some(ErrorKind::NotFound));

    let missing = facade.invoke(
        "predefined_query",
        &params(&[("query_name", "department_analysis"), ("department_code", "75")]),
    );
    assert_eq!(missing.status.kind(), Some(ErrorKind::Validation));
    assert!(missing.text.contains("year"));
}

#[test]
fn test_freeform_query() {
    let (_dir, facade) = facade();
    assert!(validate_freeform("SELECT * FROM statistiques"));
    assert!(!validate_freeform("DROP TABLE statistiques"));
    assert!(!validate_freeform("select Insert_Date from t"));

    let ok = facade.invoke(
        "freeform_query",
        &params(&[("sql", "SELECT code, name FROM regions ORDER BY code")]),
    );
    assert_ok(&ok);
    assert_eq!(ok.table.columns, vec!["code", "name"]);
    assert_eq!(ok.table.len(), 3);

    let dropped = facade.invoke("freeform_query", &params(&[("sql", "DROP TABLE regions")]));
    assert_eq!(dropped.status.kind(), Some(ErrorKind::UnsafeQuery));
    assert_eq!(dropped.text, "Query not authorized");

    let replaced = facade.invoke(
        "freeform_query",
        &params(&[("sql", "REPLACE INTO regions (code, name) VALUES ('99', 'x')")]),
    );
    assert_eq!(replaced.status.kind(), Some(ErrorKind::UnsafeQuery));
    assert_eq!(facade.database().counts().unwrap().regions, 3);
}

// ============================================
// Responses
// ============================================

#[test]
fn test_response_json_shape() {
    let (_dir, facade) = facade();
    let ok = facade.invoke("regional_evolution", &params(&[("region_code", "11")]));
    let json = serde_json::to_value(&ok).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "regional_evolution");
    assert!(json["table"]["columns"].is_array());
    assert!(json["charts"][0]["kind"].is_string());

    let err = facade.invoke("regional_evolution", &ServiceParams::new());
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["kind"], "validation");
}
