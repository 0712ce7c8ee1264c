use crimestat_core::Database;
use serde_json::Value;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    xdg_runtime: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");
        let xdg_runtime = base.join("xdg-runtime");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");
        fs::create_dir_all(&xdg_runtime).expect("failed to create XDG_RUNTIME_DIR");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
            xdg_runtime,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("crimestat/crimestat.db")
    }
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../crimestat-core/tests/fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("crimestat"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env("XDG_RUNTIME_DIR", &env.xdg_runtime)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute crimestat: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "crimestat {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn load_yearly(env: &CliTestEnv) {
    let path = fixture("departements.csv");
    let args = ["load", path.as_str()];
    let output = run_bin(env, &args);
    assert_success(&args, &output);
}

fn run_json(env: &CliTestEnv, args: &[&str]) -> (Output, Value) {
    let output = run_bin(env, args);
    let json: Value = serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected JSON on stdout: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    });
    (output, json)
}

#[test]
fn load_ingests_fixture_and_populates_db() {
    let env = CliTestEnv::new();
    let path = fixture("departements.csv");
    let args = ["load", path.as_str()];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Load complete:"));
    assert!(
        stdout.contains("Rows inserted:  144"),
        "expected load summary in stdout, got:\n{stdout}"
    );

    let db_path = env.db_path();
    assert!(
        db_path.exists(),
        "database file should exist at {}",
        db_path.display()
    );

    let db = Database::open(&db_path).expect("failed to open db");
    db.migrate().expect("failed to migrate db");
    let counts = db.counts().expect("failed to count rows");
    assert_eq!(counts.yearly_statistics, 144);
    assert_eq!(counts.departments, 6);

    // Loading the same file again inserts nothing.
    let again = run_bin(&env, &args);
    assert_success(&args, &again);
    assert!(String::from_utf8_lossy(&again.stdout).contains("Rows inserted:  0"));

    let history = run_bin(&env, &["history"]);
    assert_success(&["history"], &history);
    let history_stdout = String::from_utf8_lossy(&history.stdout);
    assert!(history_stdout.contains("Yearly statistics:  144"));
    assert!(history_stdout.contains("departements.csv"));
}

#[test]
fn run_service_prints_table_and_json() {
    let env = CliTestEnv::new();
    load_yearly(&env);

    let args = [
        "run",
        "real_estate_security",
        "-p",
        "department_code=75",
        "-p",
        "year=22",
    ];
    let text = run_bin(&env, &args);
    assert_success(&args, &text);
    let stdout = String::from_utf8_lossy(&text.stdout);
    assert!(stdout.contains("75"));
    assert!(stdout.contains("risk_level"));

    let json_args = [
        "run",
        "real_estate_security",
        "-p",
        "department_code=75",
        "-p",
        "year=2022",
        "--format",
        "json",
    ];
    let (output, json) = run_json(&env, &json_args);
    assert_success(&json_args, &output);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "real_estate_security");
    assert_eq!(json["table"]["rows"].as_array().map(Vec::len), Some(4));
}

#[test]
fn errors_exit_non_zero_and_empty_results_do_not() {
    let env = CliTestEnv::new();
    load_yearly(&env);

    let (missing, json) = run_json(
        &env,
        &["run", "trend_projection", "-p", "department_code=75", "--format", "json"],
    );
    assert!(!missing.status.success());
    assert_eq!(json["status"], "error");
    assert_eq!(json["kind"], "validation");

    let unknown = run_bin(&env, &["run", "weather_forecast"]);
    assert!(!unknown.status.success());
    assert!(String::from_utf8_lossy(&unknown.stderr).contains("not recognized"));

    let (empty, json) = run_json(
        &env,
        &[
            "run",
            "real_estate_security",
            "-p",
            "department_code=2A",
            "-p",
            "year=22",
            "--format",
            "json",
        ],
    );
    assert!(empty.status.success());
    assert_eq!(json["status"], "empty");
}

#[test]
fn sql_rejects_writes_and_runs_selects() {
    let env = CliTestEnv::new();
    load_yearly(&env);

    let drop = run_bin(&env, &["sql", "DROP TABLE regions"]);
    assert!(!drop.status.success());
    assert!(String::from_utf8_lossy(&drop.stderr).contains("Query not authorized"));

    let args = ["sql", "SELECT code FROM regions ORDER BY code"];
    let select = run_bin(&env, &args);
    assert_success(&args, &select);
    let stdout = String::from_utf8_lossy(&select.stdout);
    assert!(stdout.contains("3 rows"));
    assert!(stdout.contains("93"));

    let query_args = [
        "query",
        "top_departments",
        "-p",
        "crime_type=Vols de véhicules",
        "-p",
        "year=22",
    ];
    let query = run_bin(&env, &query_args);
    assert_success(&query_args, &query);
    assert!(String::from_utf8_lossy(&query.stdout).contains("Top 10 departments: 6 rows"));
}

#[test]
fn catalogs_and_reset() {
    let env = CliTestEnv::new();

    let services = run_bin(&env, &["services"]);
    assert_success(&["services"], &services);
    let stdout = String::from_utf8_lossy(&services.stdout);
    assert!(stdout.contains("trend_projection (department_code, target_year)"));
    assert!(stdout.contains("freeform_query (sql)"));

    let queries = run_bin(&env, &["queries"]);
    assert_success(&["queries"], &queries);
    assert!(String::from_utf8_lossy(&queries.stdout).contains("top_departments"));

    load_yearly(&env);

    let refused = run_bin(&env, &["reset"]);
    assert!(!refused.status.success());

    let reset = run_bin(&env, &["reset", "--yes"]);
    assert_success(&["reset", "--yes"], &reset);
    assert!(String::from_utf8_lossy(&reset.stdout).contains("Yearly statistics removed:  144"));

    let db = Database::open(&env.db_path()).expect("failed to open db");
    assert_eq!(db.counts().expect("failed to count rows").yearly_statistics, 0);
}

#[test]
fn monthly_load_feeds_seasonal_profile() {
    let env = CliTestEnv::new();
    load_yearly(&env);

    let path = fixture("mensuel.csv");
    let args = ["load", path.as_str(), "--monthly"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Rows inserted:  144"));

    let run_args = ["run", "seasonal_profile", "-p", "department_code=75"];
    let seasonal = run_bin(&env, &run_args);
    assert_success(&run_args, &seasonal);
    assert!(String::from_utf8_lossy(&seasonal.stdout).contains("winter"));
}
