//! crimestat - departmental crime statistics from the command line
//!
//! Loads the departmental CSV exports into the store and runs the analyses
//! of the service façade against it.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/crimestat/crimestat.db (~/.local/share/crimestat/crimestat.db)
//! - Logs: $XDG_STATE_HOME/crimestat/crimestat.log (~/.local/state/crimestat/crimestat.log)
//! - Config: $XDG_CONFIG_HOME/crimestat/config.toml (~/.config/crimestat/config.toml)

mod process_lock;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crimestat_core::format::format_relative_time;
use crimestat_core::queries::QueryLibrary;
use crimestat_core::{
    Config, Database, LoadKind, Loader, ResponseStatus, ServiceFacade, ServiceKind, ServiceParams,
    ServiceResponse,
};
use indicatif::{ProgressBar, ProgressStyle};
use process_lock::{acquire_exclusive, acquire_shared};
use serde_json::Value;
use std::path::Path;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "crimestat")]
#[command(about = "Analyse departmental crime statistics")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load CSV exports matching a file or glob pattern
    Load {
        /// File path or glob pattern (e.g. "data/*.csv")
        pattern: String,

        /// Files hold monthly counts instead of yearly statistics
        #[arg(long)]
        monthly: bool,
    },

    /// Delete every loaded statistic, keeping the schema
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Run one analysis service
    Run {
        /// Service name (see `crimestat services`)
        service: String,

        /// Service parameter, repeatable
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Run a predefined query of the catalog
    Query {
        /// Query name (see `crimestat queries`)
        name: String,

        /// Query parameter, repeatable
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Run a read-only SELECT statement
    Sql {
        /// The statement
        sql: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List available services and their required parameters
    Services,

    /// List predefined queries and their parameters
    Queries,

    /// Show store contents and recent loads
    History {
        /// Number of load runs to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        crimestat_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Services => {
            list_services();
            Ok(ExitCode::SUCCESS)
        }
        Command::Queries => {
            list_queries();
            Ok(ExitCode::SUCCESS)
        }
        Command::Load { pattern, monthly } => {
            let db_path = config.resolved_database_path();
            let _guard = acquire_exclusive(&db_path)?;
            let db = open_database(&db_path, &config)?;
            let kind = if monthly {
                LoadKind::Monthly
            } else {
                LoadKind::Yearly
            };
            load(&db, &pattern, kind)
        }
        Command::Reset { yes } => {
            if !yes {
                anyhow::bail!("reset deletes every loaded statistic; pass --yes to confirm");
            }
            let db_path = config.resolved_database_path();
            let _guard = acquire_exclusive(&db_path)?;
            let db = open_database(&db_path, &config)?;
            let removed = db.reset().context("failed to reset the store")?;
            println!("Store reset:");
            println!("  Yearly statistics removed:  {}", removed.yearly_statistics);
            println!("  Monthly statistics removed: {}", removed.monthly_statistics);
            println!("  Departments removed:        {}", removed.departments);
            Ok(ExitCode::SUCCESS)
        }
        Command::History { limit } => {
            let db_path = config.resolved_database_path();
            let _guard = acquire_shared(&db_path)?;
            let db = open_database(&db_path, &config)?;
            history(&db, limit)
        }
        Command::Run {
            service,
            params,
            format,
        } => {
            let params: ServiceParams = params.into_iter().collect();
            invoke(config, &service, &params, format)
        }
        Command::Query {
            name,
            params,
            format,
        } => {
            let params = params
                .into_iter()
                .collect::<ServiceParams>()
                .with("query_name", name);
            invoke(config, ServiceKind::PredefinedQuery.name(), &params, format)
        }
        Command::Sql { sql, format } => {
            let params = ServiceParams::new().with("sql", sql);
            invoke(config, ServiceKind::FreeformQuery.name(), &params, format)
        }
    }
}

fn open_database(db_path: &Path, config: &Config) -> Result<Database> {
    let db = Database::open_with(db_path, &config.storage).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;
    Ok(db)
}

// ============================================
// Commands
// ============================================

fn load(db: &Database, pattern: &str, kind: LoadKind) -> Result<ExitCode> {
    tracing::info!(pattern, kind = kind.as_str(), "crimestat load starting");

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let result = Loader::new(db).load_with_progress(pattern, kind, |i, total, path| {
        pb.set_length(total as u64);
        pb.set_position(i as u64);
        pb.set_message(
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_string(),
        );
    });
    pb.finish_and_clear();
    let summary = result.context("load failed")?;

    println!("Load complete:");
    println!("  Files loaded:   {}", summary.files_loaded);
    println!("  Files failed:   {}", summary.files_failed);
    println!("  Rows read:      {}", summary.rows_read);
    println!("  Rows inserted:  {}", summary.rows_inserted);
    println!("  Rows ignored:   {}", summary.rows_ignored);
    println!("  Rows skipped:   {}", summary.rows_skipped);

    for warning in &summary.warnings {
        eprintln!("warning: {warning}");
    }
    for (path, error) in &summary.errors {
        eprintln!("error: {}: {error}", path.display());
    }

    if summary.files_loaded == 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn history(db: &Database, limit: usize) -> Result<ExitCode> {
    let counts = db.counts()?;
    println!("Store contents:");
    println!("  Regions:            {}", counts.regions);
    println!("  Departments:        {}", counts.departments);
    println!("  Crime categories:   {}", counts.categories);
    println!("  Yearly statistics:  {}", counts.yearly_statistics);
    println!("  Monthly statistics: {}", counts.monthly_statistics);

    let runs = db.list_load_runs(limit)?;
    if runs.is_empty() {
        println!("\nNo loads recorded yet. Run 'crimestat load <PATTERN>' first.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("\nRecent loads:");
    for run in runs {
        println!(
            "  {:>8}  {:<7}  {:<7}  {:>6} inserted / {:>6} read  {}",
            format_relative_time(run.started_at),
            run.kind.as_str(),
            run.status.as_str(),
            run.rows_inserted,
            run.rows_read,
            run.source_path.display(),
        );
        if let Some(message) = run.error_message {
            println!("            {message}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn invoke(
    config: Config,
    service: &str,
    params: &ServiceParams,
    format: OutputFormat,
) -> Result<ExitCode> {
    let db_path = config.resolved_database_path();
    let _guard = acquire_shared(&db_path)?;
    let db = open_database(&db_path, &config)?;
    let facade = ServiceFacade::new(db, config);

    let response = facade.invoke(service, params);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Text => print_response(&response),
    }

    if response.status.is_error() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn list_services() {
    println!("Available services:");
    for kind in ServiceKind::ALL {
        let required = kind.required_params();
        if required.is_empty() {
            println!("  - {}", kind.name());
        } else {
            println!("  - {} ({})", kind.name(), required.join(", "));
        }
    }
}

fn list_queries() {
    println!("Predefined queries:");
    for query in QueryLibrary::new().predefined() {
        let params: Vec<&str> = query.params.iter().map(|p| p.name()).collect();
        println!("  - {} [{}]", query.name, params.join(", "));
        println!("      {}: {}", query.title, query.description);
    }
}

// ============================================
// Text rendering
// ============================================

fn print_response(response: &ServiceResponse) {
    match response.status {
        ResponseStatus::Error { .. } => {
            eprintln!("{}", response.text);
            return;
        }
        ResponseStatus::Empty => {
            println!("{}", response.text);
            return;
        }
        ResponseStatus::Ok => {}
    }

    println!("{}", response.text);
    if !response.table.is_empty() {
        println!();
        print_table(&response.table.columns, &response.table.rows);
    }
}

fn print_table(columns: &[String], rows: &[Vec<Value>]) {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(render_cell).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{c:<w$}"))
        .collect();
    println!("{}", header.join("  "));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", rule.join("  "));

    for row in cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect();
        println!("{}", line.join("  ").trim_end());
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => format!("{f:.2}"),
            (None, None) => n.to_string(),
        },
        other => other.to_string(),
    }
}
