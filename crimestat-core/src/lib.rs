//! # crimestat-core
//!
//! Core library for crimestat - departmental crime statistics analytics.
//!
//! This library provides:
//! - Domain types for regions, departments and yearly statistics
//! - Database storage layer with SQLite and a CSV loader
//! - A catalog of named queries
//! - The metric engine and the recommendation generator
//! - A service façade tying them together for a presentation layer
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A request flows through three layers:
//! - **Store:** normalised SQLite tables, written only by load and reset
//! - **Metrics:** pure computations over typed observations
//! - **Façade:** validation, dispatch, text generation and error mapping
//!
//! ## Example
//!
//! ```rust,no_run
//! use crimestat_core::{Config, Database, ServiceFacade, ServiceParams};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open_with(&config.resolved_database_path(), &config.storage)
//!     .expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let facade = ServiceFacade::new(db, config);
//! let params = ServiceParams::new()
//!     .with("department_code", "75")
//!     .with("year", "2022");
//! let response = facade.invoke("real_estate_security", &params);
//! println!("{}", response.text);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, ErrorKind, Result};
pub use ingest::{LoadSummary, Loader};
pub use metrics::Thresholds;
pub use service::{
    ChartKind, ChartSpec, ResponseStatus, ResultTable, ServiceFacade, ServiceKind, ServiceParams,
    ServiceResponse,
};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod queries;
pub mod recommend;
pub mod service;
pub mod types;
