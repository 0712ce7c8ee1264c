//! Database layer for crimestat
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Load and reset write paths
//! - Time-bounded, retried reads for the query library

pub mod repo;
pub mod schema;

pub use repo::{BatchOutcome, Database, NewLoadRun};
