//! Query library
//!
//! A static catalog of named, parameterised statements over the store:
//! - **Predefined** queries are listed to end users and run as-is
//! - **Analytical** queries produce the observation row sets the services
//!   hand to the metric engine
//!
//! Freeform SQL is also accepted, but only through [`execute_freeform`],
//! which runs the statement on a connection that cannot write.

pub mod catalog;
pub mod rows;

pub use catalog::{Param, QueryDefinition, Visibility};
pub use rows::RawRows;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::normalize_year;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Row};
use std::collections::BTreeMap;
use std::time::Instant;

/// Keywords rejected in freeform statements.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "INSERT", "UPDATE", "CREATE", "ALTER",
];

/// Parameter values of one query execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    values: BTreeMap<Param, Value>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, param: Param, value: impl Into<Value>) -> Self {
        self.insert(param, value);
        self
    }

    pub fn insert(&mut self, param: Param, value: impl Into<Value>) {
        self.values.insert(param, value.into());
    }

    pub fn get(&self, param: Param) -> Option<&Value> {
        self.values.get(&param)
    }

    /// Parse a raw `name=value` pair the way a request carries it.
    ///
    /// Years accept the two-digit form (`22` is 2022).
    pub fn insert_raw(&mut self, name: &str, raw: &str) -> Result<()> {
        let param = Param::from_name(name)
            .ok_or_else(|| Error::Validation(format!("unknown parameter: {name}")))?;
        let value = match param {
            Param::Year => {
                let year: i32 = raw
                    .trim()
                    .parse()
                    .map_err(|_| Error::Validation(format!("year must be an integer, got {raw:?}")))?;
                Value::Integer(i64::from(normalize_year(year)))
            }
            _ => Value::Text(raw.trim().to_string()),
        };
        self.values.insert(param, value);
        Ok(())
    }
}

/// Catalog of named queries.
#[derive(Debug, Clone, Copy)]
pub struct QueryLibrary {
    definitions: &'static [QueryDefinition],
}

impl Default for QueryLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryLibrary {
    pub fn new() -> Self {
        Self {
            definitions: catalog::QUERIES,
        }
    }

    pub fn get(&self, name: &str) -> Option<&'static QueryDefinition> {
        self.definitions.iter().find(|q| q.name == name)
    }

    pub fn all(&self) -> impl Iterator<Item = &'static QueryDefinition> {
        self.definitions.iter()
    }

    /// Queries listed to end users, in catalog order.
    pub fn predefined(&self) -> impl Iterator<Item = &'static QueryDefinition> {
        self.definitions
            .iter()
            .filter(|q| q.visibility == Visibility::Predefined)
    }

    /// Run a named query and return its raw rows.
    pub fn execute(&self, db: &Database, name: &str, params: &QueryParams) -> Result<RawRows> {
        let (definition, bound) = self.bind(name, params)?;
        let started = Instant::now();
        let rows = db.read(definition.name, |conn| {
            let mut stmt = conn.prepare_cached(definition.sql)?;
            RawRows::collect(&mut stmt, params_from_iter(bound.iter()))
        })?;
        tracing::debug!(
            query = definition.name,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(rows)
    }

    /// Run a named query and map every row with `map`.
    pub fn fetch<T, F>(&self, db: &Database, name: &str, params: &QueryParams, map: F) -> Result<Vec<T>>
    where
        F: Fn(&Row<'_>) -> rusqlite::Result<T>,
    {
        let (definition, bound) = self.bind(name, params)?;
        let started = Instant::now();
        let rows = db.read(definition.name, |conn| {
            let mut stmt = conn.prepare_cached(definition.sql)?;
            let rows = stmt
                .query_map(params_from_iter(bound.iter()), &map)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        tracing::debug!(
            query = definition.name,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query fetched"
        );
        Ok(rows)
    }

    /// Resolve `name` and collect its declared parameters in order.
    fn bind(&self, name: &str, params: &QueryParams) -> Result<(&'static QueryDefinition, Vec<Value>)> {
        let definition = self
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("query {name}")))?;

        let missing: Vec<&str> = definition
            .params
            .iter()
            .filter(|p| params.get(**p).is_none())
            .map(|p| p.name())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "missing parameters: {}",
                missing.join(", ")
            )));
        }

        let bound = definition
            .params
            .iter()
            .filter_map(|p| params.get(*p).cloned())
            .collect();
        Ok((definition, bound))
    }
}

/// Keyword screen for freeform SQL.
///
/// A case-insensitive substring match against [`FORBIDDEN_KEYWORDS`]. It
/// rejects harmless text such as a column named `updated_at` and misses
/// writes like `REPLACE INTO`; it is a courtesy filter, not a security
/// boundary. [`execute_freeform`] enforces read-only execution separately.
pub fn validate_freeform(sql: &str) -> bool {
    let upper = sql.to_uppercase();
    !FORBIDDEN_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

/// Run a user-supplied statement.
///
/// The statement must pass [`validate_freeform`], compile to a single
/// statement SQLite reports as read-only, and runs with `PRAGMA query_only`
/// set.
pub fn execute_freeform(db: &Database, sql: &str) -> Result<RawRows> {
    if sql.trim().is_empty() {
        return Err(Error::Validation("empty query".to_string()));
    }
    if !validate_freeform(sql) {
        tracing::warn!(sql, "Freeform query rejected by keyword screen");
        return Err(Error::UnsafeQuery("statement contains a forbidden keyword".to_string()));
    }

    let rows = db.read_only("freeform", |conn| {
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            tracing::warn!(sql, "Freeform query would write to the store");
            return Err(Error::UnsafeQuery("statement would modify the store".to_string()));
        }
        RawRows::collect(&mut stmt, [])
    })?;
    tracing::info!(rows = rows.len(), "Freeform query executed");
    Ok(rows)
}
