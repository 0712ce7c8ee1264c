//! Row sets returned by the query library.

use crate::error::Result;
use crate::types::Observation;
use rusqlite::types::ValueRef;
use rusqlite::{Params, Row, Statement};
use serde::Serialize;

/// Untyped result of a query: column names and JSON cell values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RawRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Run `stmt` and collect every row.
    pub(crate) fn collect<P: Params>(stmt: &mut Statement<'_>, params: P) -> Result<Self> {
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query(params)?;
        while let Some(row) = cursor.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(to_json(row.get_ref(i)?));
            }
            rows.push(cells);
        }
        Ok(Self { columns, rows })
    }
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(hex::encode(b)),
    }
}

// ============================================
// Typed row mappers
// ============================================

/// Map a row of the shared observation column set.
pub fn observation(row: &Row) -> rusqlite::Result<Observation> {
    Ok(Observation {
        department: row.get("department")?,
        region_code: row.get("region_code")?,
        category: row.get("category")?,
        year: row.get("year")?,
        incident_count: row.get("incident_count")?,
        rate_per_mille: row.get("rate_per_mille")?,
        population: row.get("population")?,
        housing_units: row.get("housing_units")?,
    })
}

/// National totals of one (category, year).
#[derive(Debug, Clone, PartialEq)]
pub struct NationalTotal {
    pub category: String,
    pub year: i32,
    pub incidents: i64,
    pub population: i64,
}

pub fn national_total(row: &Row) -> rusqlite::Result<NationalTotal> {
    Ok(NationalTotal {
        category: row.get("category")?,
        year: row.get("year")?,
        incidents: row.get("total_incidents")?,
        population: row.get("total_population")?,
    })
}

/// One monthly count of a category.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyCount {
    pub category: String,
    pub year: i32,
    pub month: u32,
    pub incidents: i64,
}

pub fn monthly_count(row: &Row) -> rusqlite::Result<MonthlyCount> {
    Ok(MonthlyCount {
        category: row.get("category")?,
        year: row.get("year")?,
        month: row.get("month")?,
        incidents: row.get("incident_count")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_collect_converts_cells() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn
            .prepare("SELECT 1 AS n, 2.5 AS r, 'x' AS t, NULL AS z, x'0aff' AS b")
            .unwrap();
        let rows = RawRows::collect(&mut stmt, []).unwrap();
        assert_eq!(rows.columns, vec!["n", "r", "t", "z", "b"]);
        assert_eq!(
            rows.rows[0],
            vec![
                serde_json::json!(1),
                serde_json::json!(2.5),
                serde_json::json!("x"),
                serde_json::Value::Null,
                serde_json::json!("0aff"),
            ]
        );
        assert_eq!(rows.column("t"), Some(2));
    }
}
