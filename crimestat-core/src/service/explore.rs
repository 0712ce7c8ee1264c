//! Predefined and freeform query services.

use super::{non_empty, Computed, ResultTable, Service, ServiceContext, ServiceKind, ServiceParams};
use crate::error::{Error, Result};
use crate::queries::{execute_freeform, QueryParams, Visibility};

/// Run one query of the user-facing catalog.
pub struct PredefinedQuery;

impl Service for PredefinedQuery {
    fn kind(&self) -> ServiceKind {
        ServiceKind::PredefinedQuery
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let name = params.require("query_name")?;
        let definition = ctx
            .queries
            .get(name)
            .filter(|q| q.visibility == Visibility::Predefined)
            .ok_or_else(|| Error::NotFound(format!("query {name}")))?;

        let mut bound = QueryParams::new();
        for param in definition.params {
            if let Some(raw) = params.get(param.name()) {
                bound.insert_raw(param.name(), raw)?;
            }
        }
        let rows = ctx.queries.execute(ctx.db, definition.name, &bound)?;
        if rows.is_empty() {
            return Err(Error::InsufficientData(format!("query {name} returned no rows")));
        }

        let summary = format!("{}: {} rows", definition.title, rows.len());
        Ok(Computed {
            table: ResultTable::from(rows),
            metrics: None,
            summary: Some(summary),
            charts: Vec::new(),
        })
    }
}

/// Run a caller-supplied SELECT on a read-only connection.
pub struct FreeformQuery;

impl Service for FreeformQuery {
    fn kind(&self) -> ServiceKind {
        ServiceKind::FreeformQuery
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let sql = params.require("sql")?;
        let rows = execute_freeform(ctx.db, sql)?;
        let table = ResultTable::from(rows);
        let rows = non_empty(table.rows, || "freeform query returned no rows".to_string())?;

        let summary = format!("{} rows", rows.len());
        Ok(Computed {
            table: ResultTable {
                columns: table.columns,
                rows,
            },
            metrics: None,
            summary: Some(summary),
            charts: Vec::new(),
        })
    }
}
