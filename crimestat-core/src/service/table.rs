//! Result tables and chart specifications returned by the façade.

use crate::queries::RawRows;
use serde::Serialize;
use serde_json::Value;

/// Column-oriented result of a service run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; it must have one cell per column.
    pub fn push(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width mismatch");
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of one column, top to bottom.
    pub fn values(&self, name: &str) -> Vec<&Value> {
        match self.column(name) {
            Some(i) => self.rows.iter().map(|r| &r[i]).collect(),
            None => Vec::new(),
        }
    }
}

impl From<RawRows> for ResultTable {
    fn from(raw: RawRows) -> Self {
        Self {
            columns: raw.columns,
            rows: raw.rows,
        }
    }
}

/// Kind of chart a renderer should draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
    Heatmap,
    Radar,
    Gauge,
    BoxPlot,
    Scatter,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Line => "line",
            ChartKind::Bar => "bar",
            ChartKind::Heatmap => "heatmap",
            ChartKind::Radar => "radar",
            ChartKind::Gauge => "gauge",
            ChartKind::BoxPlot => "box_plot",
            ChartKind::Scatter => "scatter",
        }
    }
}

/// Renderer-agnostic chart description.
///
/// `x`, `y` and `series` name columns of the response table. `data` carries
/// anything the table cannot express, such as a correlation matrix or the
/// value column of a heatmap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x: String,
    pub y: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ChartSpec {
    pub fn new(kind: ChartKind, title: impl Into<String>, x: &str, y: &str) -> Self {
        Self {
            kind,
            title: title.into(),
            x: x.to_string(),
            y: y.to_string(),
            series: None,
            data: None,
        }
    }

    pub fn series(mut self, column: &str) -> Self {
        self.series = Some(column.to_string());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
