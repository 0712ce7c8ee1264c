//! Year-over-year growth of a category series.

use super::stats::{mean, round2, safe_div};
use super::thresholds::Thresholds;
use serde::Serialize;

/// Direction and strength of a growth rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthTrend {
    StrongIncrease,
    ModerateIncrease,
    Stable,
    ModerateDecrease,
    StrongDecrease,
}

impl GrowthTrend {
    /// Classify a growth rate expressed as a fraction (0.1 = 10 %).
    pub fn classify(growth: f64, thresholds: &Thresholds) -> Self {
        if growth > thresholds.growth_strong {
            GrowthTrend::StrongIncrease
        } else if growth > thresholds.growth_moderate {
            GrowthTrend::ModerateIncrease
        } else if growth < -thresholds.growth_strong {
            GrowthTrend::StrongDecrease
        } else if growth < -thresholds.growth_moderate {
            GrowthTrend::ModerateDecrease
        } else {
            GrowthTrend::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthTrend::StrongIncrease => "strong increase",
            GrowthTrend::ModerateIncrease => "moderate increase",
            GrowthTrend::Stable => "stable",
            GrowthTrend::ModerateDecrease => "moderate decrease",
            GrowthTrend::StrongDecrease => "strong decrease",
        }
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, GrowthTrend::StrongIncrease | GrowthTrend::StrongDecrease)
    }
}

/// Growth summary of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthSummary {
    pub category: String,
    /// Mean relative year-over-year change, as a fraction
    pub growth_rate: f64,
    pub latest_year: i32,
    pub latest_value: f64,
    /// `latest_value × (1 + growth_rate)`
    pub projected_next: f64,
    pub trend: GrowthTrend,
    /// `growth_rate` in percent
    pub variation_projected: f64,
}

/// Mean relative change between consecutive points.
///
/// The first point and points following a zero value contribute 0, so the
/// mean is taken over every point of the series.
pub fn mean_growth(values: &[f64]) -> Option<f64> {
    let changes: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, v)| match i.checked_sub(1).map(|p| values[p]) {
            Some(prev) => safe_div(v - prev, prev).unwrap_or(0.0),
            None => 0.0,
        })
        .collect();
    mean(&changes)
}

/// Summarise one category's (year, rate) points; `None` when empty.
pub fn summarize_growth(
    category: &str,
    points: &[(i32, f64)],
    thresholds: &Thresholds,
) -> Option<GrowthSummary> {
    let mut points = points.to_vec();
    points.sort_by_key(|(year, _)| *year);
    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let growth = mean_growth(&values)?;
    let (latest_year, latest_value) = *points.last()?;

    Some(GrowthSummary {
        category: category.to_string(),
        growth_rate: growth,
        latest_year,
        latest_value,
        projected_next: round2(latest_value * (1.0 + growth)),
        trend: GrowthTrend::classify(growth, thresholds),
        variation_projected: round2(growth * 100.0),
    })
}
