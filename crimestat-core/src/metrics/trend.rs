//! Linear trend fitting and projection.
//!
//! Slope and intercept follow the method-of-moments form of ordinary least
//! squares:
//!
//! ```text
//! slope     = (mean(x·y) - mean(x)·mean(y)) / (mean(x²) - mean(x)²)
//! intercept = mean(y) - slope·mean(x)
//! ```
//!
//! Both moments are computed on centred values, which is algebraically the
//! same and keeps precision with four-digit years.

use super::stats::{mean, round2, safe_div, sample_std};
use super::thresholds::Thresholds;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeSet;

/// Fitted line over (year, value) points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendFit {
    pub slope: f64,
    pub intercept: f64,
    /// Squared Pearson correlation of year and value, clamped to [0, 1]
    pub r_squared: f64,
    /// Sample standard deviation of the historical values
    pub std_dev: f64,
    pub n_points: usize,
    pub first_year: i32,
    pub last_year: i32,
}

/// Reliability label derived from R².
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    Reliable,
    ModeratelyReliable,
    Unreliable,
}

impl Reliability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reliability::Reliable => "reliable",
            Reliability::ModeratelyReliable => "moderately reliable",
            Reliability::Unreliable => "unreliable",
        }
    }
}

impl TrendFit {
    /// Value of the fitted line at `year`.
    pub fn project(&self, year: i32) -> f64 {
        self.intercept + self.slope * year as f64
    }

    /// Confidence band around the projection: ± z·std.
    pub fn band(&self, year: i32, z: f64) -> (f64, f64) {
        let p = self.project(year);
        (p - z * self.std_dev, p + z * self.std_dev)
    }

    pub fn reliability(&self, thresholds: &Thresholds) -> Reliability {
        if self.r_squared > thresholds.r2_reliable {
            Reliability::Reliable
        } else if self.r_squared > thresholds.r2_moderate {
            Reliability::ModeratelyReliable
        } else {
            Reliability::Unreliable
        }
    }
}

/// Fit a line through `points`.
///
/// Needs at least `min_points` points spanning two distinct years.
pub fn fit_trend(points: &[(i32, f64)], min_points: usize) -> Result<TrendFit> {
    let min_points = min_points.max(2);
    if points.len() < min_points {
        return Err(Error::InsufficientData(format!(
            "trend fit needs at least {min_points} points, got {}",
            points.len()
        )));
    }
    let distinct: BTreeSet<i32> = points.iter().map(|(x, _)| *x).collect();
    if distinct.len() < 2 {
        return Err(Error::InsufficientData(
            "trend fit needs at least two distinct years".to_string(),
        ));
    }

    let xs: Vec<f64> = points.iter().map(|(x, _)| *x as f64).collect();
    let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
    let n = xs.len() as f64;
    // non-empty: checked above
    let x_mean = mean(&xs).unwrap_or_default();
    let y_mean = mean(&ys).unwrap_or_default();

    let cov = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum::<f64>()
        / n;
    let var_x = xs.iter().map(|x| (x - x_mean).powi(2)).sum::<f64>() / n;
    let var_y = ys.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n;

    let slope = safe_div(cov, var_x).ok_or_else(|| {
        Error::InsufficientData("trend fit needs variation in years".to_string())
    })?;
    let intercept = y_mean - slope * x_mean;

    let r_squared = safe_div(cov, (var_x * var_y).sqrt())
        .map(|r| r * r)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    Ok(TrendFit {
        slope,
        intercept,
        r_squared,
        std_dev: sample_std(&ys).unwrap_or(0.0),
        n_points: points.len(),
        first_year: *distinct.iter().next().unwrap_or(&0),
        last_year: *distinct.iter().next_back().unwrap_or(&0),
    })
}

/// Whether a projection row is observed or extrapolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Historical,
    Projection,
}

impl PointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointKind::Historical => "historical",
            PointKind::Projection => "projection",
        }
    }
}

/// One year of a category projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionRow {
    pub category: String,
    pub year: i32,
    /// Observed rate for historical years, fitted value otherwise
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub slope: f64,
    pub r_squared: f64,
    pub n_points: usize,
    pub kind: PointKind,
}

/// Projection of one category from its first observed year up to `target_year`.
pub fn project_series(
    category: &str,
    points: &[(i32, f64)],
    target_year: i32,
    thresholds: &Thresholds,
) -> Result<(TrendFit, Vec<ProjectionRow>)> {
    let fit = fit_trend(points, thresholds.min_trend_points)?;

    let rows = (fit.first_year..=target_year)
        .map(|year| {
            let fitted = fit.project(year);
            let (lower, upper) = fit.band(year, thresholds.confidence_z);
            let kind = if year > fit.last_year {
                PointKind::Projection
            } else {
                PointKind::Historical
            };
            let observed = points.iter().find(|(x, _)| *x == year).map(|(_, y)| *y);
            let value = match kind {
                PointKind::Historical => observed.unwrap_or(fitted),
                PointKind::Projection => fitted,
            };
            ProjectionRow {
                category: category.to_string(),
                year,
                value: round2(value),
                lower_bound: round2(lower),
                upper_bound: round2(upper),
                slope: fit.slope,
                r_squared: fit.r_squared,
                n_points: fit.n_points,
                kind,
            }
        })
        .collect();

    Ok((fit, rows))
}
