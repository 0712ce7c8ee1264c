//! Seasonal and quarterly aggregation of monthly counts.
//!
//! Monthly counts are summed per (bucket, year); each bucket then gets the
//! mean and sample deviation of its yearly totals and a linear projection of
//! the year after the last one observed.

use super::stats::{mean, round2, sample_std, safe_div};
use super::trend::fit_trend;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// How months are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// Dec–Feb winter, Mar–May spring, Jun–Aug summer, Sep–Nov autumn
    #[default]
    Season,
    /// Calendar quarters
    Quarter,
}

impl Grouping {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grouping::Season => "season",
            Grouping::Quarter => "quarter",
        }
    }

    /// Bucket of a month (1..=12) as (sort order, label).
    pub fn bucket(&self, month: u32) -> Option<(u8, &'static str)> {
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(match self {
            Grouping::Season => match month {
                12 | 1 | 2 => (0, "winter"),
                3..=5 => (1, "spring"),
                6..=8 => (2, "summer"),
                _ => (3, "autumn"),
            },
            Grouping::Quarter => match month {
                1..=3 => (0, "Q1"),
                4..=6 => (1, "Q2"),
                7..=9 => (2, "Q3"),
                _ => (3, "Q4"),
            },
        })
    }
}

impl std::str::FromStr for Grouping {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "season" | "seasons" => Ok(Grouping::Season),
            "quarter" | "quarters" => Ok(Grouping::Quarter),
            _ => Err(format!("unknown grouping: {}", s)),
        }
    }
}

/// One monthly count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyPoint {
    pub year: i32,
    pub month: u32,
    pub incidents: f64,
}

/// Aggregate of one bucket across years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalBucket {
    pub bucket: &'static str,
    pub order: u8,
    pub mean: f64,
    /// Sample deviation of yearly totals; 0 with a single year
    pub std_dev: f64,
    pub years: usize,
    pub total: f64,
    /// Share of all incidents falling in this bucket, in percent
    pub share_pct: f64,
    pub projection_year: i32,
    /// None when the bucket spans fewer years than the trend minimum
    pub projection: Option<f64>,
}

/// Per-bucket profile of monthly counts.
///
/// A bucket is projected only when it spans at least `min_points` years.
pub fn seasonal_profile(
    points: &[MonthlyPoint],
    grouping: Grouping,
    min_points: usize,
) -> Result<Vec<SeasonalBucket>> {
    let mut totals: BTreeMap<(u8, &'static str), BTreeMap<i32, f64>> = BTreeMap::new();
    for p in points {
        if let Some(key) = grouping.bucket(p.month) {
            *totals.entry(key).or_default().entry(p.year).or_insert(0.0) += p.incidents;
        }
    }
    if totals.is_empty() {
        return Err(Error::InsufficientData(
            "no monthly observations to aggregate".to_string(),
        ));
    }

    let grand_total: f64 = totals.values().flat_map(|years| years.values()).sum();
    let last_year = totals
        .values()
        .flat_map(|years| years.keys())
        .max()
        .copied()
        .unwrap_or_default();

    let buckets = totals
        .into_iter()
        .map(|((order, bucket), years)| {
            let values: Vec<f64> = years.values().copied().collect();
            let series: Vec<(i32, f64)> = years.iter().map(|(y, v)| (*y, *v)).collect();
            let total: f64 = values.iter().sum();
            let projection = fit_trend(&series, min_points)
                .ok()
                .map(|fit| round2(fit.project(last_year + 1).max(0.0)));
            SeasonalBucket {
                bucket,
                order,
                mean: round2(mean(&values).unwrap_or(0.0)),
                std_dev: round2(sample_std(&values).unwrap_or(0.0)),
                years: values.len(),
                total,
                share_pct: round2(safe_div(total * 100.0, grand_total).unwrap_or(0.0)),
                projection_year: last_year + 1,
                projection,
            }
        })
        .collect();
    Ok(buckets)
}
