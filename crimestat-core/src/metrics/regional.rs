//! Territorial metrics: departments against their regional mean, region
//! against region, and regional averages over time.
//!
//! Every computation works on per-mille rates. Observations without a rate
//! are ignored.

use super::stats::{mean, pct_change, population_std, round2, safe_div};
use super::thresholds::Thresholds;
use crate::types::Observation;
use serde::Serialize;
use std::collections::BTreeMap;

/// Position of a department's rate relative to its regional mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeLevel {
    VeryHigh,
    High,
    Average,
    Low,
    VeryLow,
}

impl RelativeLevel {
    /// Ratio bands around the mean. The very-low band is tested before the
    /// low one so it is reachable.
    pub fn classify(rate: f64, regional_mean: f64, thresholds: &Thresholds) -> Self {
        if rate > regional_mean * thresholds.regional_very_high {
            RelativeLevel::VeryHigh
        } else if rate > regional_mean * thresholds.regional_high {
            RelativeLevel::High
        } else if rate < regional_mean * thresholds.regional_very_low {
            RelativeLevel::VeryLow
        } else if rate < regional_mean * thresholds.regional_low {
            RelativeLevel::Low
        } else {
            RelativeLevel::Average
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelativeLevel::VeryHigh => "very high",
            RelativeLevel::High => "high",
            RelativeLevel::Average => "average",
            RelativeLevel::Low => "low",
            RelativeLevel::VeryLow => "very low",
        }
    }
}

/// Year-over-year direction of a regional average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionTrend {
    InitialYear,
    StrongIncrease,
    Increase,
    Stable,
    Decrease,
    StrongDecrease,
}

impl EvolutionTrend {
    /// `None` marks the first year of a series.
    pub fn classify(evolution_pct: Option<f64>, thresholds: &Thresholds) -> Self {
        let Some(pct) = evolution_pct else {
            return EvolutionTrend::InitialYear;
        };
        if pct > thresholds.evolution_strong_pct {
            EvolutionTrend::StrongIncrease
        } else if pct > thresholds.evolution_pct {
            EvolutionTrend::Increase
        } else if pct < -thresholds.evolution_strong_pct {
            EvolutionTrend::StrongDecrease
        } else if pct < -thresholds.evolution_pct {
            EvolutionTrend::Decrease
        } else {
            EvolutionTrend::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionTrend::InitialYear => "initial year",
            EvolutionTrend::StrongIncrease => "strong increase",
            EvolutionTrend::Increase => "increase",
            EvolutionTrend::Stable => "stable",
            EvolutionTrend::Decrease => "decrease",
            EvolutionTrend::StrongDecrease => "strong decrease",
        }
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, EvolutionTrend::StrongIncrease | EvolutionTrend::StrongDecrease)
    }
}

// ============================================
// Intra-regional diagnostic
// ============================================

/// One department/category of a region at the diagnostic year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticRow {
    pub region_code: String,
    pub department: String,
    pub category: String,
    pub year: i32,
    pub rate: f64,
    pub regional_mean: f64,
    /// 1 for the highest rate in the region; ties share a rank
    pub rank: usize,
    pub departments_in_region: usize,
    /// `None` when the regional mean is zero
    pub deviation_pct: Option<f64>,
    pub level: RelativeLevel,
}

/// Compare each department of a region to the regional mean at the latest
/// year present in `observations`.
///
/// Rows are ordered by category, then department code.
pub fn regional_diagnostic(observations: &[Observation], thresholds: &Thresholds) -> Vec<DiagnosticRow> {
    let Some(year) = observations
        .iter()
        .filter(|o| o.rate_per_mille.is_some())
        .map(|o| o.year)
        .max()
    else {
        return Vec::new();
    };

    let mut by_category: BTreeMap<&str, Vec<(&Observation, f64)>> = BTreeMap::new();
    for obs in observations.iter().filter(|o| o.year == year) {
        if let Some(rate) = obs.rate_per_mille {
            by_category.entry(obs.category.as_str()).or_default().push((obs, rate));
        }
    }

    let mut rows = Vec::new();
    for (category, members) in by_category {
        let rates: Vec<f64> = members.iter().map(|(_, r)| *r).collect();
        let regional_mean = mean(&rates).unwrap_or(0.0);
        for (obs, rate) in &members {
            let rank = 1 + rates.iter().filter(|other| **other > *rate).count();
            rows.push(DiagnosticRow {
                region_code: obs.region_code.clone(),
                department: obs.department.clone(),
                category: category.to_string(),
                year,
                rate: *rate,
                regional_mean: round2(regional_mean),
                rank,
                departments_in_region: members.len(),
                deviation_pct: pct_change(*rate, regional_mean).map(round2),
                level: RelativeLevel::classify(*rate, regional_mean, thresholds),
            });
        }
    }
    rows.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.department.cmp(&b.department))
    });
    rows
}

// ============================================
// Inter-regional comparison
// ============================================

/// Distribution of one category's department rates inside a region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStats {
    pub region_code: String,
    pub category: String,
    pub year: i32,
    pub departments: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population deviation across the region's departments
    pub std_dev: f64,
}

/// Per-category gap of the reference region over the compared one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGap {
    pub category: String,
    pub reference_mean: f64,
    pub compared_mean: f64,
    /// `(reference − compared) / compared`, in percent
    pub gap_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionalComparison {
    pub reference: String,
    pub compared: String,
    pub year: i32,
    /// Reference region rows first, each region ordered by category
    pub stats: Vec<RegionStats>,
    /// Categories reported by both regions
    pub gaps: Vec<CategoryGap>,
}

impl RegionalComparison {
    pub fn departments_in(&self, region_code: &str) -> usize {
        self.stats
            .iter()
            .filter(|s| s.region_code == region_code)
            .map(|s| s.departments)
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

fn region_stats(observations: &[Observation], region_code: &str, year: i32) -> Vec<RegionStats> {
    let mut by_category: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for obs in observations
        .iter()
        .filter(|o| o.region_code == region_code && o.year == year)
    {
        if let Some(rate) = obs.rate_per_mille {
            by_category.entry(obs.category.as_str()).or_default().push(rate);
        }
    }
    by_category
        .into_iter()
        .map(|(category, rates)| RegionStats {
            region_code: region_code.to_string(),
            category: category.to_string(),
            year,
            departments: rates.len(),
            mean: round2(mean(&rates).unwrap_or(0.0)),
            min: rates.iter().copied().fold(f64::INFINITY, f64::min),
            max: rates.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_dev: round2(population_std(&rates).unwrap_or(0.0)),
        })
        .collect()
}

/// Compare two regions at the latest year either of them reports.
///
/// `observations` may hold rows of both regions (and others, which are
/// ignored).
pub fn compare_regions(observations: &[Observation], reference: &str, compared: &str) -> RegionalComparison {
    let year = observations
        .iter()
        .filter(|o| (o.region_code == reference || o.region_code == compared) && o.rate_per_mille.is_some())
        .map(|o| o.year)
        .max()
        .unwrap_or_default();

    let reference_stats = region_stats(observations, reference, year);
    let compared_stats = region_stats(observations, compared, year);

    let gaps = reference_stats
        .iter()
        .filter_map(|r| {
            let c = compared_stats.iter().find(|c| c.category == r.category)?;
            Some(CategoryGap {
                category: r.category.clone(),
                reference_mean: r.mean,
                compared_mean: c.mean,
                gap_pct: pct_change(r.mean, c.mean).map(round2),
            })
        })
        .collect();

    let mut stats = reference_stats;
    stats.extend(compared_stats);
    RegionalComparison {
        reference: reference.to_string(),
        compared: compared.to_string(),
        year,
        stats,
        gaps,
    }
}

// ============================================
// Regional evolution
// ============================================

/// Regional average of one category in one year, against the year before.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionRow {
    pub region_code: String,
    pub category: String,
    pub year: i32,
    pub mean_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub std_dev: f64,
    pub previous_mean: Option<f64>,
    /// 0 for the first year of the series
    pub evolution_pct: f64,
    pub trend: EvolutionTrend,
}

/// Year-by-year regional averages per category, ordered by category then
/// year. The previous year is the previous one present in the data for that
/// category, not necessarily `year - 1`.
pub fn regional_evolution(
    observations: &[Observation],
    region_code: &str,
    thresholds: &Thresholds,
) -> Vec<EvolutionRow> {
    let mut grouped: BTreeMap<(&str, i32), Vec<f64>> = BTreeMap::new();
    for obs in observations.iter().filter(|o| o.region_code == region_code) {
        if let Some(rate) = obs.rate_per_mille {
            grouped.entry((obs.category.as_str(), obs.year)).or_default().push(rate);
        }
    }

    let mut rows = Vec::with_capacity(grouped.len());
    let mut previous: Option<(&str, f64)> = None;
    for ((category, year), rates) in grouped {
        let mean_rate = mean(&rates).unwrap_or(0.0);
        let previous_mean = match previous {
            Some((prev_category, prev_mean)) if prev_category == category => Some(prev_mean),
            _ => None,
        };
        let change = previous_mean.map(|prev| {
            safe_div(mean_rate - prev, prev)
                .map(|r| r * 100.0)
                .unwrap_or(0.0)
        });
        rows.push(EvolutionRow {
            region_code: region_code.to_string(),
            category: category.to_string(),
            year,
            mean_rate: round2(mean_rate),
            min_rate: rates.iter().copied().fold(f64::INFINITY, f64::min),
            max_rate: rates.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_dev: round2(population_std(&rates).unwrap_or(0.0)),
            previous_mean: previous_mean.map(round2),
            evolution_pct: round2(change.unwrap_or(0.0)),
            trend: EvolutionTrend::classify(change, thresholds),
        });
        previous = Some((category, mean_rate));
    }
    rows
}
