//! Composite insurance risk score and quintile binning.

use super::stats::{mean, round2, round_to, safe_div};
use super::thresholds::Thresholds;
use serde::Serialize;

/// Per-capita components of the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompositeScore {
    /// Incidents per housing unit
    pub housing_risk: Option<f64>,
    /// Incidents per 1000 inhabitants
    pub population_risk: Option<f64>,
    /// Weighted sum; a missing component counts as 0
    pub score: f64,
}

/// Weighted combination of the housing and population ratios.
pub fn composite_score(
    incidents: i64,
    housing_units: i64,
    population: i64,
    thresholds: &Thresholds,
) -> CompositeScore {
    let housing_risk = safe_div(incidents as f64, housing_units as f64);
    let population_risk = safe_div(incidents as f64, population as f64).map(|r| r * 1000.0);
    let score = housing_risk.unwrap_or(0.0) * thresholds.risk_housing_weight
        + population_risk.unwrap_or(0.0) * thresholds.risk_population_weight;
    CompositeScore {
        housing_risk,
        population_risk,
        score,
    }
}

/// Rank `scores` into `bins` equal-count groups, numbered from 1 (lowest).
///
/// Ties keep input order (stable sort). When the count does not divide
/// evenly the first `n % bins` groups get one extra member, and with fewer
/// scores than bins only `n` groups exist. The result is indexed like the
/// input.
pub fn quintiles(scores: &[f64], bins: usize) -> Vec<usize> {
    let n = scores.len();
    let bins = bins.max(1).min(n.max(1));
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let base = n / bins;
    let extra = n % bins;
    let mut ranks = vec![0; n];
    let mut pos = 0;
    for bin in 0..bins {
        let size = base + usize::from(bin < extra);
        for idx in &order[pos..pos + size] {
            ranks[*idx] = bin + 1;
        }
        pos += size;
    }
    ranks
}

/// Number of labelled risk tiers, whatever the bin count.
pub const RISK_TIERS: usize = 5;

/// Map bin `quintile` of `bins` onto tiers `1..=RISK_TIERS` by the bin's
/// centre, so the top bin is always the top tier.
pub fn risk_tier(quintile: usize, bins: usize) -> usize {
    let bins = bins.max(1);
    let quintile = quintile.clamp(1, bins);
    (2 * quintile - 1) * RISK_TIERS / (2 * bins) + 1
}

/// Score relative to the scope mean, as a percentage (0 when the mean is 0).
pub fn relative_index(score: f64, scope_mean: f64) -> f64 {
    safe_div(score, scope_mean).map(|r| r * 100.0).unwrap_or(0.0)
}

/// Insurance evaluation of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsuranceRow {
    pub category: String,
    pub incident_count: i64,
    pub housing_risk: Option<f64>,
    pub population_risk: Option<f64>,
    pub score: f64,
    /// 1 (lowest risk) to 5
    pub quintile: usize,
    pub relative_index: f64,
}

/// Score, bin and index every (category, incidents) of one department-year.
///
/// Rows come back ordered by score, highest first.
pub fn score_insurance(
    counts: &[(String, i64)],
    housing_units: i64,
    population: i64,
    thresholds: &Thresholds,
) -> Vec<InsuranceRow> {
    let composites: Vec<CompositeScore> = counts
        .iter()
        .map(|(_, n)| composite_score(*n, housing_units, population, thresholds))
        .collect();
    let scores: Vec<f64> = composites.iter().map(|c| c.score).collect();
    let ranks = quintiles(&scores, thresholds.quintile_bins);
    let scope_mean = mean(&scores).unwrap_or(0.0);

    let mut rows: Vec<InsuranceRow> = counts
        .iter()
        .zip(composites)
        .zip(ranks)
        .map(|(((category, n), c), quintile)| InsuranceRow {
            category: category.clone(),
            incident_count: *n,
            housing_risk: c.housing_risk.map(|v| round_to(v, 4)),
            population_risk: c.population_risk.map(|v| round_to(v, 4)),
            score: round_to(c.score, 4),
            quintile,
            relative_index: round2(relative_index(c.score, scope_mean)),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.category.cmp(&b.category))
    });
    rows
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_risk_tier_identity_for_five_bins() {
        for q in 1..=5 {
            assert_eq!(risk_tier(q, 5), q);
        }
    }

    #[test]
    fn test_risk_tier_scales_with_bins() {
        let tiers: Vec<usize> = (1..=10).map(|q| risk_tier(q, 10)).collect();
        assert_eq!(tiers, vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5]);
        assert_eq!(risk_tier(1, 1), 3);
        assert_eq!(risk_tier(3, 3), 5);
        assert_eq!(risk_tier(1, 3), 1);
    }

    use super::*;

    #[test]
    fn test_composite_weights() {
        let t = Thresholds::default();
        let c = composite_score(100, 1000, 10_000, &t);
        assert_eq!(c.housing_risk, Some(0.1));
        assert_eq!(c.population_risk, Some(10.0));
        assert!((c.score - (0.1 * 0.6 + 10.0 * 0.4)).abs() < 1e-12);
    }

    #[test]
    fn test_composite_zero_denominators() {
        let t = Thresholds::default();
        let c = composite_score(100, 0, 0, &t);
        assert_eq!(c.housing_risk, None);
        assert_eq!(c.score, 0.0);
    }

    #[test]
    fn test_quintiles_uneven_split() {
        let scores: Vec<f64> = (1..=7).map(|v| v as f64).collect();
        let ranks = quintiles(&scores, 5);
        assert_eq!(ranks, vec![1, 1, 2, 2, 3, 4, 5]);
    }

    #[test]
    fn test_quintiles_fewer_scores_than_bins() {
        let ranks = quintiles(&[3.0, 1.0, 2.0], 5);
        assert_eq!(ranks, vec![3, 1, 2]);
    }

    #[test]
    fn test_quintiles_monotonic_in_score() {
        let scores = [5.5, 0.2, 9.1, 3.3, 3.3, 7.0, 1.1, 8.8, 2.2, 6.4, 4.0];
        let ranks = quintiles(&scores, 5);
        let distinct: std::collections::BTreeSet<usize> = ranks.iter().copied().collect();
        assert_eq!(distinct.len(), 5);
        for i in 0..scores.len() {
            for j in 0..scores.len() {
                if scores[i] < scores[j] {
                    assert!(ranks[i] <= ranks[j]);
                }
            }
        }
    }

    #[test]
    fn test_quintiles_ties_keep_input_order() {
        let ranks = quintiles(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0], 5);
        assert_eq!(ranks, vec![1, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_relative_index_zero_mean() {
        assert_eq!(relative_index(3.0, 0.0), 0.0);
        assert_eq!(relative_index(3.0, 2.0), 150.0);
    }

    #[test]
    fn test_score_insurance_orders_desc() {
        let t = Thresholds::default();
        let counts = vec![
            ("A".to_string(), 10),
            ("B".to_string(), 500),
            ("C".to_string(), 50),
        ];
        let rows = score_insurance(&counts, 10_000, 20_000, &t);
        assert_eq!(rows[0].category, "B");
        assert_eq!(rows[0].quintile, 3);
        assert_eq!(rows[2].quintile, 1);
        let total: f64 = rows.iter().map(|r| r.relative_index).sum();
        assert!((total - 300.0).abs() < 0.05);
    }
}
