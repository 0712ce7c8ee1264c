//! Comparison of a department against the national baseline.
//!
//! The national rate of a (category, year) is the pooled rate over every
//! department that reports it: total incidents per 1000 total inhabitants.

use super::stats::{pct_change, round2, safe_div};
use super::thresholds::Thresholds;
use serde::Serialize;
use std::collections::BTreeMap;

/// Incidents per 1000 inhabitants.
pub fn rate_per_mille(incidents: i64, population: i64) -> Option<f64> {
    safe_div(incidents as f64 * 1000.0, population as f64)
}

/// Pooled national rate per 1000 inhabitants.
pub fn national_rate(total_incidents: i64, total_population: i64) -> Option<f64> {
    rate_per_mille(total_incidents, total_population)
}

/// Safety score against the national rate, in percent.
///
/// Positive means safer than the nation. A national rate of exactly zero
/// yields 0; otherwise the denominator is floored at `epsilon`.
pub fn baseline_score(national: f64, local: f64, epsilon: f64) -> f64 {
    if national == 0.0 {
        return 0.0;
    }
    (national - local) / national.max(epsilon) * 100.0
}

/// Relative gap of the local rate over the national one, in percent.
pub fn variation_pct(local: f64, national: f64) -> Option<f64> {
    pct_change(local, national)
}

/// Real-estate risk class of a baseline score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineRisk {
    High,
    Moderate,
    Low,
}

impl BaselineRisk {
    pub fn classify(score: f64, thresholds: &Thresholds) -> Self {
        if score < thresholds.baseline_high_risk {
            BaselineRisk::High
        } else if score < thresholds.baseline_low_risk {
            BaselineRisk::Moderate
        } else {
            BaselineRisk::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineRisk::High => "high",
            BaselineRisk::Moderate => "moderate",
            BaselineRisk::Low => "low",
        }
    }
}

/// Business risk class from the local/national ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessRisk {
    Critical,
    High,
    Moderate,
}

impl BusinessRisk {
    pub fn classify(local: f64, national: f64, thresholds: &Thresholds) -> Self {
        if local > national * thresholds.business_critical_ratio {
            BusinessRisk::Critical
        } else if local > national * thresholds.business_high_ratio {
            BusinessRisk::High
        } else {
            BusinessRisk::Moderate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessRisk::Critical => "critical",
            BusinessRisk::High => "high",
            BusinessRisk::Moderate => "moderate",
        }
    }
}

/// Department figures for one (category, year) next to the national totals.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineInput {
    pub category: String,
    pub year: i32,
    pub incident_count: i64,
    pub population: i64,
    pub national_incidents: i64,
    pub national_population: i64,
}

impl BaselineInput {
    fn rates(&self) -> Option<(f64, f64)> {
        Some((
            rate_per_mille(self.incident_count, self.population)?,
            national_rate(self.national_incidents, self.national_population)?,
        ))
    }
}

/// Real-estate security evaluation of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealEstateRow {
    pub category: String,
    pub year: i32,
    pub incident_count: i64,
    pub population: i64,
    pub local_rate: f64,
    pub national_rate: f64,
    pub score: f64,
    pub risk: BaselineRisk,
}

/// Score every category of one department-year, ordered by category.
///
/// Inputs with a zero population on either side are dropped.
pub fn evaluate_real_estate(inputs: &[BaselineInput], thresholds: &Thresholds) -> Vec<RealEstateRow> {
    let mut rows: Vec<RealEstateRow> = inputs
        .iter()
        .filter_map(|input| {
            let (local, national) = input.rates()?;
            let score = baseline_score(national, local, thresholds.national_epsilon);
            Some(RealEstateRow {
                category: input.category.clone(),
                year: input.year,
                incident_count: input.incident_count,
                population: input.population,
                local_rate: round2(local),
                national_rate: round2(national),
                score: round2(score),
                risk: BaselineRisk::classify(score, thresholds),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.category.cmp(&b.category));
    rows
}

/// Business security evaluation of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessRow {
    pub category: String,
    pub year: i32,
    pub incident_count: i64,
    pub local_rate: f64,
    pub national_rate: f64,
    pub variation_pct: Option<f64>,
    pub risk: BusinessRisk,
    /// Incidents per 10 000 inhabitants
    pub risk_per_10k: f64,
    /// Change of the local rate between the first observed year and `year`
    pub evolution_pct: Option<f64>,
    pub first_year: i32,
}

/// Evaluate every category at `year`, with its evolution over the period.
///
/// `inputs` holds all years of the department. Rows come back with the
/// highest local rate first.
pub fn evaluate_business(
    inputs: &[BaselineInput],
    year: i32,
    thresholds: &Thresholds,
) -> Vec<BusinessRow> {
    let mut first_by_category: BTreeMap<&str, (i32, f64)> = BTreeMap::new();
    for input in inputs {
        if input.year > year {
            continue;
        }
        if let Some((local, _)) = input.rates() {
            let entry = first_by_category
                .entry(input.category.as_str())
                .or_insert((input.year, local));
            if input.year < entry.0 {
                *entry = (input.year, local);
            }
        }
    }

    let mut rows: Vec<BusinessRow> = inputs
        .iter()
        .filter(|input| input.year == year)
        .filter_map(|input| {
            let (local, national) = input.rates()?;
            let (first_year, first_local) = first_by_category
                .get(input.category.as_str())
                .copied()
                .unwrap_or((year, local));
            let evolution_pct = if first_year < year {
                pct_change(local, first_local).map(round2)
            } else {
                None
            };
            Some(BusinessRow {
                category: input.category.clone(),
                year,
                incident_count: input.incident_count,
                local_rate: round2(local),
                national_rate: round2(national),
                variation_pct: variation_pct(local, national).map(round2),
                risk: BusinessRisk::classify(local, national, thresholds),
                risk_per_10k: round2(local * 10.0),
                evolution_pct,
                first_year,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.local_rate
            .total_cmp(&a.local_rate)
            .then_with(|| a.category.cmp(&b.category))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(category: &str, year: i32, incidents: i64, nat_incidents: i64) -> BaselineInput {
        BaselineInput {
            category: category.to_string(),
            year,
            incident_count: incidents,
            population: 100_000,
            national_incidents: nat_incidents,
            national_population: 1_000_000,
        }
    }

    #[test]
    fn test_baseline_score_zero_national() {
        assert_eq!(baseline_score(0.0, 5.0, 0.001), 0.0);
    }

    #[test]
    fn test_baseline_score_sign() {
        // local twice the national rate: 100 % worse
        assert_eq!(baseline_score(2.0, 4.0, 0.001), -100.0);
        assert_eq!(baseline_score(2.0, 1.0, 0.001), 50.0);
    }

    #[test]
    fn test_baseline_classification() {
        let t = Thresholds::default();
        assert_eq!(BaselineRisk::classify(-25.0, &t), BaselineRisk::High);
        assert_eq!(BaselineRisk::classify(-20.0, &t), BaselineRisk::Moderate);
        assert_eq!(BaselineRisk::classify(19.9, &t), BaselineRisk::Moderate);
        assert_eq!(BaselineRisk::classify(20.0, &t), BaselineRisk::Low);
    }

    #[test]
    fn test_business_classification() {
        let t = Thresholds::default();
        assert_eq!(BusinessRisk::classify(1.6, 1.0, &t), BusinessRisk::Critical);
        assert_eq!(BusinessRisk::classify(1.3, 1.0, &t), BusinessRisk::High);
        assert_eq!(BusinessRisk::classify(1.2, 1.0, &t), BusinessRisk::Moderate);
    }

    #[test]
    fn test_real_estate_rows() {
        let t = Thresholds::default();
        let rows = evaluate_real_estate(
            &[input("Vols", 2022, 300, 2000), input("Cambriolages", 2022, 100, 2000)],
            &t,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].category, "Cambriolages");
        assert_eq!(rows[0].local_rate, 1.0);
        assert_eq!(rows[0].national_rate, 2.0);
        assert_eq!(rows[0].risk, BaselineRisk::Low);
        assert_eq!(rows[1].score, -50.0);
        assert_eq!(rows[1].risk, BaselineRisk::High);
    }

    #[test]
    fn test_business_evolution_over_period() {
        let t = Thresholds::default();
        let inputs = vec![
            input("Vols", 2020, 100, 1000),
            input("Vols", 2021, 150, 1000),
            input("Vols", 2022, 200, 1000),
        ];
        let rows = evaluate_business(&inputs, 2022, &t);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].first_year, 2020);
        assert_eq!(rows[0].evolution_pct, Some(100.0));
        assert_eq!(rows[0].risk, BusinessRisk::Critical);
        assert_eq!(rows[0].risk_per_10k, 20.0);
        assert_eq!(rows[0].variation_pct, Some(100.0));
    }
}
