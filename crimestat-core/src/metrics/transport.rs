//! Route security between two departments.
//!
//! Each (department, category) series is scored at the latest year either
//! department reports: rate per 100 000, change against the previous year
//! and against the trailing moving average, and where the year ranks in the
//! series' own history.

use super::alert::moving_average;
use super::stats::{mean, pct_change, round2};
use super::thresholds::Thresholds;
use crate::types::Observation;
use serde::Serialize;
use std::collections::BTreeMap;

/// Short-term direction of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tendency {
    StrongIncrease,
    Increase,
    Stable,
    ModerateVariation,
    Decrease,
    StrongDecrease,
}

impl Tendency {
    /// `evolution` is the change against the previous year (`None` without a
    /// usable previous year), `evolution_ma` the change against the moving
    /// average.
    pub fn classify(evolution: Option<f64>, evolution_ma: f64, t: &Thresholds) -> Self {
        let Some(evo) = evolution else {
            return Tendency::Stable;
        };
        let strong = t.transport_strong_evolution_pct;
        let strong_ma = t.transport_strong_ma_pct;
        let moderate = t.transport_evolution_pct;
        if evo > strong || evolution_ma > strong_ma {
            Tendency::StrongIncrease
        } else if evo > moderate || evolution_ma > moderate {
            Tendency::Increase
        } else if evo < -strong || evolution_ma < -strong_ma {
            Tendency::StrongDecrease
        } else if evo < -moderate || evolution_ma < -moderate {
            Tendency::Decrease
        } else if evo.abs() <= t.transport_stable_pct
            && evolution_ma.abs() <= t.transport_stable_ma_pct
        {
            Tendency::Stable
        } else {
            Tendency::ModerateVariation
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tendency::StrongIncrease => "strong increase",
            Tendency::Increase => "increase",
            Tendency::Stable => "stable",
            Tendency::ModerateVariation => "moderate variation",
            Tendency::Decrease => "decrease",
            Tendency::StrongDecrease => "strong decrease",
        }
    }

    pub fn is_rising(&self) -> bool {
        matches!(self, Tendency::StrongIncrease | Tendency::Increase)
    }
}

/// Five-tier route risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportRisk {
    VeryHigh,
    High,
    Moderate,
    Low,
    VeryLow,
}

impl TransportRisk {
    /// `rank` 1 is the worst year of the series.
    pub fn classify(rate_100k: f64, evolution: Option<f64>, rank: usize, t: &Thresholds) -> Self {
        let evo = evolution.unwrap_or(0.0);
        let rising = evolution.is_some_and(|e| e > 0.0);
        if rate_100k > t.transport_very_high_rate
            || (rate_100k > t.transport_very_high_rising_rate
                && evo > t.transport_very_high_evolution_pct)
            || (rank == 1 && rising)
        {
            TransportRisk::VeryHigh
        } else if rate_100k > t.transport_high_rate
            || (rate_100k > t.transport_high_rising_rate && evo > t.transport_high_evolution_pct)
            || rank <= t.transport_high_rank
        {
            TransportRisk::High
        } else if rate_100k > t.transport_moderate_rate
            || (rate_100k > t.transport_moderate_rising_rate
                && evo > t.transport_moderate_evolution_pct)
        {
            TransportRisk::Moderate
        } else if rate_100k > t.transport_low_rate {
            TransportRisk::Low
        } else {
            TransportRisk::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportRisk::VeryHigh => "very high",
            TransportRisk::High => "high",
            TransportRisk::Moderate => "moderate",
            TransportRisk::Low => "low",
            TransportRisk::VeryLow => "very low",
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, TransportRisk::VeryHigh | TransportRisk::High)
    }
}

/// Security score out of 100; higher is safer.
pub fn security_score(
    rate_100k: f64,
    evolution: Option<f64>,
    evolution_ma: f64,
    t: &Thresholds,
) -> f64 {
    let penalty = rate_100k * t.transport_rate_weight
        + evolution.unwrap_or(0.0).max(0.0) * t.transport_evolution_weight
        + evolution_ma.max(0.0) * t.transport_ma_weight;
    (100.0 - penalty).clamp(0.0, 100.0)
}

/// One department/category of a route at the evaluation year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportRow {
    pub department: String,
    pub category: String,
    pub year: i32,
    pub incident_count: i64,
    pub rate: f64,
    pub rate_100k: f64,
    pub moving_avg: f64,
    pub previous_rate: Option<f64>,
    /// Rank of this year's rate in the series' history, 1 = worst year
    pub rank: usize,
    /// `None` when there is no previous year or its rate is zero
    pub evolution_pct: Option<f64>,
    /// 0 when the moving average is zero
    pub evolution_ma_pct: f64,
    pub tendency: Tendency,
    pub risk: TransportRisk,
    pub score: f64,
}

/// Score every series of `observations` at the latest year present.
///
/// Rows are ordered by department, then by score (highest first).
pub fn evaluate_route(observations: &[Observation], t: &Thresholds) -> Vec<TransportRow> {
    let mut series: BTreeMap<(&str, &str), Vec<(i32, i64, f64)>> = BTreeMap::new();
    for obs in observations {
        if let Some(rate) = obs.rate_per_mille {
            series
                .entry((obs.department.as_str(), obs.category.as_str()))
                .or_default()
                .push((obs.year, obs.incident_count, rate));
        }
    }
    let Some(year) = series.values().flatten().map(|(y, _, _)| *y).max() else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for ((department, category), mut points) in series {
        points.sort_by_key(|(y, _, _)| *y);
        let Some(idx) = points.iter().position(|(y, _, _)| *y == year) else {
            continue;
        };
        let (_, incident_count, rate) = points[idx];
        let rates: Vec<f64> = points[..=idx].iter().map(|(_, _, r)| *r).collect();
        let moving_avg = moving_average(&rates, t.moving_window)
            .last()
            .copied()
            .unwrap_or(rate);
        let previous_rate = idx.checked_sub(1).map(|p| points[p].2);
        let evolution = previous_rate.and_then(|prev| pct_change(rate, prev)).map(round2);
        let evolution_ma = pct_change(rate, moving_avg).map(round2).unwrap_or(0.0);
        let rank = 1 + points.iter().filter(|(_, _, r)| *r > rate).count();
        let rate_100k = rate * 100.0;

        rows.push(TransportRow {
            department: department.to_string(),
            category: category.to_string(),
            year,
            incident_count,
            rate,
            rate_100k: round2(rate_100k),
            moving_avg: round2(moving_avg),
            previous_rate,
            rank,
            evolution_pct: evolution,
            evolution_ma_pct: evolution_ma,
            tendency: Tendency::classify(evolution, evolution_ma, t),
            risk: TransportRisk::classify(rate_100k, evolution, rank, t),
            score: round2(security_score(rate_100k, evolution, evolution_ma, t)),
        });
    }

    rows.sort_by(|a, b| {
        a.department
            .cmp(&b.department)
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| a.category.cmp(&b.category))
    });
    rows
}

/// Mean security score of one department's rows.
pub fn average_score(rows: &[TransportRow], department: &str) -> Option<f64> {
    let scores: Vec<f64> = rows
        .iter()
        .filter(|r| r.department == department)
        .map(|r| r.score)
        .collect();
    mean(&scores).map(round2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(dept: &str, category: &str, year: i32, rate: f64) -> Observation {
        Observation {
            department: dept.to_string(),
            region_code: "11".to_string(),
            category: category.to_string(),
            year,
            incident_count: (rate * 1000.0) as i64,
            rate_per_mille: Some(rate),
            population: 1_000_000,
            housing_units: 500_000,
        }
    }

    #[test]
    fn test_tendency_rules() {
        let t = Thresholds::default();
        assert_eq!(Tendency::classify(None, 40.0, &t), Tendency::Stable);
        assert_eq!(Tendency::classify(Some(25.0), 0.0, &t), Tendency::StrongIncrease);
        assert_eq!(Tendency::classify(Some(0.0), 12.0, &t), Tendency::Increase);
        assert_eq!(Tendency::classify(Some(-25.0), 0.0, &t), Tendency::StrongDecrease);
        assert_eq!(Tendency::classify(Some(-12.0), 0.0, &t), Tendency::Decrease);
        assert_eq!(Tendency::classify(Some(4.0), 6.0, &t), Tendency::Stable);
        assert_eq!(Tendency::classify(Some(8.0), 0.0, &t), Tendency::ModerateVariation);
    }

    #[test]
    fn test_tendency_follows_configured_bands() {
        let t = Thresholds {
            transport_strong_evolution_pct: 40.0,
            transport_strong_ma_pct: 40.0,
            transport_evolution_pct: 30.0,
            ..Default::default()
        };
        assert!(t.validate().is_ok());
        assert_eq!(Tendency::classify(Some(25.0), 0.0, &t), Tendency::ModerateVariation);
        assert!(!Tendency::classify(Some(25.0), 0.0, &t).is_rising());
        assert_eq!(Tendency::classify(Some(45.0), 0.0, &t), Tendency::StrongIncrease);
    }

    #[test]
    fn test_risk_tiers() {
        let t = Thresholds::default();
        assert_eq!(TransportRisk::classify(55.0, None, 3, &t), TransportRisk::VeryHigh);
        assert_eq!(TransportRisk::classify(5.0, Some(1.0), 1, &t), TransportRisk::VeryHigh);
        assert_eq!(TransportRisk::classify(5.0, None, 1, &t), TransportRisk::High);
        assert_eq!(TransportRisk::classify(21.0, Some(-3.0), 4, &t), TransportRisk::Moderate);
        assert_eq!(TransportRisk::classify(12.0, None, 4, &t), TransportRisk::Low);
        assert_eq!(TransportRisk::classify(2.0, None, 5, &t), TransportRisk::VeryLow);
    }

    #[test]
    fn test_risk_follows_configured_rates() {
        let t = Thresholds {
            transport_very_high_rate: 100.0,
            transport_very_high_rising_rate: 100.0,
            transport_high_rate: 80.0,
            transport_high_rising_rate: 80.0,
            transport_high_rank: 1,
            ..Default::default()
        };
        assert!(t.validate().is_ok());
        assert_eq!(TransportRisk::classify(55.0, None, 3, &t), TransportRisk::Moderate);
        assert!(!TransportRisk::classify(55.0, None, 2, &t).is_high());
    }

    #[test]
    fn test_score_bounds() {
        let t = Thresholds::default();
        assert_eq!(security_score(500.0, Some(90.0), 90.0, &t), 0.0);
        assert_eq!(security_score(0.0, Some(-50.0), -20.0, &t), 100.0);
        for rate in [0.0, 0.1, 12.5, 60.0, 300.0] {
            for evo in [None, Some(-80.0), Some(0.0), Some(250.0)] {
                let s = security_score(rate, evo, 35.0, &t);
                assert!((0.0..=100.0).contains(&s));
            }
        }
    }

    #[test]
    fn test_score_weights_are_configurable() {
        let t = Thresholds {
            transport_rate_weight: 1.0,
            transport_evolution_weight: 0.0,
            transport_ma_weight: 0.0,
            ..Default::default()
        };
        assert_eq!(security_score(30.0, Some(50.0), 50.0, &t), 70.0);
    }

    #[test]
    fn test_moving_average_uses_configured_window() {
        let data = vec![
            obs("75", "Vols de véhicules", 2019, 0.1),
            obs("75", "Vols de véhicules", 2020, 0.2),
            obs("75", "Vols de véhicules", 2021, 0.3),
            obs("75", "Vols de véhicules", 2022, 0.4),
        ];
        let wide = Thresholds {
            moving_window: 4,
            ..Default::default()
        };
        assert_eq!(evaluate_route(&data, &wide)[0].moving_avg, 0.25);
        assert_eq!(evaluate_route(&data, &Thresholds::default())[0].moving_avg, 0.3);
    }

    #[test]
    fn test_route_rows_at_latest_year() {
        let data = vec![
            obs("75", "Vols de véhicules", 2020, 0.2),
            obs("75", "Vols de véhicules", 2021, 0.3),
            obs("75", "Vols de véhicules", 2022, 0.4),
            obs("13", "Vols de véhicules", 2022, 0.1),
            obs("13", "Vols avec armes", 2021, 0.1),
        ];
        let rows = evaluate_route(&data, &Thresholds::default());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.year == 2022));
        assert_eq!(rows[0].department, "13");
        assert_eq!(rows[0].evolution_pct, None);
        assert_eq!(rows[0].evolution_ma_pct, 0.0);

        let paris = &rows[1];
        assert_eq!(paris.rate_100k, 40.0);
        assert_eq!(paris.moving_avg, 0.3);
        assert_eq!(paris.previous_rate, Some(0.3));
        assert_eq!(paris.rank, 1);
        assert_eq!(paris.evolution_pct, Some(33.33));
        assert_eq!(paris.tendency, Tendency::StrongIncrease);
        assert_eq!(paris.risk, TransportRisk::VeryHigh);
        assert!(paris.score < 60.0);
        assert_eq!(average_score(&rows, "75"), Some(paris.score));
    }
}
