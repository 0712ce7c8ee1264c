//! Trailing-window anomaly detection.
//!
//! Each value is compared with the mean and population standard deviation
//! of a trailing window that ends on (and includes) the value itself.

use super::stats::{mean, pct_change, population_std, round2, DIVISION_FLOOR};
use super::thresholds::Thresholds;
use serde::Serialize;

/// Moving statistics for one position of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MovingStats {
    pub mean: f64,
    /// Population standard deviation over the window
    pub std_dev: f64,
    /// Number of values actually in the window (short at the series start)
    pub window_len: usize,
}

/// Trailing-window mean and standard deviation at every position.
///
/// The window covers the current value and up to `window - 1` preceding ones.
pub fn moving_stats(series: &[f64], window: usize) -> Vec<MovingStats> {
    let window = window.max(1);
    (0..series.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &series[start..=i];
            MovingStats {
                mean: mean(slice).unwrap_or(series[i]),
                std_dev: population_std(slice).unwrap_or(0.0),
                window_len: slice.len(),
            }
        })
        .collect()
}

/// Trailing-window moving average at every position.
pub fn moving_average(series: &[f64], window: usize) -> Vec<f64> {
    moving_stats(series, window).iter().map(|s| s.mean).collect()
}

/// Standard score of `value`; 0 when the deviation is zero or undefined.
pub fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    if !std_dev.is_finite() || std_dev.abs() < DIVISION_FLOOR {
        return 0.0;
    }
    let z = (value - mean) / std_dev;
    if z.is_finite() {
        z
    } else {
        0.0
    }
}

/// Alert tier of a z-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Normal,
    Watch,
    OrangeAlert,
    RedAlert,
}

impl AlertLevel {
    pub fn classify(z: f64, thresholds: &Thresholds) -> Self {
        if z > thresholds.alert_red_z {
            AlertLevel::RedAlert
        } else if z > thresholds.alert_orange_z {
            AlertLevel::OrangeAlert
        } else if z > thresholds.alert_watch_z {
            AlertLevel::Watch
        } else {
            AlertLevel::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::RedAlert => "red alert",
            AlertLevel::OrangeAlert => "orange alert",
            AlertLevel::Watch => "watch",
            AlertLevel::Normal => "normal",
        }
    }
}

/// Alert evaluation of one category at one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRow {
    pub category: String,
    pub year: i32,
    pub incident_count: i64,
    pub value: f64,
    pub moving_avg: f64,
    pub moving_std: f64,
    pub z_score: f64,
    pub level: AlertLevel,
    pub previous_value: Option<f64>,
    /// Change from the previous year in percent; 0 when that value was 0
    pub evolution_pct: Option<f64>,
    pub window_len: usize,
}

/// One category's yearly series.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySeries {
    pub category: String,
    /// (year, incident count, rate), any order
    pub points: Vec<(i32, i64, f64)>,
}

/// Evaluate every category at `year`, strongest anomaly first.
///
/// Categories without a value for `year` are left out.
pub fn evaluate_alerts(
    series: &[CategorySeries],
    year: i32,
    thresholds: &Thresholds,
) -> Vec<AlertRow> {
    let mut rows: Vec<AlertRow> = series
        .iter()
        .filter_map(|s| {
            let mut points = s.points.clone();
            points.sort_by_key(|(y, _, _)| *y);
            let idx = points.iter().position(|(y, _, _)| *y == year)?;
            let values: Vec<f64> = points.iter().map(|(_, _, v)| *v).collect();
            let stats = moving_stats(&values[..=idx], thresholds.moving_window)[idx];
            let (_, count, value) = points[idx];
            let z = z_score(value, stats.mean, stats.std_dev);
            let previous_value = idx.checked_sub(1).map(|p| values[p]);
            let evolution_pct = previous_value.map(|prev| pct_change(value, prev).unwrap_or(0.0));

            Some(AlertRow {
                category: s.category.clone(),
                year,
                incident_count: count,
                value,
                moving_avg: round2(stats.mean),
                moving_std: round2(stats.std_dev),
                z_score: round2(z),
                level: AlertLevel::classify(z, thresholds),
                previous_value,
                evolution_pct: evolution_pct.map(round2),
                window_len: stats.window_len,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.z_score
            .total_cmp(&a.z_score)
            .then_with(|| a.category.cmp(&b.category))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_stats_trailing_window() {
        let stats = moving_stats(&[1.0, 2.0, 3.0, 10.0], 3);
        assert_eq!(stats[0].window_len, 1);
        assert_eq!(stats[0].std_dev, 0.0);
        assert_eq!(stats[1].mean, 1.5);
        assert_eq!(stats[3].mean, 5.0);
        assert_eq!(stats[3].window_len, 3);
    }

    #[test]
    fn test_zero_deviation_gives_normal() {
        let t = Thresholds::default();
        let z = z_score(4.0, 4.0, 0.0);
        assert_eq!(z, 0.0);
        assert_eq!(AlertLevel::classify(z, &t), AlertLevel::Normal);
        assert_eq!(z_score(5.0, 4.0, f64::NAN), 0.0);
    }

    #[test]
    fn test_alert_tiers() {
        let t = Thresholds::default();
        assert_eq!(AlertLevel::classify(2.5, &t), AlertLevel::RedAlert);
        assert_eq!(AlertLevel::classify(2.0, &t), AlertLevel::OrangeAlert);
        assert_eq!(AlertLevel::classify(0.5, &t), AlertLevel::Watch);
        assert_eq!(AlertLevel::classify(0.0, &t), AlertLevel::Normal);
        assert_eq!(AlertLevel::classify(-1.0, &t), AlertLevel::Normal);
    }

    #[test]
    fn test_constant_series_never_alerts() {
        let t = Thresholds::default();
        let series = vec![CategorySeries {
            category: "Cambriolages".to_string(),
            points: vec![(2019, 10, 3.0), (2020, 10, 3.0), (2021, 10, 3.0)],
        }];
        let rows = evaluate_alerts(&series, 2021, &t);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].z_score, 0.0);
        assert_eq!(rows[0].level, AlertLevel::Normal);
        assert_eq!(rows[0].evolution_pct, Some(0.0));
    }

    #[test]
    fn test_first_year_has_no_previous() {
        let t = Thresholds::default();
        let series = vec![CategorySeries {
            category: "Vols".to_string(),
            points: vec![(2020, 5, 2.0), (2021, 8, 3.0)],
        }];
        let rows = evaluate_alerts(&series, 2020, &t);
        assert_eq!(rows[0].previous_value, None);
        assert_eq!(rows[0].evolution_pct, None);
        assert_eq!(rows[0].window_len, 1);
    }

    #[test]
    fn test_rows_ordered_by_z_desc() {
        let t = Thresholds::default();
        let series = vec![
            CategorySeries {
                category: "A".to_string(),
                points: vec![(2019, 1, 1.0), (2020, 1, 1.0), (2021, 1, 1.1)],
            },
            CategorySeries {
                category: "B".to_string(),
                points: vec![(2019, 1, 1.0), (2020, 1, 1.0), (2021, 1, 5.0)],
            },
        ];
        let rows = evaluate_alerts(&series, 2021, &t);
        assert_eq!(rows[0].category, "B");
        assert!(rows[0].z_score >= rows[1].z_score);
        assert!(rows[0].evolution_pct.unwrap() > 300.0);
    }
}
