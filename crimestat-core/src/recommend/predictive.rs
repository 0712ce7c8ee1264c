//! Text for the projection, emerging-risk and seasonal services.

use crate::format::{signed, signed_pct};
use crate::metrics::stats::{mean, pct_change};
use crate::metrics::{
    CorrelationMatrix, GrowthSummary, Grouping, PointKind, ProjectionRow, Reliability,
    SeasonalBucket, Thresholds, TrendFit,
};

/// Fitted trend and projection rows of one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryProjection {
    pub category: String,
    pub fit: TrendFit,
    pub rows: Vec<ProjectionRow>,
}

impl CategoryProjection {
    /// Last observed value.
    pub fn last_historical(&self) -> Option<&ProjectionRow> {
        self.rows
            .iter()
            .filter(|r| r.kind == PointKind::Historical)
            .last()
    }

    pub fn at(&self, year: i32) -> Option<&ProjectionRow> {
        self.rows.iter().find(|r| r.year == year)
    }

    /// Change of the projection at `year` over the last observed value, in percent.
    pub fn variation_to(&self, year: i32) -> Option<f64> {
        pct_change(self.at(year)?.value, self.last_historical()?.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMetrics {
    pub department: String,
    pub target_year: i32,
    pub series: Vec<CategoryProjection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmergingRiskMetrics {
    pub department: String,
    pub summaries: Vec<GrowthSummary>,
    pub correlations: CorrelationMatrix,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalMetrics {
    pub department: String,
    /// `None` when every category is pooled
    pub category: Option<String>,
    pub grouping: Grouping,
    pub buckets: Vec<SeasonalBucket>,
}

pub(super) fn projection_text(m: &ProjectionMetrics, t: &Thresholds) -> String {
    let mut lines = vec![format!("Projection analysis - Department {}:", m.department)];

    for series in &m.series {
        let Some(target) = series.at(m.target_year) else {
            continue;
        };
        let variation = series.variation_to(m.target_year);

        lines.push(String::new());
        lines.push(format!("{}:", series.category));
        lines.push(format!(
            "- Projection {}: {:.1}‰ ({} vs last observed value)",
            m.target_year,
            target.value,
            signed_pct(variation)
        ));
        lines.push(format!(
            "- Confidence interval: [{:.1} - {:.1}]‰",
            target.lower_bound, target.upper_bound
        ));
        lines.push(match series.fit.reliability(t) {
            Reliability::Reliable => format!("- Reliable prediction (R² > {})", t.r2_reliable),
            Reliability::ModeratelyReliable => {
                format!("- Moderately reliable prediction (R² > {})", t.r2_moderate)
            }
            Reliability::Unreliable => {
                format!("- Unreliable prediction (R² ≤ {})", t.r2_moderate)
            }
        });
        if let Some(v) = variation {
            if v > t.projection_strong_pct {
                lines.push("- Strong projected increase".to_string());
            } else if v < -t.projection_strong_pct {
                lines.push("- Strong projected decrease".to_string());
            } else if v.abs() <= t.projection_stable_pct {
                lines.push("- Stable trend".to_string());
            }
        }
    }

    lines.join("\n")
}

pub(super) fn emerging_risk_text(m: &EmergingRiskMetrics, t: &Thresholds) -> String {
    let mut lines = vec![format!("Risk analysis - Department {}:", m.department)];

    let strong: Vec<&GrowthSummary> = m.summaries.iter().filter(|s| s.trend.is_strong()).collect();
    if !strong.is_empty() {
        lines.push(String::new());
        lines.push("Significant trends:".to_string());
        for s in strong {
            lines.push(format!(
                "- {}: {} (projected variation {}%)",
                s.category,
                s.trend.as_str(),
                signed(s.variation_projected)
            ));
        }
    }

    let pairs = m.correlations.strong_pairs(t.strong_correlation);
    if !pairs.is_empty() {
        lines.push(String::new());
        lines.push("Significant correlations:".to_string());
        for (a, b, r) in pairs {
            lines.push(format!("- {a} and {b} evolve similarly (corr: {:.2})", r.abs()));
        }
    }

    let latest: Vec<f64> = m.summaries.iter().map(|s| s.latest_value).collect();
    let latest_mean = mean(&latest).unwrap_or(0.0);
    let priority: Vec<&GrowthSummary> = m
        .summaries
        .iter()
        .filter(|s| s.variation_projected > t.priority_variation_pct && s.latest_value > latest_mean)
        .collect();
    if !priority.is_empty() {
        lines.push(String::new());
        lines.push("Priority attention points:".to_string());
        for s in priority {
            lines.push(format!(
                "- {}: already above average and projected to rise sharply ({}%)",
                s.category,
                signed(s.variation_projected)
            ));
        }
    }

    lines.join("\n")
}

pub(super) fn seasonal_text(m: &SeasonalMetrics) -> String {
    let scope = m.category.as_deref().unwrap_or("all categories");
    let mut lines = vec![format!(
        "Seasonal profile - Department {} ({}, by {}):",
        m.department,
        scope,
        m.grouping.as_str()
    )];

    lines.push(String::new());
    for b in &m.buckets {
        let projection = match b.projection {
            Some(p) => format!("projection {}: {:.0}", b.projection_year, p),
            None => "no projection (fewer than two years)".to_string(),
        };
        lines.push(format!(
            "- {}: {:.1} incidents per year on average ({:.1}% of the total), {}",
            b.bucket, b.mean, b.share_pct, projection
        ));
    }

    if let Some(peak) = m.buckets.iter().max_by(|a, b| a.mean.total_cmp(&b.mean)) {
        lines.push(String::new());
        lines.push(format!("Peak period: {}", peak.bucket));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{project_series, summarize_growth};

    fn projection(points: &[(i32, f64)], target: i32) -> ProjectionMetrics {
        let t = Thresholds::default();
        let (fit, rows) = project_series("Vols", points, target, &t).unwrap();
        ProjectionMetrics {
            department: "75".to_string(),
            target_year: target,
            series: vec![CategoryProjection {
                category: "Vols".to_string(),
                fit,
                rows,
            }],
        }
    }

    #[test]
    fn test_projection_text_on_rising_line() {
        let m = projection(&[(2019, 1.0), (2020, 2.0), (2021, 3.0), (2022, 4.0)], 2025);
        let text = projection_text(&m, &Thresholds::default());
        assert!(text.starts_with("Projection analysis - Department 75:"));
        assert!(text.contains("- Projection 2025: 7.0‰ (+75.0% vs last observed value)"));
        assert!(text.contains("Reliable prediction"));
        assert!(text.contains("Strong projected increase"));
    }

    #[test]
    fn test_projection_text_flat_series() {
        let m = projection(&[(2021, 2.0), (2022, 2.0)], 2024);
        let text = projection_text(&m, &Thresholds::default());
        assert!(text.contains("Unreliable prediction"));
        assert!(text.contains("Stable trend"));
    }

    #[test]
    fn test_emerging_risk_priority() {
        let t = Thresholds::default();
        let summaries = vec![
            summarize_growth("Vols", &[(2020, 10.0), (2021, 15.0), (2022, 25.0)], &t).unwrap(),
            summarize_growth("Cambriolages", &[(2020, 1.0), (2021, 1.0), (2022, 1.0)], &t).unwrap(),
        ];
        let series = vec![
            ("Vols".to_string(), vec![(2020, 10.0), (2021, 15.0), (2022, 25.0)]),
            ("Cambriolages".to_string(), vec![(2020, 1.0), (2021, 1.0), (2022, 1.0)]),
        ];
        let m = EmergingRiskMetrics {
            department: "13".to_string(),
            summaries,
            correlations: CorrelationMatrix::build(&series, 3),
        };
        let text = emerging_risk_text(&m, &t);
        assert!(text.starts_with("Risk analysis - Department 13:"));
        assert!(text.contains("- Vols: strong increase"));
        assert!(text.contains("Priority attention points:"));
        assert!(!text.contains("Significant correlations:"));
    }
}
