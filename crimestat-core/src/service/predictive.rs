//! Projection, emerging-risk and seasonal services.

use super::{
    non_empty, ChartKind, ChartSpec, Computed, ResultTable, Service, ServiceContext, ServiceKind,
    ServiceParams,
};
use crate::error::{Error, Result};
use crate::metrics::{
    project_series, seasonal_profile, summarize_growth, CorrelationMatrix, Grouping, MonthlyPoint,
};
use crate::queries::{rows, Param, QueryParams};
use crate::recommend::{
    CategoryProjection, EmergingRiskMetrics, Metrics, ProjectionMetrics, SeasonalMetrics,
};
use crate::types::Observation;
use serde_json::json;
use std::collections::BTreeMap;

/// Accepted projection horizon, in full years.
const TARGET_YEARS: std::ops::RangeInclusive<i32> = 2024..=2030;

/// (year, rate) points of each category, categories in name order.
pub(crate) fn rate_series(observations: &[Observation]) -> BTreeMap<String, Vec<(i32, f64)>> {
    let mut series: BTreeMap<String, Vec<(i32, f64)>> = BTreeMap::new();
    for obs in observations {
        if let Some(rate) = obs.rate_per_mille {
            series
                .entry(obs.category.clone())
                .or_default()
                .push((obs.year, rate));
        }
    }
    for points in series.values_mut() {
        points.sort_by_key(|(year, _)| *year);
    }
    series
}

// ============================================
// Trend projection
// ============================================

pub struct TrendProjection;

impl Service for TrendProjection {
    fn kind(&self) -> ServiceKind {
        ServiceKind::TrendProjection
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let department = params.require("department_code")?;
        let target_year = params.require_year("target_year")?;
        if !TARGET_YEARS.contains(&target_year) {
            return Err(Error::Validation(format!(
                "target_year must be between 24 and 30, got {target_year}"
            )));
        }
        let crime_type = params.get("crime_type");
        let t = ctx.thresholds();

        let observations: Vec<Observation> = ctx
            .department_observations(department)?
            .into_iter()
            .filter(|o| crime_type.map_or(true, |c| o.category == c))
            .collect();
        let observations = non_empty(observations, || {
            format!("no observations for department {department}")
        })?;

        let mut series = Vec::new();
        for (category, points) in rate_series(&observations) {
            match project_series(&category, &points, target_year, t) {
                Ok((fit, rows)) => series.push(CategoryProjection {
                    category,
                    fit,
                    rows,
                }),
                // A named category must be projectable; in the overview the
                // short series are left out.
                Err(Error::InsufficientData(reason)) if crime_type.is_none() => {
                    tracing::debug!(category = %category, reason = %reason, "Skipping category");
                }
                Err(err) => return Err(err),
            }
        }
        let series = non_empty(series, || {
            format!("no category of department {department} has enough points for a trend")
        })?;

        let mut table = ResultTable::new(&[
            "category",
            "year",
            "value",
            "lower_bound",
            "upper_bound",
            "slope",
            "r_squared",
            "kind",
        ]);
        for row in series.iter().flat_map(|s| &s.rows) {
            table.push(vec![
                json!(row.category),
                json!(row.year),
                json!(row.value),
                json!(row.lower_bound),
                json!(row.upper_bound),
                json!(row.slope),
                json!(row.r_squared),
                json!(row.kind.as_str()),
            ]);
        }

        let charts = vec![ChartSpec::new(
            ChartKind::Line,
            format!("Projected rates to {target_year} - Department {department}"),
            "year",
            "value",
        )
        .series("category")
        .data(json!({ "lower": "lower_bound", "upper": "upper_bound", "split": "kind" }))];

        Ok(Computed {
            table,
            metrics: Some(Metrics::TrendProjection(ProjectionMetrics {
                department: department.to_string(),
                target_year,
                series,
            })),
            summary: None,
            charts,
        })
    }
}

// ============================================
// Emerging risk
// ============================================

pub struct EmergingRisk;

impl Service for EmergingRisk {
    fn kind(&self) -> ServiceKind {
        ServiceKind::EmergingRisk
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let department = params.require("department_code")?;
        let t = ctx.thresholds();

        let series: Vec<(String, Vec<(i32, f64)>)> =
            rate_series(&ctx.department_observations(department)?)
                .into_iter()
                .collect();
        let summaries: Vec<_> = series
            .iter()
            .filter_map(|(category, points)| summarize_growth(category, points, t))
            .collect();
        let summaries = non_empty(summaries, || {
            format!("no observations for department {department}")
        })?;
        let correlations = CorrelationMatrix::build(&series, t.min_correlation_points);

        let mut table = ResultTable::new(&[
            "category",
            "growth_rate",
            "latest_year",
            "latest_value",
            "projected_next",
            "trend",
            "variation_projected",
            "correlated_category",
            "correlation",
        ]);
        for s in &summaries {
            let partner = correlations.strongest_partner(&s.category);
            table.push(vec![
                json!(s.category),
                json!(s.growth_rate),
                json!(s.latest_year),
                json!(s.latest_value),
                json!(s.projected_next),
                json!(s.trend.as_str()),
                json!(s.variation_projected),
                json!(partner.map(|(name, _)| name)),
                json!(partner.map(|(_, r)| r)),
            ]);
        }

        let charts = vec![
            ChartSpec::new(
                ChartKind::Bar,
                format!("Projected variation - Department {department}"),
                "category",
                "variation_projected",
            ),
            ChartSpec::new(ChartKind::Heatmap, "Correlations between categories", "category", "category")
                .data(serde_json::to_value(&correlations)?),
        ];

        Ok(Computed {
            table,
            metrics: Some(Metrics::EmergingRisk(EmergingRiskMetrics {
                department: department.to_string(),
                summaries,
                correlations,
            })),
            summary: None,
            charts,
        })
    }
}

// ============================================
// Seasonal profile
// ============================================

pub struct SeasonalProfile;

fn parse_grouping(raw: Option<&str>) -> Result<Grouping> {
    raw.map_or(Ok(Grouping::default()), |g| g.parse().map_err(Error::Validation))
}

impl Service for SeasonalProfile {
    fn kind(&self) -> ServiceKind {
        ServiceKind::SeasonalProfile
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let department = params.require("department_code")?;
        let crime_type = params.get("crime_type");
        let grouping = parse_grouping(params.get("grouping"))?;

        let counts = ctx.queries.fetch(
            ctx.db,
            "department_monthly",
            &QueryParams::new().with(Param::DepartmentCode, department.to_string()),
            rows::monthly_count,
        )?;

        // Categories are pooled unless one is named.
        let mut pooled: BTreeMap<(i32, u32), f64> = BTreeMap::new();
        for count in counts
            .iter()
            .filter(|c| crime_type.map_or(true, |name| c.category == name))
        {
            *pooled.entry((count.year, count.month)).or_insert(0.0) += count.incidents as f64;
        }
        let points: Vec<MonthlyPoint> = pooled
            .into_iter()
            .map(|((year, month), incidents)| MonthlyPoint {
                year,
                month,
                incidents,
            })
            .collect();
        let points = non_empty(points, || {
            format!("no monthly observations for department {department}")
        })?;
        let buckets = seasonal_profile(&points, grouping, ctx.thresholds().min_trend_points)?;

        let mut table = ResultTable::new(&[
            "bucket",
            "mean",
            "std_dev",
            "years",
            "total",
            "share_pct",
            "projection_year",
            "projection",
        ]);
        for b in &buckets {
            table.push(vec![
                json!(b.bucket),
                json!(b.mean),
                json!(b.std_dev),
                json!(b.years),
                json!(b.total),
                json!(b.share_pct),
                json!(b.projection_year),
                json!(b.projection),
            ]);
        }

        let charts = vec![
            ChartSpec::new(
                ChartKind::Bar,
                format!("Incidents by {} - Department {department}", grouping.as_str()),
                "bucket",
                "mean",
            ),
            ChartSpec::new(ChartKind::BoxPlot, "Year-to-year spread", "bucket", "mean")
                .data(json!({ "spread": "std_dev" })),
        ];

        Ok(Computed {
            table,
            metrics: Some(Metrics::SeasonalProfile(SeasonalMetrics {
                department: department.to_string(),
                category: crime_type.map(str::to_string),
                grouping,
                buckets,
            })),
            summary: None,
            charts,
        })
    }
}
