//! Regional diagnostic, comparison and evolution services.

use super::{
    non_empty, ChartKind, ChartSpec, Computed, ResultTable, Service, ServiceContext, ServiceKind,
    ServiceParams,
};
use crate::error::{Error, Result};
use crate::metrics::{compare_regions, regional_diagnostic, regional_evolution};
use crate::queries::{Param, QueryParams};
use crate::recommend::{DiagnosticMetrics, EvolutionMetrics, Metrics};
use crate::types::Observation;
use serde_json::json;

fn region_observations(ctx: &ServiceContext<'_>, region: &str) -> Result<Vec<Observation>> {
    let observations = ctx.observations(
        "region_observations",
        &QueryParams::new().with(Param::RegionCode, region.to_string()),
    )?;
    non_empty(observations, || format!("no observations for region {region}"))
}

// ============================================
// Diagnostic
// ============================================

pub struct RegionalDiagnostic;

impl Service for RegionalDiagnostic {
    fn kind(&self) -> ServiceKind {
        ServiceKind::RegionalDiagnostic
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let region = params.require("region_code")?;
        let observations = region_observations(ctx, region)?;
        let departments = ctx.db.list_departments_in_region(region)?.len();
        let rows = non_empty(regional_diagnostic(&observations, ctx.thresholds()), || {
            format!("no rates for region {region}")
        })?;

        let mut table = ResultTable::new(&[
            "region_code",
            "department",
            "category",
            "year",
            "rate",
            "regional_mean",
            "rank",
            "deviation_pct",
            "relative_level",
        ]);
        for row in &rows {
            table.push(vec![
                json!(row.region_code),
                json!(row.department),
                json!(row.category),
                json!(row.year),
                json!(row.rate),
                json!(row.regional_mean),
                json!(row.rank),
                json!(row.deviation_pct),
                json!(row.level.as_str()),
            ]);
        }

        let charts = vec![
            ChartSpec::new(
                ChartKind::Heatmap,
                format!("Rates by department - Region {region}"),
                "department",
                "category",
            )
            .data(json!({ "value": "rate" })),
            ChartSpec::new(ChartKind::Radar, "Deviation from the regional mean", "category", "deviation_pct")
                .series("department"),
        ];

        Ok(Computed {
            table,
            metrics: Some(Metrics::RegionalDiagnostic(DiagnosticMetrics {
                region: region.to_string(),
                departments,
                rows,
            })),
            summary: None,
            charts,
        })
    }
}

// ============================================
// Comparison
// ============================================

pub struct RegionalComparison;

impl Service for RegionalComparison {
    fn kind(&self) -> ServiceKind {
        ServiceKind::RegionalComparison
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let reference = params.require("region_code")?;
        let compared = params.require("comparison_region_code")?;

        let observations = ctx.observations(
            "region_pair_observations",
            &QueryParams::new()
                .with(Param::RegionCode, reference.to_string())
                .with(Param::ComparisonRegion, compared.to_string()),
        )?;
        let observations = non_empty(observations, || {
            format!("no observations for regions {reference} and {compared}")
        })?;
        let comparison = compare_regions(&observations, reference, compared);
        if comparison.is_empty() {
            return Err(Error::InsufficientData(format!(
                "no rates for regions {reference} and {compared}"
            )));
        }

        let mut table = ResultTable::new(&[
            "region_code",
            "role",
            "category",
            "year",
            "departments",
            "mean",
            "min",
            "max",
            "std_dev",
            "gap_pct",
        ]);
        for stats in &comparison.stats {
            let role = if stats.region_code == comparison.reference {
                "reference"
            } else {
                "compared"
            };
            let gap = comparison
                .gaps
                .iter()
                .find(|g| g.category == stats.category)
                .and_then(|g| g.gap_pct);
            table.push(vec![
                json!(stats.region_code),
                json!(role),
                json!(stats.category),
                json!(stats.year),
                json!(stats.departments),
                json!(stats.mean),
                json!(stats.min),
                json!(stats.max),
                json!(stats.std_dev),
                json!(gap),
            ]);
        }

        let charts = vec![
            ChartSpec::new(
                ChartKind::Bar,
                format!("Mean rate: Region {reference} vs Region {compared}"),
                "category",
                "mean",
            )
            .series("region_code"),
            ChartSpec::new(ChartKind::BoxPlot, "Spread of departmental rates", "category", "mean")
                .series("region_code")
                .data(json!({ "min": "min", "max": "max", "spread": "std_dev" })),
        ];

        Ok(Computed {
            table,
            metrics: Some(Metrics::RegionalComparison(comparison)),
            summary: None,
            charts,
        })
    }
}

// ============================================
// Evolution
// ============================================

pub struct RegionalEvolution;

impl Service for RegionalEvolution {
    fn kind(&self) -> ServiceKind {
        ServiceKind::RegionalEvolution
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let region = params.require("region_code")?;
        let observations = region_observations(ctx, region)?;
        let rows = non_empty(regional_evolution(&observations, region, ctx.thresholds()), || {
            format!("no rates for region {region}")
        })?;

        let mut table = ResultTable::new(&[
            "region_code",
            "category",
            "year",
            "mean_rate",
            "min_rate",
            "max_rate",
            "std_dev",
            "previous_mean",
            "evolution_pct",
            "trend",
        ]);
        for row in &rows {
            table.push(vec![
                json!(row.region_code),
                json!(row.category),
                json!(row.year),
                json!(row.mean_rate),
                json!(row.min_rate),
                json!(row.max_rate),
                json!(row.std_dev),
                json!(row.previous_mean),
                json!(row.evolution_pct),
                json!(row.trend.as_str()),
            ]);
        }

        let charts = vec![
            ChartSpec::new(
                ChartKind::Line,
                format!("Mean rate over time - Region {region}"),
                "year",
                "mean_rate",
            )
            .series("category"),
            ChartSpec::new(ChartKind::Heatmap, "Year-over-year change", "year", "category")
                .data(json!({ "value": "evolution_pct" })),
        ];

        Ok(Computed {
            table,
            metrics: Some(Metrics::RegionalEvolution(EvolutionMetrics {
                region: region.to_string(),
                rows,
            })),
            summary: None,
            charts,
        })
    }
}
