//! Neighbourhood, real-estate, business, insurance and transport services.
//!
//! All of them start from the yearly observations of one department; the
//! baseline services also need the national totals of each category.

use super::{
    non_empty, ChartKind, ChartSpec, Computed, ResultTable, Service, ServiceContext, ServiceKind,
    ServiceParams,
};
use crate::error::Result;
use crate::metrics::baseline::variation_pct;
use crate::metrics::{
    evaluate_alerts, evaluate_business, evaluate_real_estate, evaluate_route, national_rate,
    score_insurance, BaselineInput, CategorySeries,
};
use crate::queries::rows::{self, NationalTotal};
use crate::queries::{Param, QueryParams};
use crate::recommend::security::quintile_label;
use crate::recommend::{
    AlertMetrics, BusinessMetrics, InsuranceMetrics, Metrics, RealEstateMetrics, TransportMetrics,
};
use crate::types::Observation;
use serde_json::json;
use std::collections::BTreeMap;

/// National totals keyed by (category, year).
fn national_totals(ctx: &ServiceContext<'_>) -> Result<BTreeMap<(String, i32), NationalTotal>> {
    let totals = ctx
        .queries
        .fetch(ctx.db, "national_totals", &QueryParams::new(), rows::national_total)?;
    Ok(totals
        .into_iter()
        .map(|t| ((t.category.clone(), t.year), t))
        .collect())
}

/// Department observations paired with the national totals.
fn baseline_inputs(ctx: &ServiceContext<'_>, observations: &[Observation]) -> Result<Vec<BaselineInput>> {
    let totals = national_totals(ctx)?;
    Ok(observations
        .iter()
        .filter_map(|obs| {
            let national = totals.get(&(obs.category.clone(), obs.year))?;
            Some(BaselineInput {
                category: obs.category.clone(),
                year: obs.year,
                incident_count: obs.incident_count,
                population: obs.population,
                national_incidents: national.incidents,
                national_population: national.population,
            })
        })
        .collect())
}

fn observations_at(
    ctx: &ServiceContext<'_>,
    department: &str,
    year: i32,
) -> Result<Vec<Observation>> {
    let observations: Vec<Observation> = ctx
        .department_observations(department)?
        .into_iter()
        .filter(|o| o.year == year)
        .collect();
    non_empty(observations, || {
        format!("no observations for department {department} in {year}")
    })
}

// ============================================
// Neighbourhood alert
// ============================================

pub struct NeighborhoodAlert;

impl Service for NeighborhoodAlert {
    fn kind(&self) -> ServiceKind {
        ServiceKind::NeighborhoodAlert
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let department = params.require("department_code")?;
        let year = params.require_year("year")?;
        if let Some(radius) = params.get("radius") {
            tracing::debug!(radius, "Radius is accepted but not used by the alert computation");
        }

        let mut series: BTreeMap<String, Vec<(i32, i64, f64)>> = BTreeMap::new();
        for obs in ctx.department_observations(department)? {
            if let Some(rate) = obs.rate_per_mille {
                series
                    .entry(obs.category)
                    .or_default()
                    .push((obs.year, obs.incident_count, rate));
            }
        }
        let series: Vec<CategorySeries> = series
            .into_iter()
            .map(|(category, points)| CategorySeries { category, points })
            .collect();
        let rows = non_empty(evaluate_alerts(&series, year, ctx.thresholds()), || {
            format!("no observations for department {department} in {year}")
        })?;

        let mut table = ResultTable::new(&[
            "category",
            "year",
            "incident_count",
            "value",
            "moving_avg",
            "moving_std",
            "z_score",
            "alert_level",
            "previous_value",
            "evolution_pct",
        ]);
        for row in &rows {
            table.push(vec![
                json!(row.category),
                json!(row.year),
                json!(row.incident_count),
                json!(row.value),
                json!(row.moving_avg),
                json!(row.moving_std),
                json!(row.z_score),
                json!(row.level.as_str()),
                json!(row.previous_value),
                json!(row.evolution_pct),
            ]);
        }

        let charts = vec![
            ChartSpec::new(
                ChartKind::Bar,
                format!("Anomaly scores {year} - Department {department}"),
                "category",
                "z_score",
            )
            .data(json!({ "color": "alert_level" })),
            ChartSpec::new(ChartKind::Scatter, "Rate against moving average", "moving_avg", "value")
                .series("category"),
        ];

        Ok(Computed {
            table,
            metrics: Some(Metrics::NeighborhoodAlert(AlertMetrics {
                department: department.to_string(),
                year,
                rows,
            })),
            summary: None,
            charts,
        })
    }
}

// ============================================
// Real-estate security
// ============================================

pub struct RealEstateSecurity;

impl Service for RealEstateSecurity {
    fn kind(&self) -> ServiceKind {
        ServiceKind::RealEstateSecurity
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let department = params.require("department_code")?;
        let year = params.require_year("year")?;

        let observations = observations_at(ctx, department, year)?;
        let inputs = baseline_inputs(ctx, &observations)?;
        let rows = non_empty(evaluate_real_estate(&inputs, ctx.thresholds()), || {
            format!("no rates for department {department} in {year}")
        })?;

        let mut table = ResultTable::new(&[
            "category",
            "year",
            "incident_count",
            "local_rate",
            "national_rate",
            "variation_pct",
            "score",
            "risk_level",
        ]);
        for row in &rows {
            table.push(vec![
                json!(row.category),
                json!(row.year),
                json!(row.incident_count),
                json!(row.local_rate),
                json!(row.national_rate),
                json!(variation_pct(row.local_rate, row.national_rate)),
                json!(row.score),
                json!(row.risk.as_str()),
            ]);
        }

        let charts = vec![
            ChartSpec::new(
                ChartKind::Bar,
                format!("Local and national rates {year} - Department {department}"),
                "category",
                "local_rate",
            )
            .data(json!({ "compare": "national_rate" })),
            ChartSpec::new(ChartKind::Radar, "Safety score by category", "category", "score"),
        ];

        Ok(Computed {
            table,
            metrics: Some(Metrics::RealEstateSecurity(RealEstateMetrics {
                department: department.to_string(),
                year,
                rows,
            })),
            summary: None,
            charts,
        })
    }
}

// ============================================
// Business security
// ============================================

pub struct BusinessSecurity;

impl Service for BusinessSecurity {
    fn kind(&self) -> ServiceKind {
        ServiceKind::BusinessSecurity
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let department = params.require("department_code")?;
        let requested = params.year("year")?;

        let observations = non_empty(ctx.department_observations(department)?, || {
            format!("no observations for department {department}")
        })?;
        // Without a year the latest one on record is evaluated.
        let year = match requested {
            Some(year) => year,
            None => observations.iter().map(|o| o.year).max().unwrap_or_default(),
        };
        let inputs = baseline_inputs(ctx, &observations)?;
        let rows = non_empty(evaluate_business(&inputs, year, ctx.thresholds()), || {
            format!("no observations for department {department} in {year}")
        })?;

        let mut table = ResultTable::new(&[
            "category",
            "year",
            "incident_count",
            "local_rate",
            "national_rate",
            "variation_pct",
            "risk_level",
            "risk_per_10k",
            "evolution_pct",
            "first_year",
        ]);
        for row in &rows {
            table.push(vec![
                json!(row.category),
                json!(row.year),
                json!(row.incident_count),
                json!(row.local_rate),
                json!(row.national_rate),
                json!(row.variation_pct),
                json!(row.risk.as_str()),
                json!(row.risk_per_10k),
                json!(row.evolution_pct),
                json!(row.first_year),
            ]);
        }

        let charts = vec![
            ChartSpec::new(
                ChartKind::Bar,
                format!("Business exposure {year} - Department {department}"),
                "category",
                "risk_per_10k",
            ),
            ChartSpec::new(ChartKind::Bar, "Evolution since first year", "category", "evolution_pct"),
        ];

        Ok(Computed {
            table,
            metrics: Some(Metrics::BusinessSecurity(BusinessMetrics {
                department: department.to_string(),
                year,
                rows,
            })),
            summary: None,
            charts,
        })
    }
}

// ============================================
// Insurance optimisation
// ============================================

pub struct InsuranceOptimization;

impl Service for InsuranceOptimization {
    fn kind(&self) -> ServiceKind {
        ServiceKind::InsuranceOptimization
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let department = params.require("department_code")?;
        let year = params.require_year("year")?;

        let observations = observations_at(ctx, department, year)?;
        let (housing_units, population) = observations
            .first()
            .map(|o| (o.housing_units, o.population))
            .unwrap_or_default();
        let counts: Vec<(String, i64)> = observations
            .iter()
            .map(|o| (o.category.clone(), o.incident_count))
            .collect();
        let rows = score_insurance(&counts, housing_units, population, ctx.thresholds());
        let totals = national_totals(ctx)?;

        let mut table = ResultTable::new(&[
            "category",
            "incident_count",
            "local_rate",
            "national_rate",
            "variation_pct",
            "housing_risk",
            "score",
            "quintile",
            "risk_level",
            "relative_index",
        ]);
        for row in &rows {
            let national = totals
                .get(&(row.category.clone(), year))
                .and_then(|t| national_rate(t.incidents, t.population));
            let variation = match (row.population_risk, national) {
                (Some(local), Some(national)) => variation_pct(local, national),
                _ => None,
            };
            table.push(vec![
                json!(row.category),
                json!(row.incident_count),
                json!(row.population_risk),
                json!(national),
                json!(variation),
                json!(row.housing_risk),
                json!(row.score),
                json!(row.quintile),
                json!(quintile_label(row.quintile, ctx.thresholds().quintile_bins)),
                json!(row.relative_index),
            ]);
        }

        let charts = vec![
            ChartSpec::new(
                ChartKind::Bar,
                format!("Composite risk {year} - Department {department}"),
                "category",
                "score",
            )
            .data(json!({ "color": "quintile" })),
            ChartSpec::new(ChartKind::Radar, "Risk relative to the department mean", "category", "relative_index"),
        ];

        Ok(Computed {
            table,
            metrics: Some(Metrics::InsuranceOptimization(InsuranceMetrics {
                department: department.to_string(),
                year,
                rows,
            })),
            summary: None,
            charts,
        })
    }
}

// ============================================
// Transport security
// ============================================

pub struct TransportSecurity;

impl Service for TransportSecurity {
    fn kind(&self) -> ServiceKind {
        ServiceKind::TransportSecurity
    }

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed> {
        let origin = params.require("department_code")?;
        let destination = params.require("dest_department")?;
        if let Some(month) = params.get("month") {
            tracing::debug!(month, "Month is accepted but yearly figures are used");
        }
        let categories: Vec<&str> = match params.get("crime_type") {
            Some(category) => vec![category],
            None => ctx.config.transport.categories.iter().map(String::as_str).collect(),
        };

        let observations: Vec<Observation> = ctx
            .observations(
                "route_observations",
                &QueryParams::new()
                    .with(Param::DepartmentCode, origin.to_string())
                    .with(Param::DestDepartment, destination.to_string()),
            )?
            .into_iter()
            .filter(|o| categories.contains(&o.category.as_str()))
            .collect();
        let observations = non_empty(observations, || {
            format!("no transport observations for {origin} and {destination}")
        })?;
        let rows = non_empty(evaluate_route(&observations, ctx.thresholds()), || {
            format!("no rates for {origin} and {destination}")
        })?;

        let mut table = ResultTable::new(&[
            "department",
            "category",
            "year",
            "incident_count",
            "rate",
            "rate_100k",
            "moving_avg",
            "previous_rate",
            "rank",
            "evolution_pct",
            "evolution_ma_pct",
            "tendency",
            "risk_level",
            "score",
        ]);
        for row in &rows {
            table.push(vec![
                json!(row.department),
                json!(row.category),
                json!(row.year),
                json!(row.incident_count),
                json!(row.rate),
                json!(row.rate_100k),
                json!(row.moving_avg),
                json!(row.previous_rate),
                json!(row.rank),
                json!(row.evolution_pct),
                json!(row.evolution_ma_pct),
                json!(row.tendency.as_str()),
                json!(row.risk.as_str()),
                json!(row.score),
            ]);
        }

        let charts = vec![
            ChartSpec::new(
                ChartKind::Bar,
                format!("Security score: {origin} → {destination}"),
                "category",
                "score",
            )
            .series("department"),
            ChartSpec::new(ChartKind::Radar, "Rate per 100 000 inhabitants", "category", "rate_100k")
                .series("department"),
            ChartSpec::new(ChartKind::Gauge, "Route security score", "department", "score")
                .data(json!({ "min": 0, "max": 100 })),
        ];

        Ok(Computed {
            table,
            metrics: Some(Metrics::TransportSecurity(TransportMetrics {
                origin: origin.to_string(),
                destination: destination.to_string(),
                rows,
            })),
            summary: None,
            charts,
        })
    }
}
