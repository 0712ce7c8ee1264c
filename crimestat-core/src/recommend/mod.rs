//! Recommendation generator
//!
//! Turns metric engine output into plain-text guidance. Generation is a pure
//! function of the metrics and the [`Thresholds`] in force:
//! - an empty selection gives [`NO_DATA_MESSAGE`]
//! - the first line names the department, region or route analysed
//! - only rows past a significance threshold are listed

pub mod predictive;
pub mod security;
pub mod territorial;

pub use predictive::{CategoryProjection, EmergingRiskMetrics, ProjectionMetrics, SeasonalMetrics};
pub use security::{AlertMetrics, BusinessMetrics, InsuranceMetrics, RealEstateMetrics, TransportMetrics};
pub use territorial::{DiagnosticMetrics, EvolutionMetrics};

use crate::metrics::{RegionalComparison, Thresholds};

/// Text returned for an empty selection.
pub const NO_DATA_MESSAGE: &str = "No data available for this selection";

/// Metrics of one service run, ready for text generation.
#[derive(Debug, Clone, PartialEq)]
pub enum Metrics {
    TrendProjection(ProjectionMetrics),
    EmergingRisk(EmergingRiskMetrics),
    NeighborhoodAlert(AlertMetrics),
    RealEstateSecurity(RealEstateMetrics),
    BusinessSecurity(BusinessMetrics),
    InsuranceOptimization(InsuranceMetrics),
    TransportSecurity(TransportMetrics),
    SeasonalProfile(SeasonalMetrics),
    RegionalDiagnostic(DiagnosticMetrics),
    RegionalComparison(RegionalComparison),
    RegionalEvolution(EvolutionMetrics),
}

impl Metrics {
    pub fn is_empty(&self) -> bool {
        match self {
            Metrics::TrendProjection(m) => m.series.is_empty(),
            Metrics::EmergingRisk(m) => m.summaries.is_empty(),
            Metrics::NeighborhoodAlert(m) => m.rows.is_empty(),
            Metrics::RealEstateSecurity(m) => m.rows.is_empty(),
            Metrics::BusinessSecurity(m) => m.rows.is_empty(),
            Metrics::InsuranceOptimization(m) => m.rows.is_empty(),
            Metrics::TransportSecurity(m) => m.rows.is_empty(),
            Metrics::SeasonalProfile(m) => m.buckets.is_empty(),
            Metrics::RegionalDiagnostic(m) => m.rows.is_empty(),
            Metrics::RegionalComparison(m) => m.is_empty(),
            Metrics::RegionalEvolution(m) => m.rows.is_empty(),
        }
    }
}

/// Generate the recommendation text for `metrics`.
pub fn generate(metrics: &Metrics, thresholds: &Thresholds) -> String {
    if metrics.is_empty() {
        return NO_DATA_MESSAGE.to_string();
    }
    match metrics {
        Metrics::TrendProjection(m) => predictive::projection_text(m, thresholds),
        Metrics::EmergingRisk(m) => predictive::emerging_risk_text(m, thresholds),
        Metrics::SeasonalProfile(m) => predictive::seasonal_text(m),
        Metrics::NeighborhoodAlert(m) => security::alert_text(m, thresholds),
        Metrics::RealEstateSecurity(m) => security::real_estate_text(m, thresholds),
        Metrics::BusinessSecurity(m) => security::business_text(m, thresholds),
        Metrics::InsuranceOptimization(m) => security::insurance_text(m, thresholds),
        Metrics::TransportSecurity(m) => security::transport_text(m, thresholds),
        Metrics::RegionalDiagnostic(m) => territorial::diagnostic_text(m, thresholds),
        Metrics::RegionalComparison(m) => territorial::comparison_text(m, thresholds),
        Metrics::RegionalEvolution(m) => territorial::evolution_text(m),
    }
}
