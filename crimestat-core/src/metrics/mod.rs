//! Metric engine for crimestat
//!
//! Pure computations over typed observations:
//! - Linear trend fit and projection with a confidence band
//! - Moving-window z-score alerts
//! - Composite insurance score and quintile binning
//! - Comparison against the national baseline
//! - Seasonal/quarterly profiles of monthly counts
//! - Correlation between category series
//! - Growth summaries, regional comparisons and route scoring
//!
//! ## Thresholds
//!
//! Every classification reads its cut-offs from a [`Thresholds`] value. The
//! recommendation text is generated from the same value, so a threshold
//! changed in the config moves both the labels and the wording.
//!
//! Divisions go through [`stats::safe_div`]; a near-zero denominator yields
//! `None` (or the documented neutral value) instead of an infinite result.

pub mod alert;
pub mod baseline;
pub mod correlation;
pub mod growth;
pub mod regional;
pub mod risk;
pub mod seasonal;
pub mod stats;
pub mod thresholds;
pub mod transport;
pub mod trend;

pub use alert::{evaluate_alerts, moving_stats, z_score, AlertLevel, AlertRow, CategorySeries};
pub use baseline::{
    baseline_score, evaluate_business, evaluate_real_estate, national_rate, BaselineInput,
    BaselineRisk, BusinessRisk, BusinessRow, RealEstateRow,
};
pub use correlation::{pearson, CorrelationMatrix};
pub use growth::{summarize_growth, GrowthSummary, GrowthTrend};
pub use regional::{
    compare_regions, regional_diagnostic, regional_evolution, DiagnosticRow, EvolutionRow,
    EvolutionTrend, RegionStats, RegionalComparison, RelativeLevel,
};
pub use risk::{
    composite_score, quintiles, relative_index, risk_tier, score_insurance, InsuranceRow, RISK_TIERS,
};
pub use seasonal::{seasonal_profile, Grouping, MonthlyPoint, SeasonalBucket};
pub use thresholds::Thresholds;
pub use transport::{evaluate_route, Tendency, TransportRisk, TransportRow};
pub use trend::{fit_trend, project_series, PointKind, ProjectionRow, Reliability, TrendFit};
