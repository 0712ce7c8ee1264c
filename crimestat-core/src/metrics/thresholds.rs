//! Classification thresholds shared by the metric engine and the
//! recommendation generator.
//!
//! The constants are the defaults; [`Thresholds`] carries the values actually
//! in force (overridable from the `[thresholds]` config section). Both the
//! computations in [`crate::metrics`] and the text in [`crate::recommend`]
//! read from the same `Thresholds` value.

use crate::error::{Error, Result};
use serde::Deserialize;

// Trend projection
pub const R2_RELIABLE: f64 = 0.7;
pub const R2_MODERATE: f64 = 0.5;
pub const CONFIDENCE_Z: f64 = 1.96;
pub const MIN_TREND_POINTS: usize = 2;
pub const PROJECTION_STRONG_PCT: f64 = 10.0;
pub const PROJECTION_STABLE_PCT: f64 = 5.0;

// Neighbourhood alerts
pub const ALERT_RED_Z: f64 = 2.0;
pub const ALERT_ORANGE_Z: f64 = 1.0;
pub const ALERT_WATCH_Z: f64 = 0.0;
pub const MOVING_WINDOW: usize = 3;
pub const ALERT_TREND_PCT: f64 = 15.0;
pub const ALERT_TREND_STRONG_PCT: f64 = 30.0;

// Insurance scoring
pub const RISK_HOUSING_WEIGHT: f64 = 0.6;
pub const RISK_POPULATION_WEIGHT: f64 = 0.4;
pub const QUINTILE_BINS: usize = 5;

// National baseline
pub const NATIONAL_EPSILON: f64 = 0.001;
pub const BASELINE_HIGH_RISK: f64 = -20.0;
pub const BASELINE_LOW_RISK: f64 = 20.0;
pub const REAL_ESTATE_ATTENTION: f64 = 30.0;
pub const BUSINESS_CRITICAL_RATIO: f64 = 1.5;
pub const BUSINESS_HIGH_RATIO: f64 = 1.2;
pub const BUSINESS_TREND_PCT: f64 = 10.0;

// Emerging risks
pub const GROWTH_STRONG: f64 = 0.10;
pub const GROWTH_MODERATE: f64 = 0.05;
pub const STRONG_CORRELATION: f64 = 0.7;
pub const MIN_CORRELATION_POINTS: usize = 3;
pub const PRIORITY_VARIATION_PCT: f64 = 20.0;

// Territorial analysis
pub const REGIONAL_VERY_HIGH: f64 = 1.5;
pub const REGIONAL_HIGH: f64 = 1.2;
pub const REGIONAL_LOW: f64 = 0.8;
pub const REGIONAL_VERY_LOW: f64 = 0.5;
pub const SIGNIFICANT_DEVIATION_PCT: f64 = 20.0;
pub const EVOLUTION_STRONG_PCT: f64 = 20.0;
pub const EVOLUTION_PCT: f64 = 10.0;

// Transport
pub const TRANSPORT_GAP_PER_100K: f64 = 10.0;
pub const TRANSPORT_STRONG_EVOLUTION_PCT: f64 = 20.0;
pub const TRANSPORT_STRONG_MA_PCT: f64 = 15.0;
pub const TRANSPORT_EVOLUTION_PCT: f64 = 10.0;
pub const TRANSPORT_STABLE_PCT: f64 = 5.0;
pub const TRANSPORT_STABLE_MA_PCT: f64 = 7.0;
pub const TRANSPORT_VERY_HIGH_RATE: f64 = 50.0;
pub const TRANSPORT_VERY_HIGH_RISING_RATE: f64 = 40.0;
pub const TRANSPORT_VERY_HIGH_EVOLUTION_PCT: f64 = 15.0;
pub const TRANSPORT_HIGH_RATE: f64 = 35.0;
pub const TRANSPORT_HIGH_RISING_RATE: f64 = 25.0;
pub const TRANSPORT_HIGH_EVOLUTION_PCT: f64 = 10.0;
pub const TRANSPORT_HIGH_RANK: usize = 2;
pub const TRANSPORT_MODERATE_RATE: f64 = 20.0;
pub const TRANSPORT_MODERATE_RISING_RATE: f64 = 15.0;
pub const TRANSPORT_MODERATE_EVOLUTION_PCT: f64 = 5.0;
pub const TRANSPORT_LOW_RATE: f64 = 10.0;
pub const TRANSPORT_RATE_WEIGHT: f64 = 0.8;
pub const TRANSPORT_EVOLUTION_WEIGHT: f64 = 0.4;
pub const TRANSPORT_MA_WEIGHT: f64 = 0.3;

/// Thresholds in force for one façade instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub r2_reliable: f64,
    pub r2_moderate: f64,
    pub confidence_z: f64,
    pub min_trend_points: usize,
    pub projection_strong_pct: f64,
    pub projection_stable_pct: f64,

    pub alert_red_z: f64,
    pub alert_orange_z: f64,
    pub alert_watch_z: f64,
    pub moving_window: usize,
    pub alert_trend_pct: f64,
    pub alert_trend_strong_pct: f64,

    pub risk_housing_weight: f64,
    pub risk_population_weight: f64,
    pub quintile_bins: usize,

    pub national_epsilon: f64,
    pub baseline_high_risk: f64,
    pub baseline_low_risk: f64,
    pub real_estate_attention: f64,
    pub business_critical_ratio: f64,
    pub business_high_ratio: f64,
    pub business_trend_pct: f64,

    pub growth_strong: f64,
    pub growth_moderate: f64,
    pub strong_correlation: f64,
    pub min_correlation_points: usize,
    pub priority_variation_pct: f64,

    pub regional_very_high: f64,
    pub regional_high: f64,
    pub regional_low: f64,
    pub regional_very_low: f64,
    pub significant_deviation_pct: f64,
    pub evolution_strong_pct: f64,
    pub evolution_pct: f64,

    pub transport_gap_per_100k: f64,
    /// Tendency bands, in percent against the previous year and the moving average
    pub transport_strong_evolution_pct: f64,
    pub transport_strong_ma_pct: f64,
    pub transport_evolution_pct: f64,
    pub transport_stable_pct: f64,
    pub transport_stable_ma_pct: f64,
    /// Risk tiers, rates per 100 000 inhabitants
    pub transport_very_high_rate: f64,
    pub transport_very_high_rising_rate: f64,
    pub transport_very_high_evolution_pct: f64,
    pub transport_high_rate: f64,
    pub transport_high_rising_rate: f64,
    pub transport_high_evolution_pct: f64,
    pub transport_high_rank: usize,
    pub transport_moderate_rate: f64,
    pub transport_moderate_rising_rate: f64,
    pub transport_moderate_evolution_pct: f64,
    pub transport_low_rate: f64,
    /// Security score penalty weights
    pub transport_rate_weight: f64,
    pub transport_evolution_weight: f64,
    pub transport_ma_weight: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            r2_reliable: R2_RELIABLE,
            r2_moderate: R2_MODERATE,
            confidence_z: CONFIDENCE_Z,
            min_trend_points: MIN_TREND_POINTS,
            projection_strong_pct: PROJECTION_STRONG_PCT,
            projection_stable_pct: PROJECTION_STABLE_PCT,
            alert_red_z: ALERT_RED_Z,
            alert_orange_z: ALERT_ORANGE_Z,
            alert_watch_z: ALERT_WATCH_Z,
            moving_window: MOVING_WINDOW,
            alert_trend_pct: ALERT_TREND_PCT,
            alert_trend_strong_pct: ALERT_TREND_STRONG_PCT,
            risk_housing_weight: RISK_HOUSING_WEIGHT,
            risk_population_weight: RISK_POPULATION_WEIGHT,
            quintile_bins: QUINTILE_BINS,
            national_epsilon: NATIONAL_EPSILON,
            baseline_high_risk: BASELINE_HIGH_RISK,
            baseline_low_risk: BASELINE_LOW_RISK,
            real_estate_attention: REAL_ESTATE_ATTENTION,
            business_critical_ratio: BUSINESS_CRITICAL_RATIO,
            business_high_ratio: BUSINESS_HIGH_RATIO,
            business_trend_pct: BUSINESS_TREND_PCT,
            growth_strong: GROWTH_STRONG,
            growth_moderate: GROWTH_MODERATE,
            strong_correlation: STRONG_CORRELATION,
            min_correlation_points: MIN_CORRELATION_POINTS,
            priority_variation_pct: PRIORITY_VARIATION_PCT,
            regional_very_high: REGIONAL_VERY_HIGH,
            regional_high: REGIONAL_HIGH,
            regional_low: REGIONAL_LOW,
            regional_very_low: REGIONAL_VERY_LOW,
            significant_deviation_pct: SIGNIFICANT_DEVIATION_PCT,
            evolution_strong_pct: EVOLUTION_STRONG_PCT,
            evolution_pct: EVOLUTION_PCT,
            transport_gap_per_100k: TRANSPORT_GAP_PER_100K,
            transport_strong_evolution_pct: TRANSPORT_STRONG_EVOLUTION_PCT,
            transport_strong_ma_pct: TRANSPORT_STRONG_MA_PCT,
            transport_evolution_pct: TRANSPORT_EVOLUTION_PCT,
            transport_stable_pct: TRANSPORT_STABLE_PCT,
            transport_stable_ma_pct: TRANSPORT_STABLE_MA_PCT,
            transport_very_high_rate: TRANSPORT_VERY_HIGH_RATE,
            transport_very_high_rising_rate: TRANSPORT_VERY_HIGH_RISING_RATE,
            transport_very_high_evolution_pct: TRANSPORT_VERY_HIGH_EVOLUTION_PCT,
            transport_high_rate: TRANSPORT_HIGH_RATE,
            transport_high_rising_rate: TRANSPORT_HIGH_RISING_RATE,
            transport_high_evolution_pct: TRANSPORT_HIGH_EVOLUTION_PCT,
            transport_high_rank: TRANSPORT_HIGH_RANK,
            transport_moderate_rate: TRANSPORT_MODERATE_RATE,
            transport_moderate_rising_rate: TRANSPORT_MODERATE_RISING_RATE,
            transport_moderate_evolution_pct: TRANSPORT_MODERATE_EVOLUTION_PCT,
            transport_low_rate: TRANSPORT_LOW_RATE,
            transport_rate_weight: TRANSPORT_RATE_WEIGHT,
            transport_evolution_weight: TRANSPORT_EVOLUTION_WEIGHT,
            transport_ma_weight: TRANSPORT_MA_WEIGHT,
        }
    }
}

impl Thresholds {
    /// Reject combinations that would make a classification band empty
    /// or a computation degenerate.
    pub fn validate(&self) -> Result<()> {
        fn fail(msg: &str) -> Result<()> {
            Err(Error::Config(format!("thresholds: {msg}")))
        }

        if !(0.0..=1.0).contains(&self.r2_moderate) || !(0.0..=1.0).contains(&self.r2_reliable) {
            return fail("R² bands must lie in [0, 1]");
        }
        if self.r2_reliable < self.r2_moderate {
            return fail("r2_reliable must be >= r2_moderate");
        }
        if self.alert_red_z < self.alert_orange_z || self.alert_orange_z < self.alert_watch_z {
            return fail("alert z-score tiers must be ordered red >= orange >= watch");
        }
        if self.min_trend_points < 2 {
            return fail("min_trend_points must be at least 2");
        }
        if self.moving_window == 0 {
            return fail("moving_window must be at least 1");
        }
        if self.quintile_bins == 0 {
            return fail("quintile_bins must be at least 1");
        }
        if self.national_epsilon <= 0.0 {
            return fail("national_epsilon must be positive");
        }
        if (self.risk_housing_weight + self.risk_population_weight - 1.0).abs() > 1e-9 {
            return fail("risk weights must sum to 1");
        }
        if self.baseline_high_risk >= self.baseline_low_risk {
            return fail("baseline_high_risk must be below baseline_low_risk");
        }
        if self.business_critical_ratio < self.business_high_ratio {
            return fail("business_critical_ratio must be >= business_high_ratio");
        }
        if self.growth_strong < self.growth_moderate {
            return fail("growth_strong must be >= growth_moderate");
        }
        if self.min_correlation_points < 2 {
            return fail("min_correlation_points must be at least 2");
        }
        if !(self.regional_very_high >= self.regional_high
            && self.regional_high >= 1.0
            && 1.0 >= self.regional_low
            && self.regional_low >= self.regional_very_low)
        {
            return fail("regional ratios must be ordered very_high >= high >= 1 >= low >= very_low");
        }
        if self.evolution_strong_pct < self.evolution_pct {
            return fail("evolution_strong_pct must be >= evolution_pct");
        }
        if !(self.transport_strong_evolution_pct >= self.transport_evolution_pct
            && self.transport_evolution_pct >= self.transport_stable_pct
            && self.transport_stable_pct >= 0.0)
        {
            return fail("transport tendency bands must be ordered strong >= evolution >= stable >= 0");
        }
        if self.transport_strong_ma_pct < self.transport_evolution_pct
            || self.transport_stable_ma_pct < 0.0
        {
            return fail("transport moving-average bands must be ordered strong >= evolution, stable >= 0");
        }
        if !(self.transport_very_high_rate >= self.transport_high_rate
            && self.transport_high_rate >= self.transport_moderate_rate
            && self.transport_moderate_rate >= self.transport_low_rate
            && self.transport_low_rate >= 0.0)
        {
            return fail("transport risk rates must be ordered very_high >= high >= moderate >= low >= 0");
        }
        if self.transport_high_rank == 0 {
            return fail("transport_high_rank must be at least 1");
        }
        if self.transport_rate_weight < 0.0
            || self.transport_evolution_weight < 0.0
            || self.transport_ma_weight < 0.0
        {
            return fail("transport score weights must not be negative");
        }
        Ok(())
    }
}
