//! Small numeric helpers shared by the metric computations.

/// Denominators smaller than this are treated as zero.
pub const DIVISION_FLOOR: f64 = 1e-12;

/// `num / den`, or `None` when the denominator is (near) zero or the result
/// is not finite.
pub fn safe_div(num: f64, den: f64) -> Option<f64> {
    if den.abs() < DIVISION_FLOOR {
        return None;
    }
    let value = num / den;
    value.is_finite().then_some(value)
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation (divides by n).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Sample standard deviation (divides by n - 1); needs two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Relative change from `previous` to `current`, in percent.
pub fn pct_change(current: f64, previous: f64) -> Option<f64> {
    safe_div(current - previous, previous).map(|r| r * 100.0)
}

/// Round to two decimals for presentation.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to `digits` decimals.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
