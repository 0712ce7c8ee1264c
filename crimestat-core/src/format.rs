//! Formatting helpers shared by the recommendation text and the CLI.

use chrono::{DateTime, Utc};

/// One decimal with an explicit sign (`+12.5`, `-3.0`).
pub fn signed(value: f64) -> String {
    format!("{value:+.1}")
}

/// Signed percentage, or `n/a` when undefined.
pub fn signed_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:+.1}%"),
        None => "n/a".to_string(),
    }
}

/// Rate per thousand inhabitants with one decimal.
pub fn per_mille(value: f64) -> String {
    format!("{value:.1}‰")
}

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    format_relative_time_at(ts, Utc::now())
}

fn format_relative_time_at(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}
