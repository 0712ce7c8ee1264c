//! Text for the neighbourhood, real-estate, business, insurance and
//! transport services.

use crate::format::{per_mille, signed, signed_pct};
use crate::metrics::stats::mean;
use crate::metrics::transport::average_score;
use crate::metrics::{
    risk_tier, AlertLevel, AlertRow, BaselineRisk, BusinessRisk, BusinessRow, InsuranceRow,
    RealEstateRow, Thresholds, TransportRow, RISK_TIERS,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct AlertMetrics {
    pub department: String,
    pub year: i32,
    pub rows: Vec<AlertRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealEstateMetrics {
    pub department: String,
    pub year: i32,
    pub rows: Vec<RealEstateRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusinessMetrics {
    pub department: String,
    pub year: i32,
    pub rows: Vec<BusinessRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsuranceMetrics {
    pub department: String,
    pub year: i32,
    pub rows: Vec<InsuranceRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportMetrics {
    pub origin: String,
    pub destination: String,
    pub rows: Vec<TransportRow>,
}

fn advice(lines: &mut Vec<String>, items: &[&str]) {
    lines.extend(items.iter().map(|s| format!("  • {s}")));
}

pub(super) fn alert_text(m: &AlertMetrics, t: &Thresholds) -> String {
    let mut lines = vec![format!(
        "Neighbourhood alert system - Department {} ({}):",
        m.department, m.year
    )];

    let active: Vec<&AlertRow> = m
        .rows
        .iter()
        .filter(|r| matches!(r.level, AlertLevel::RedAlert | AlertLevel::OrangeAlert))
        .collect();
    if active.is_empty() {
        lines.push("No major alert active".to_string());
        lines.push("• Keep normal vigilance".to_string());
        lines.push("• Continue good security practices".to_string());
    } else {
        lines.push(String::new());
        lines.push("Critical attention points:".to_string());
        for row in active {
            lines.push(format!(
                "- {}: {} (intensity: {:.1}σ, rate: {})",
                row.category,
                row.level.as_str(),
                row.z_score,
                per_mille(row.value)
            ));
            if row.level == AlertLevel::RedAlert {
                advice(
                    &mut lines,
                    &[
                        "Avoid isolated areas",
                        "Reinforce collective vigilance",
                        "Report any suspicious activity",
                        "Keep regular contact with the police",
                    ],
                );
            } else {
                advice(
                    &mut lines,
                    &[
                        "Increased vigilance recommended",
                        "Coordinate with neighbours",
                        "Check security devices",
                    ],
                );
            }
        }
    }

    let trends: Vec<&AlertRow> = m
        .rows
        .iter()
        .filter(|r| r.evolution_pct.is_some_and(|e| e.abs() > t.alert_trend_pct))
        .collect();
    if !trends.is_empty() {
        lines.push(String::new());
        lines.push("Significant trends to watch:".to_string());
        for row in trends {
            let evolution = row.evolution_pct.unwrap_or(0.0);
            lines.push(format!(
                "- {}: {}% change (current rate: {}, previous: {})",
                row.category,
                signed(evolution),
                per_mille(row.value),
                per_mille(row.previous_value.unwrap_or(0.0))
            ));
            if evolution > t.alert_trend_strong_pct {
                advice(&mut lines, &["Particular vigilance recommended for this type of incident"]);
            } else if evolution > t.alert_trend_pct {
                advice(&mut lines, &["Situation to monitor in the coming months"]);
            }
        }
    }

    lines.join("\n")
}

pub(super) fn real_estate_text(m: &RealEstateMetrics, t: &Thresholds) -> String {
    let scores: Vec<f64> = m.rows.iter().map(|r| r.score).collect();
    let mean_score = mean(&scores).unwrap_or(0.0);
    let level = BaselineRisk::classify(mean_score, t);

    let mut lines = vec![
        format!("Real-estate security analysis - Department {} ({}):", m.department, m.year),
        String::new(),
        format!("Overall risk level: {}", level.as_str()),
        format!("Security score: {:.1} (0 = national average)", mean_score),
        String::new(),
        "Detailed analysis:".to_string(),
    ];
    for row in &m.rows {
        lines.push(format!(
            "- {}: {} vs national average ({} incidents)",
            row.category,
            signed(row.score),
            row.incident_count
        ));
    }

    lines.push(String::new());
    lines.push("Recommendations:".to_string());
    match level {
        BaselineRisk::High => {
            lines.push("Area requiring reinforced security measures:".to_string());
            advice(
                &mut lines,
                &[
                    "Advanced security systems recommended",
                    "Coordination with neighbours and the police advised",
                    "Detailed security audit before purchase",
                    "Consider reinforced insurance cover",
                ],
            );
        }
        BaselineRisk::Moderate => {
            lines.push("Vigilance recommended:".to_string());
            advice(
                &mut lines,
                &[
                    "Standard security measures advised",
                    "Join neighbourhood watch initiatives",
                    "Check security equipment regularly",
                ],
            );
        }
        BaselineRisk::Low => {
            lines.push("Secure area:".to_string());
            advice(
                &mut lines,
                &[
                    "Keep basic security measures",
                    "Collaborative neighbourhood watch",
                    "Insurance discounts possible",
                ],
            );
        }
    }

    let notable: Vec<&RealEstateRow> = m
        .rows
        .iter()
        .filter(|r| r.score.abs() > t.real_estate_attention)
        .collect();
    if !notable.is_empty() {
        lines.push(String::new());
        lines.push("Particular attention points:".to_string());
        for row in notable {
            lines.push(format!(
                "• {}: {} relative to the national average",
                row.category,
                signed(row.score)
            ));
        }
    }

    lines.join("\n")
}

pub(super) fn business_text(m: &BusinessMetrics, t: &Thresholds) -> String {
    let mut lines = vec![format!(
        "Business security analysis - Department {} ({}):",
        m.department, m.year
    )];

    let mut groups: BTreeMap<BusinessRisk, Vec<&BusinessRow>> = BTreeMap::new();
    for row in &m.rows {
        groups.entry(row.risk).or_default().push(row);
    }
    for (risk, rows) in groups {
        lines.push(String::new());
        lines.push(format!("{} risk:", risk.as_str()));
        for row in rows {
            lines.push(format!(
                "- {}: {:.2} incidents per 10,000 inhabitants",
                row.category, row.risk_per_10k
            ));
            match risk {
                BusinessRisk::Critical => advice(
                    &mut lines,
                    &[
                        "Advanced security system recommended",
                        "Coordination with police services advised",
                        "Train staff for risk situations",
                    ],
                ),
                BusinessRisk::High => advice(
                    &mut lines,
                    &[
                        "Reinforce surveillance during risk hours",
                        "Set up standard security procedures",
                    ],
                ),
                BusinessRisk::Moderate => {}
            }
        }
    }

    let trends: Vec<&BusinessRow> = m
        .rows
        .iter()
        .filter(|r| r.evolution_pct.is_some_and(|e| e.abs() > t.business_trend_pct))
        .collect();
    if !trends.is_empty() {
        lines.push(String::new());
        lines.push("Significant trends:".to_string());
        for row in trends {
            lines.push(format!(
                "- {}: {} over the period {}-{}",
                row.category,
                signed_pct(row.evolution_pct),
                row.first_year,
                row.year
            ));
        }
    }

    lines.join("\n")
}

/// Label of bin `quintile` out of `bins`.
pub(crate) fn quintile_label(quintile: usize, bins: usize) -> &'static str {
    tier_label(risk_tier(quintile, bins))
}

fn tier_label(tier: usize) -> &'static str {
    match tier {
        5 => "very high",
        4 => "high",
        3 => "medium",
        2 => "low",
        _ => "very low",
    }
}

pub(super) fn insurance_text(m: &InsuranceMetrics, t: &Thresholds) -> String {
    let mut lines = vec![format!(
        "Insurance analysis and recommendations - Department {} ({}):",
        m.department, m.year
    )];

    for tier in (1..=RISK_TIERS).rev() {
        let mut rows: Vec<&InsuranceRow> = m
            .rows
            .iter()
            .filter(|r| risk_tier(r.quintile, t.quintile_bins) == tier)
            .collect();
        if rows.is_empty() {
            continue;
        }
        rows.sort_by(|a, b| b.quintile.cmp(&a.quintile).then_with(|| a.category.cmp(&b.category)));
        lines.push(String::new());
        lines.push(format!("Risk level {}:", tier_label(tier)));
        for row in rows {
            lines.push(format!(
                "- {}: relative index {:.1}%",
                row.category, row.relative_index
            ));
            if tier >= 4 {
                advice(
                    &mut lines,
                    &[
                        "Premium increase recommended",
                        "Security audit advised",
                        "Strengthen prevention clauses",
                    ],
                );
            } else if tier == 3 {
                advice(
                    &mut lines,
                    &[
                        "Standard premiums with discount options",
                        "Basic prevention measures advised",
                    ],
                );
            } else {
                advice(
                    &mut lines,
                    &["Eligible for premium reductions", "Packaged offers possible"],
                );
            }
        }
    }

    lines.join("\n")
}

pub(super) fn transport_text(m: &TransportMetrics, t: &Thresholds) -> String {
    let mut lines = vec![format!(
        "Route security analysis: {} → {}",
        m.origin, m.destination
    )];

    for department in [&m.origin, &m.destination] {
        let Some(score) = average_score(&m.rows, department) else {
            continue;
        };
        lines.push(String::new());
        lines.push(format!("Department {department} (security score: {score:.0}/100):"));
        for row in m
            .rows
            .iter()
            .filter(|r| &r.department == department && (r.risk.is_high() || r.tendency.is_rising()))
        {
            lines.push(format!(
                "- {}: {:.1} incidents/100k inhabitants ({}, {} risk)",
                row.category,
                row.rate_100k,
                row.tendency.as_str(),
                row.risk.as_str()
            ));
        }
    }

    let mut gaps = Vec::new();
    for from in m.rows.iter().filter(|r| r.department == m.origin) {
        let Some(to) = m
            .rows
            .iter()
            .find(|r| r.department == m.destination && r.category == from.category)
        else {
            continue;
        };
        let gap = (from.rate_100k - to.rate_100k).abs();
        if gap > t.transport_gap_per_100k {
            let higher = if to.rate_100k > from.rate_100k {
                &m.destination
            } else {
                &m.origin
            };
            gaps.push(format!(
                "- {}: {:.1} more incidents/100k inhabitants in department {}",
                from.category, gap, higher
            ));
        }
    }
    lines.push(String::new());
    lines.push("Comparative analysis:".to_string());
    if gaps.is_empty() {
        lines.push("- No significant difference between the two departments".to_string());
    } else {
        lines.extend(gaps);
    }

    let major: Vec<&TransportRow> = m
        .rows
        .iter()
        .filter(|r| r.risk.is_high() && r.tendency.is_rising())
        .collect();
    if !major.is_empty() {
        lines.push(String::new());
        lines.push("Major vigilance points:".to_string());
        for row in major {
            lines.push(format!(
                "- Department {}: {} ({:.1} incidents/100k inhabitants)",
                row.department, row.category, row.rate_100k
            ));
        }
    }

    lines.join("\n")
}
