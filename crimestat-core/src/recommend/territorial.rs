//! Text for the regional diagnostic, comparison and evolution services.

use crate::format::{per_mille, signed_pct};
use crate::metrics::{DiagnosticRow, EvolutionRow, RegionalComparison, RelativeLevel, Thresholds};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticMetrics {
    pub region: String,
    /// Departments registered for the region, whether or not they reported
    pub departments: usize,
    pub rows: Vec<DiagnosticRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionMetrics {
    pub region: String,
    pub rows: Vec<EvolutionRow>,
}

pub(super) fn diagnostic_text(m: &DiagnosticMetrics, t: &Thresholds) -> String {
    let reporting = m
        .rows
        .iter()
        .map(|r| r.department.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let departments = m.departments.max(reporting);
    let mut lines = vec![
        format!("Regional analysis - Region {}:", m.region),
        String::new(),
        format!("Departments in the region: {departments}"),
    ];

    if departments == 1 {
        let department = m.rows.first().map(|r| r.department.as_str()).unwrap_or_default();
        lines.push(String::new());
        lines.push("This region has only one department.".to_string());
        lines.push("No intra-regional comparison is possible.".to_string());
        lines.push(String::new());
        lines.push(format!("Figures for department {department}:"));
        for row in &m.rows {
            lines.push(format!("- {}: {}", row.category, per_mille(row.rate)));
        }
        return lines.join("\n");
    }

    let deviations: Vec<&DiagnosticRow> = m
        .rows
        .iter()
        .filter(|r| r.deviation_pct.is_some_and(|d| d.abs() > t.significant_deviation_pct))
        .collect();
    if !deviations.is_empty() {
        lines.push(String::new());
        lines.push("Departments with significant deviations:".to_string());
        for row in deviations {
            lines.push(format!(
                "- {} ({}): {} vs regional mean",
                row.department,
                row.category,
                signed_pct(row.deviation_pct)
            ));
        }
    }

    for level in [RelativeLevel::VeryHigh, RelativeLevel::VeryLow] {
        let rows: Vec<&DiagnosticRow> = m.rows.iter().filter(|r| r.level == level).collect();
        if rows.is_empty() {
            continue;
        }
        lines.push(String::new());
        lines.push(format!("Departments at {} level:", level.as_str()));
        for row in rows {
            lines.push(format!(
                "- {} ({}): {}",
                row.department,
                row.category,
                per_mille(row.rate)
            ));
        }
    }

    lines.join("\n")
}

pub(super) fn comparison_text(m: &RegionalComparison, t: &Thresholds) -> String {
    let mut lines = vec![
        format!("Comparative analysis: Region {} vs Region {}", m.reference, m.compared),
        String::new(),
        "Number of departments:".to_string(),
        format!("- Region {}: {}", m.reference, m.departments_in(&m.reference)),
        format!("- Region {}: {}", m.compared, m.departments_in(&m.compared)),
    ];

    let significant: Vec<_> = m
        .gaps
        .iter()
        .filter(|g| g.gap_pct.is_some_and(|p| p.abs() > t.significant_deviation_pct))
        .collect();
    if !significant.is_empty() {
        lines.push(String::new());
        lines.push("Significant differences:".to_string());
        for gap in significant {
            lines.push(format!(
                "- {}: {} (rate: {} vs {})",
                gap.category,
                signed_pct(gap.gap_pct),
                per_mille(gap.reference_mean),
                per_mille(gap.compared_mean)
            ));
        }
    }

    lines.join("\n")
}

pub(super) fn evolution_text(m: &EvolutionMetrics) -> String {
    let mut lines = vec![format!("Regional evolution - Region {}:", m.region)];

    let strong: Vec<&EvolutionRow> = m.rows.iter().filter(|r| r.trend.is_strong()).collect();
    lines.push(String::new());
    if strong.is_empty() {
        lines.push("No significant change over the period.".to_string());
    } else {
        lines.push("Significant changes:".to_string());
        for row in strong {
            lines.push(format!(
                "- {} ({}): {} ({})",
                row.category,
                row.year,
                row.trend.as_str(),
                signed_pct(Some(row.evolution_pct))
            ));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::regional_diagnostic;
    use crate::types::Observation;

    fn obs(dept: &str, category: &str, rate: f64) -> Observation {
        Observation {
            department: dept.to_string(),
            region_code: "94".to_string(),
            category: category.to_string(),
            year: 2022,
            incident_count: 10,
            rate_per_mille: Some(rate),
            population: 10_000,
            housing_units: 5_000,
        }
    }

    #[test]
    fn test_single_department_short_circuit() {
        let t = Thresholds::default();
        let rows = regional_diagnostic(&[obs("2A", "Vols", 1.2), obs("2A", "Cambriolages", 0.4)], &t);
        let text = diagnostic_text(
            &DiagnosticMetrics {
                region: "94".to_string(),
                departments: 1,
                rows,
            },
            &t,
        );
        assert!(text.contains("Region 94"));
        assert!(text.contains("This region has only one department."));
        assert!(text.contains("- Vols: 1.2‰"));
        assert!(!text.contains("significant deviations"));
    }

    #[test]
    fn test_diagnostic_lists_deviations() {
        let t = Thresholds::default();
        let rows = regional_diagnostic(&[obs("2A", "Vols", 3.5), obs("2B", "Vols", 0.5)], &t);
        let text = diagnostic_text(
            &DiagnosticMetrics {
                region: "94".to_string(),
                departments: 2,
                rows,
            },
            &t,
        );
        assert!(text.contains("Departments in the region: 2"));
        assert!(text.contains("- 2A (Vols): +75.0% vs regional mean"));
        assert!(text.contains("- 2B (Vols): -75.0% vs regional mean"));
        assert!(text.contains("Departments at very low level:"));
    }

    #[test]
    fn test_silent_department_still_counts_toward_region() {
        let t = Thresholds::default();
        let rows = regional_diagnostic(&[obs("2A", "Vols", 1.2)], &t);
        let text = diagnostic_text(
            &DiagnosticMetrics {
                region: "94".to_string(),
                departments: 2,
                rows,
            },
            &t,
        );
        assert!(text.contains("Departments in the region: 2"));
        assert!(!text.contains("only one department"));
    }
}
