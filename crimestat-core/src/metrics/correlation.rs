//! Pearson correlation between category time series.

use super::stats::{mean, safe_div};
use serde::Serialize;
use std::collections::BTreeMap;

/// Pearson coefficient of paired samples.
///
/// `None` when there are fewer than `min_points` pairs or either side has
/// no variance.
pub fn pearson(x: &[f64], y: &[f64], min_points: usize) -> Option<f64> {
    if x.len() != y.len() || x.len() < min_points.max(2) {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    safe_div(cov, (vx * vy).sqrt()).map(|r| r.clamp(-1.0, 1.0))
}

/// Symmetric correlation matrix over category series.
///
/// Each pair is correlated over the years both categories report. The
/// diagonal is left undefined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub categories: Vec<String>,
    /// `values[i][j]`, `None` on the diagonal and for undersized pairs
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    /// Build from `(category, [(year, value)])` series.
    pub fn build(series: &[(String, Vec<(i32, f64)>)], min_points: usize) -> Self {
        let mut sorted: Vec<(&String, BTreeMap<i32, f64>)> = series
            .iter()
            .map(|(name, points)| (name, points.iter().copied().collect()))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let n = sorted.len();
        let mut values = vec![vec![None; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let (xs, ys): (Vec<f64>, Vec<f64>) = sorted[i]
                    .1
                    .iter()
                    .filter_map(|(year, a)| sorted[j].1.get(year).map(|b| (*a, *b)))
                    .unzip();
                let r = pearson(&xs, &ys, min_points);
                values[i][j] = r;
                values[j][i] = r;
            }
        }

        Self {
            categories: sorted.into_iter().map(|(name, _)| name.clone()).collect(),
            values,
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        self.values[i][j]
    }

    /// Partner with the largest |r|; ties go to the first name alphabetically.
    pub fn strongest_partner(&self, category: &str) -> Option<(&str, f64)> {
        let i = self.index_of(category)?;
        let mut best: Option<(&str, f64)> = None;
        for (j, value) in self.values[i].iter().enumerate() {
            if let Some(r) = value {
                if best.map_or(true, |(_, b)| r.abs() > b.abs()) {
                    best = Some((self.categories[j].as_str(), *r));
                }
            }
        }
        best
    }

    /// Distinct pairs with |r| above `threshold`, strongest first.
    pub fn strong_pairs(&self, threshold: f64) -> Vec<(&str, &str, f64)> {
        let mut pairs = Vec::new();
        for i in 0..self.categories.len() {
            for j in (i + 1)..self.categories.len() {
                if let Some(r) = self.values[i][j] {
                    if r.abs() > threshold {
                        pairs.push((self.categories[i].as_str(), self.categories[j].as_str(), r));
                    }
                }
            }
        }
        pairs.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
        pairs
    }

    fn index_of(&self, category: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == category)
    }
}
