//! Descriptive statistics over a grade sample.
//!
//! Every function returns `0.0` for samples too small to define the
//! statistic. Results are full precision; rounding belongs to the caller.

use std::collections::BTreeMap;

use crate::models::StatSummary;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Most frequent value after rounding to the nearest integer (ties to even).
/// Equal counts resolve to the smallest value.
pub fn mode(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value.round_ties_even() as i64).or_insert(0) += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for (value, count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(value, _)| value as f64).unwrap_or(0.0)
}

/// Sample variance (divisor `n - 1`).
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    sum_sq / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

pub fn summarize(values: &[f64]) -> StatSummary {
    StatSummary {
        mean: mean(values),
        median: median(values),
        mode: mode(values),
        std_dev: std_dev(values),
        variance: variance(values),
        min: min(values),
        max: max(values),
    }
}

/// Rounds to `places` decimals, halves to even.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}

impl StatSummary {
    pub fn rounded(&self, places: i32) -> StatSummary {
        StatSummary {
            mean: round_to(self.mean, places),
            median: round_to(self.median, places),
            mode: round_to(self.mode, places),
            std_dev: round_to(self.std_dev, places),
            variance: round_to(self.variance, places),
            min: round_to(self.min, places),
            max: round_to(self.max, places),
        }
    }
}
