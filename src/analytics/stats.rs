//! Descriptive statistics over plain slices.
//!
//! Variance and standard deviation use the sample (n − 1) denominator and
//! return 0.0 for fewer than two values.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    ss / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Consecutive differences `values[i] - values[i-1]`, each divided by `scale`.
pub fn scaled_differences(values: &[f64], scale: f64) -> Vec<f64> {
    values.windows(2).map(|w| (w[1] - w[0]) / scale).collect()
}
