//! Accuracy aggregation across episodes.

/// Fraction of predictions matching the labels.
pub fn accuracy(predictions: &[usize], labels: &[usize]) -> f64 {
    assert_eq!(predictions.len(), labels.len());
    if predictions.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(labels)
        .filter(|(p, l)| p == l)
        .count();
    correct as f64 / predictions.len() as f64
}

/// Mean and sample standard deviation (n - 1 denominator).
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Half-width of the normal-approximation 95% confidence interval of the
/// mean: `1.96 * std / sqrt(n)`.
pub fn confidence_interval95(std: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    1.96 * std / (n as f64).sqrt()
}
