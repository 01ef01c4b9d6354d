//! Small numeric helpers shared by inference, simulation and validation.

use std::cmp::Ordering;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Linear-interpolated percentile, `p` in `[0, 100]`.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let v = sorted(values);
    percentile_sorted(&v, p)
}

/// Same as [`percentile`] for input that is already sorted ascending.
pub fn percentile_sorted(v: &[f64], p: f64) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    let pos = (v.len() as f64 - 1.0) * (p / 100.0).clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(v[lo] + (v[hi] - v[lo]) * frac)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance.
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// Quantile edges splitting `values` into `n` equal-mass buckets, with
/// duplicate edges dropped. Returns an empty vec when fewer than two distinct
/// edges remain.
pub fn quantile_edges(values: &[f64], n: usize) -> Vec<f64> {
    let v = sorted(values);
    if v.is_empty() || n == 0 {
        return Vec::new();
    }
    let mut edges: Vec<f64> = Vec::with_capacity(n + 1);
    for k in 0..=n {
        let q = k as f64 * 100.0 / n as f64;
        if let Some(edge) = percentile_sorted(&v, q) {
            if edges.last().map_or(true, |last| (edge - last).abs() > 1e-12) {
                edges.push(edge);
            }
        }
    }
    if edges.len() < 2 {
        return Vec::new();
    }
    edges
}

/// Index of the bucket a value falls into given quantile `edges`: the first
/// bucket whose upper edge is at or above the value, else the last bucket.
pub fn bucket_index(edges: &[f64], value: f64) -> usize {
    if edges.len() < 2 {
        return 0;
    }
    let n_buckets = edges.len() - 1;
    (0..n_buckets)
        .find(|&i| value <= edges[i + 1])
        .unwrap_or(n_buckets - 1)
}

/// `num / max(den, eps)` for counts, clamped to `[0, 1]`.
pub fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        (num as f64 / den as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_linearly() {
        let v = [1000.0, 1000.0, 10000.0];
        assert_eq!(percentile(&v, 0.0), Some(1000.0));
        assert_eq!(median(&v), Some(1000.0));
        let p95 = percentile(&v, 95.0).unwrap();
        assert!((p95 - 9100.0).abs() < 1e-9, "p95={p95}");
        let p90 = percentile(&v, 90.0).unwrap();
        assert!((p90 - 8200.0).abs() < 1e-9, "p90={p90}");
    }

    #[test]
    fn empty_input_is_none() {
        assert!(median(&[]).is_none());
        assert!(variance(&[]).is_none());
        assert!(quantile_edges(&[], 4).is_empty());
    }

    #[test]
    fn population_std_of_constant_is_zero() {
        assert_eq!(std_dev(&[0.4, 0.4, 0.4]), Some(0.0));
        let s = std_dev(&[0.0, 1.0]).unwrap();
        assert!((s - 0.5).abs() < 1e-12);
    }

    #[test]
    fn quantile_edges_drop_duplicates() {
        let edges = quantile_edges(&[1.0, 1.0, 1.0, 1.0, 5.0], 4);
        assert_eq!(edges, vec![1.0, 5.0]);
        assert_eq!(bucket_index(&edges, 1.0), 0);
        assert_eq!(bucket_index(&edges, 9.0), 0);
        assert!(quantile_edges(&[2.0, 2.0], 3).is_empty());
    }

    #[test]
    fn bucket_index_assigns_by_upper_edge() {
        let edges = [0.0, 2.5, 5.0];
        assert_eq!(bucket_index(&edges, 0.0), 0);
        assert_eq!(bucket_index(&edges, 2.5), 0);
        assert_eq!(bucket_index(&edges, 3.0), 1);
        assert_eq!(bucket_index(&edges, 99.0), 1);
    }
}
