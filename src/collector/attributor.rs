use std::collections::HashMap;

/// Column-wise sum over pod rows: `sum_usage[j] = Σ_i values[i][j]`.
///
/// `values` and `metric_names` must have the same number of columns — a
/// mismatched row is simply ignored, callers are expected to have built
/// `values` from `PodEnergy::to_estimator_vector(metric_names)`.
pub fn sum_usage(metric_names: &[&str], values: &[Vec<f64>]) -> HashMap<String, u64> {
    let mut sums: HashMap<String, u64> = metric_names.iter().map(|m| (m.to_string(), 0u64)).collect();

    for row in values {
        for (name, value) in metric_names.iter().zip(row.iter()) {
            *sums.get_mut(*name).expect("metric_names/values column mismatch") += value.max(0.0) as u64;
        }
    }

    sums
}

/// Partitions each node-level total proportionally across pods, weighting
/// each pod by its share of the total usage summed over all tracked
/// metrics. When a total is 0, or every pod's usage is 0, the total is
/// distributed evenly instead.
///
/// This is the one concrete model implementation shipped with the core —
/// simple, pure, and conserves the total exactly (the regression/dynamic
/// models remain true external collaborators, see [`DynamicModel`]).
pub fn power_from_usage_ratio(
    values: &[Vec<f64>],
    total_core: u64,
    total_dram: u64,
    total_uncore: u64,
    total_pkg: u64,
    sum_usage: &HashMap<String, u64>,
) -> (Vec<u64>, Vec<u64>, Vec<u64>, Vec<u64>) {
    let pod_count = values.len();
    if pod_count == 0 {
        return (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    }

    let total_usage: f64 = sum_usage.values().sum::<u64>() as f64;
    let row_sums: Vec<f64> = values.iter().map(|row| row.iter().sum()).collect();

    let weights: Vec<f64> = if total_usage > 0.0 {
        row_sums.iter().map(|s| s / total_usage).collect()
    } else {
        vec![1.0 / pod_count as f64; pod_count]
    };

    let split = |total: u64| -> Vec<u64> { split_proportionally(total, &weights) };

    (split(total_core), split(total_dram), split(total_uncore), split(total_pkg))
}

/// Splits `total` proportionally to `weights` (which need not sum to
/// exactly 1.0), rounding each share down and handing the remainder to the
/// last pod so the split still sums to `total` exactly.
fn split_proportionally(total: u64, weights: &[f64]) -> Vec<u64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let mut shares: Vec<u64> = weights.iter().map(|w| (*w * total as f64).floor() as u64).collect();
    let distributed: u64 = shares.iter().sum();
    if let Some(last) = shares.last_mut() {
        *last += total.saturating_sub(distributed);
    }
    shares
}

/// External, pluggable dynamic (regression-based) power estimator. The core
/// ships no concrete implementation of this — a real one is a trained
/// model external to the sampling/attribution engine — only the
/// "unavailable" behavior the sampler must tolerate.
pub trait DynamicModel: Send + Sync {
    /// Returns one power value per pod, or an empty vec if the model is
    /// unavailable or the inputs have the wrong shape.
    fn dynamic_power(
        &self,
        metric_names: &[&str],
        values: &[Vec<f64>],
        core_delta: &[f64],
        dram_delta: &[f64],
        uncore_delta: &[f64],
        pkg_delta: &[f64],
        gpu_delta: &[f64],
    ) -> Vec<f64>;
}

/// A `DynamicModel` that is always unavailable. This is the default wiring
/// for `podwatt`: dyn energy is simply never written, and the ratio-based
/// attribution proceeds unaffected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDynamicModel;

impl DynamicModel for NoDynamicModel {
    fn dynamic_power(
        &self,
        _metric_names: &[&str],
        _values: &[Vec<f64>],
        _core_delta: &[f64],
        _dram_delta: &[f64],
        _uncore_delta: &[f64],
        _pkg_delta: &[f64],
        _gpu_delta: &[f64],
    ) -> Vec<f64> {
        Vec::new()
    }
}
