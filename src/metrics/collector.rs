//! In-process storage for engine metrics. The reconciler reports counters
//! and per-phase timings here; the embedder decides how to expose them.

use std::collections::BTreeMap;

use average::{concatenate, Estimate, Max, Mean, Min, Variance};

concatenate!(
    Estimator,
    [Min, min],
    [Max, max],
    [Mean, mean],
    [Variance, population_variance]
);

#[derive(Default)]
pub struct EstimatorWrapper {
    estimator: Estimator,
}

impl std::fmt::Debug for EstimatorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Estimator")
            .field("min", &self.min())
            .field("max", &self.max())
            .field("mean", &self.mean())
            .field("population_variance", &self.population_variance())
            .finish()
    }
}

impl EstimatorWrapper {
    pub fn new() -> Self {
        Self {
            estimator: Estimator::new(),
        }
    }

    pub fn add(&mut self, value: f64) {
        self.estimator.add(value);
    }

    pub fn min(&self) -> f64 {
        self.estimator.min()
    }

    pub fn max(&self) -> f64 {
        self.estimator.max()
    }

    pub fn mean(&self) -> f64 {
        self.estimator.mean()
    }

    pub fn population_variance(&self) -> f64 {
        self.estimator.population_variance()
    }
}

impl PartialEq for EstimatorWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.min() == other.min()
            && self.max() == other.max()
            && self.mean() == other.mean()
            && self.population_variance() == other.population_variance()
    }
}

#[derive(Debug, Default)]
pub struct AccumulatedMetrics {
    /// Number of ticks that ran to completion.
    pub total_ticks: u64,
    /// Number of ticks aborted on listing failures or malformed state.
    pub total_aborted_ticks: u64,
    /// Total number of nodes added through scale up.
    pub total_scaled_up_nodes: u64,
    /// Total number of nodes removed through scale down.
    pub total_scaled_down_nodes: u64,
    /// Scale down attempts that removed nothing or failed.
    pub total_failed_scale_down_trials: u64,
    /// Pods dropped from the unsatisfied set by the schedulability re-check.
    pub total_pods_filtered_as_schedulable: u64,
    /// Stale unschedulable markers cleared.
    pub total_pod_conditions_reset: u64,
}

/// Counters plus per-phase start times and duration statistics, keyed by the
/// loop phase labels ("main", "scale_up", "find_unneeded", "scale_down").
pub struct MetricsCollector {
    pub accumulated: AccumulatedMetrics,
    phase_durations: BTreeMap<&'static str, EstimatorWrapper>,
    last_phase_start: BTreeMap<&'static str, f64>,
    last_phase_duration: BTreeMap<&'static str, f64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            accumulated: Default::default(),
            phase_durations: Default::default(),
            last_phase_start: Default::default(),
            last_phase_duration: Default::default(),
        }
    }

    pub fn phase_started(&mut self, phase: &'static str, now: f64) {
        self.last_phase_start.insert(phase, now);
    }

    pub fn observe_phase_duration(&mut self, phase: &'static str, duration: f64) {
        self.phase_durations
            .entry(phase)
            .or_insert_with(EstimatorWrapper::new)
            .add(duration);
        self.last_phase_duration.insert(phase, duration);
    }

    pub fn last_phase_start(&self, phase: &str) -> Option<f64> {
        self.last_phase_start.get(phase).copied()
    }

    pub fn last_phase_duration(&self, phase: &str) -> Option<f64> {
        self.last_phase_duration.get(phase).copied()
    }

    pub fn phase_duration_stats(&self, phase: &str) -> Option<&EstimatorWrapper> {
        self.phase_durations.get(phase)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
