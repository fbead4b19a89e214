//! Config fields definitions for the autoscaling engine.

use serde::Deserialize;

use crate::provider::NodeGroupBounds;

/// Values the engine reads each tick. Parsing beyond YAML deserialization is
/// left to the embedder.
/// All durations are in seconds with fractional part.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct AutoscalerConfig {
    /// How often the cluster is reevaluated for scale up or down.
    #[serde(default = "scan_interval_default")]
    pub scan_interval: f64,
    /// Should the engine scale down the cluster.
    #[serde(default = "scale_down_enabled_default")]
    pub scale_down_enabled: bool,
    /// Duration from the last scale up to the time when scale down options
    /// are checked again.
    #[serde(default = "scale_down_delay_default")]
    pub scale_down_delay: f64,
    /// How long a node should be unneeded before it is eligible for scale
    /// down.
    #[serde(default = "scale_down_unneeded_time_default")]
    pub scale_down_unneeded_time: f64,
    /// Fraction in interval [0, 1] to define the threshold of resource
    /// utilization below which a node can be considered for scale down.
    #[serde(default = "scale_down_utilization_threshold_default")]
    pub scale_down_utilization_threshold: f64,
    /// How long to back off after a scale down attempt that removed nothing.
    #[serde(default = "scale_down_trial_interval_default")]
    pub scale_down_trial_interval: f64,
    /// Whether pods marked unschedulable are re-tested against current
    /// capacity before they are allowed to trigger a scale up.
    #[serde(default = "verify_unschedulable_pods_default")]
    pub verify_unschedulable_pods: bool,
    /// Node group bounds handed to the provider adapter at startup.
    /// The engine itself reads group state from the provider.
    #[serde(default)]
    pub node_groups: Vec<NodeGroupBounds>,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            scan_interval: scan_interval_default(),
            scale_down_enabled: scale_down_enabled_default(),
            scale_down_delay: scale_down_delay_default(),
            scale_down_unneeded_time: scale_down_unneeded_time_default(),
            scale_down_utilization_threshold: scale_down_utilization_threshold_default(),
            scale_down_trial_interval: scale_down_trial_interval_default(),
            verify_unschedulable_pods: verify_unschedulable_pods_default(),
            node_groups: Default::default(),
        }
    }
}

impl AutoscalerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

fn scan_interval_default() -> f64 {
    10.0 // 10 seconds
}
fn scale_down_enabled_default() -> bool {
    true
}
fn scale_down_delay_default() -> f64 {
    600.0 // 10 minutes
}
fn scale_down_unneeded_time_default() -> f64 {
    600.0 // 10 minutes
}
fn scale_down_utilization_threshold_default() -> f64 {
    0.5
}
fn scale_down_trial_interval_default() -> f64 {
    60.0 // 1 minute
}
fn verify_unschedulable_pods_default() -> bool {
    true
}
