//! Events the engine emits through the cluster event recorder, attached to
//! pods or nodes.

use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub enum AutoscalerEvent {
    /// A node group expansion was requested to make room for the pod.
    TriggeredScaleUp {
        pod_name: String,
        group: String,
        delta: u64,
    },
    /// No expansion can help the pod this scan.
    NotTriggerScaleUp { pod_name: String, reason: String },
    /// The node was drained and its removal was requested.
    ScaleDown { node_name: String },
    /// Removal of the node was attempted and failed.
    ScaleDownFailed { node_name: String, reason: String },
}
