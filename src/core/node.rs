//! Type definition for the node primitive of an orchestrated cluster.

use serde::{Deserialize, Serialize};

use crate::core::common::{ObjectMeta, RuntimeResources};

/// Nodes carrying this label with value "true" are never considered for
/// scale-down.
pub const SCALE_DOWN_DISABLED_LABEL: &str = "scale_down_disabled";

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeStatus {
    /// Total resources of the node.
    pub capacity: RuntimeResources,
    /// Resources available to workloads after system reservations.
    #[serde(default)]
    pub allocatable: RuntimeResources,
    /// Time when the node became available to the scheduler, in seconds.
    #[serde(default)]
    pub available_time: f64,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct Node {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatus,
}

impl Node {
    pub fn new(name: String, cpu: u32, ram: u64) -> Self {
        let mut node = Node::default();
        node.metadata.name = name;
        node.status.capacity = RuntimeResources::new(cpu, ram);
        node.status.allocatable = node.status.capacity.clone();
        node
    }

    pub fn scale_down_disabled(&self) -> bool {
        self.metadata
            .labels
            .get(SCALE_DOWN_DISABLED_LABEL)
            .map(|value| value == "true")
            .unwrap_or(false)
    }
}
