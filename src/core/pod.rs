//! Type definition for the pod primitive of an orchestrated cluster.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::common::{ObjectMeta, RuntimeResources};

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
pub struct Resources {
    #[serde(default)]
    pub limits: RuntimeResources,
    #[serde(default)]
    pub requests: RuntimeResources,
}

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
pub struct PodSpec {
    #[serde(default)]
    pub resources: Resources,
    /// Labels a hosting node must carry. Interpreted only by the predicate
    /// oracle, opaque to the planners.
    #[serde(default)]
    pub node_selector: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub enum PodConditionType {
    // Pod is accepted by the control plane and persisted.
    PodCreated,
    // Pod is assigned a node. Status "False" means the scheduler gave up on
    // placing it, which is the marker the autoscaler reacts to.
    PodScheduled,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PodCondition {
    // True, False or Unknown
    pub status: String,
    pub condition_type: PodConditionType,
    // Last time the condition transitioned from one status to another.
    pub last_transition_time: f64,
}

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
pub struct PodStatus {
    /// Name of the node the pod runs on, if any.
    #[serde(default)]
    pub assigned_node: Option<String>,
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
}

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    pub fn requested_resources(&self) -> &RuntimeResources {
        &self.spec.resources.requests
    }

    /// Time the scheduler marked this pod unschedulable, if it did.
    pub fn unschedulable_since(&self) -> Option<f64> {
        self.status
            .conditions
            .iter()
            .find(|condition| {
                condition.condition_type == PodConditionType::PodScheduled
                    && condition.status == "False"
            })
            .map(|condition| condition.last_transition_time)
    }
}
