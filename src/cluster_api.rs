//! Capability interfaces of the cluster control plane consumed by the engine.
//! Concrete bindings (API clients, caches, event sinks) live outside the
//! crate.

use thiserror::Error;

use crate::core::events::AutoscalerEvent;
use crate::core::node::Node;
use crate::core::pod::Pod;

#[derive(Debug, Error)]
pub enum ClusterApiError {
    #[error("listing failed: {0}")]
    Listing(String),
    #[error("update failed: {0}")]
    Update(String),
    #[error("eviction failed: {0}")]
    Eviction(String),
}

pub trait NodeLister {
    fn list(&self) -> Result<Vec<Node>, ClusterApiError>;
}

/// Pods with an assigned node.
pub trait ScheduledPodLister {
    fn list(&self) -> Result<Vec<Pod>, ClusterApiError>;
}

/// Pods the scheduler marked unschedulable.
pub trait UnschedulablePodLister {
    fn list(&self) -> Result<Vec<Pod>, ClusterApiError>;
}

pub trait PodConditionUpdater {
    /// Clears the unschedulable marker so the scheduler retries the pod.
    fn reset_unschedulable(&mut self, pod: &Pod) -> Result<(), ClusterApiError>;
}

pub trait PodEvictor {
    /// Evicts the pod from its node. Blocks until the control plane has
    /// acknowledged the eviction.
    fn evict(&mut self, pod: &Pod) -> Result<(), ClusterApiError>;
}

pub trait EventRecorder {
    fn record(&mut self, event: AutoscalerEvent);
}

/// Bundle of the cluster-side collaborators handed to the reconciler at
/// startup.
pub struct ClusterApi {
    pub node_lister: Box<dyn NodeLister>,
    pub scheduled_pod_lister: Box<dyn ScheduledPodLister>,
    pub unschedulable_pod_lister: Box<dyn UnschedulablePodLister>,
    pub condition_updater: Box<dyn PodConditionUpdater>,
    pub pod_evictor: Box<dyn PodEvictor>,
    pub event_recorder: Box<dyn EventRecorder>,
}
