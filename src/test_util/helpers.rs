//! Fake collaborators and object builders shared by the crate's tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::cluster_api::{
    ClusterApi, ClusterApiError, EventRecorder, NodeLister, PodConditionUpdater, PodEvictor,
    ScheduledPodLister, UnschedulablePodLister,
};
use crate::config::AutoscalerConfig;
use crate::core::events::AutoscalerEvent;
use crate::core::node::Node;
use crate::core::pod::{Pod, PodCondition, PodConditionType};
use crate::provider::{NodeGroup, NodeGroupBounds, NodeGroupProvider, ProviderError};
use crate::reconciler::Reconciler;
use crate::simulator::predicate::{DefaultPredicateChecker, PredicateChecker, PredicateError};

#[derive(Default)]
pub struct FakeClusterState {
    pub nodes: Vec<Node>,
    pub scheduled_pods: Vec<Pod>,
    pub unschedulable_pods: Vec<Pod>,
    /// Names of pods whose unschedulable condition was reset.
    pub reset_pods: Vec<String>,
    /// Names of pods evicted during drains.
    pub evicted_pods: Vec<String>,
    pub events: Vec<AutoscalerEvent>,
    pub fail_node_listing: bool,
    pub fail_pod_listing: bool,
    pub fail_evictions: bool,
}

/// In-memory cluster control plane. Cloning shares the same state, so a test
/// keeps one handle while the reconciler owns boxed trait views of another.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Rc<RefCell<FakeClusterState>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn api(&self) -> ClusterApi {
        ClusterApi {
            node_lister: Box::new(self.clone()),
            scheduled_pod_lister: Box::new(ScheduledPods(self.clone())),
            unschedulable_pod_lister: Box::new(UnschedulablePods(self.clone())),
            condition_updater: Box::new(self.clone()),
            pod_evictor: Box::new(self.clone()),
            event_recorder: Box::new(self.clone()),
        }
    }

    pub fn add_node(&self, node: Node) {
        self.state.borrow_mut().nodes.push(node);
    }

    pub fn add_scheduled_pod(&self, pod: Pod) {
        self.state.borrow_mut().scheduled_pods.push(pod);
    }

    pub fn add_unschedulable_pod(&self, pod: Pod) {
        self.state.borrow_mut().unschedulable_pods.push(pod);
    }

    pub fn remove_node(&self, node_name: &str) {
        self.state
            .borrow_mut()
            .nodes
            .retain(|node| node.metadata.name != node_name);
    }

    pub fn events(&self) -> Vec<AutoscalerEvent> {
        self.state.borrow().events.clone()
    }

    pub fn evicted_pods(&self) -> Vec<String> {
        self.state.borrow().evicted_pods.clone()
    }

    pub fn reset_pods(&self) -> Vec<String> {
        self.state.borrow().reset_pods.clone()
    }

    pub fn set_fail_node_listing(&self, fail: bool) {
        self.state.borrow_mut().fail_node_listing = fail;
    }

    pub fn set_fail_pod_listing(&self, fail: bool) {
        self.state.borrow_mut().fail_pod_listing = fail;
    }

    pub fn set_fail_evictions(&self, fail: bool) {
        self.state.borrow_mut().fail_evictions = fail;
    }
}

impl NodeLister for FakeCluster {
    fn list(&self) -> Result<Vec<Node>, ClusterApiError> {
        let state = self.state.borrow();
        if state.fail_node_listing {
            return Err(ClusterApiError::Listing("node lister is down".to_string()));
        }
        Ok(state.nodes.clone())
    }
}

pub struct ScheduledPods(FakeCluster);
impl ScheduledPodLister for ScheduledPods {
    fn list(&self) -> Result<Vec<Pod>, ClusterApiError> {
        let state = self.0.state.borrow();
        if state.fail_pod_listing {
            return Err(ClusterApiError::Listing("pod lister is down".to_string()));
        }
        Ok(state.scheduled_pods.clone())
    }
}

pub struct UnschedulablePods(FakeCluster);
impl UnschedulablePodLister for UnschedulablePods {
    fn list(&self) -> Result<Vec<Pod>, ClusterApiError> {
        let state = self.0.state.borrow();
        if state.fail_pod_listing {
            return Err(ClusterApiError::Listing("pod lister is down".to_string()));
        }
        Ok(state.unschedulable_pods.clone())
    }
}

impl PodConditionUpdater for FakeCluster {
    fn reset_unschedulable(&mut self, pod: &Pod) -> Result<(), ClusterApiError> {
        let mut state = self.state.borrow_mut();
        state.reset_pods.push(pod.metadata.name.clone());
        // The scheduler owns the pod again until it re-marks it.
        state
            .unschedulable_pods
            .retain(|candidate| candidate.metadata.name != pod.metadata.name);
        Ok(())
    }
}

impl PodEvictor for FakeCluster {
    fn evict(&mut self, pod: &Pod) -> Result<(), ClusterApiError> {
        let mut state = self.state.borrow_mut();
        if state.fail_evictions {
            return Err(ClusterApiError::Eviction(format!(
                "eviction of {} rejected",
                pod.metadata.name
            )));
        }
        state.evicted_pods.push(pod.metadata.name.clone());
        Ok(())
    }
}

impl EventRecorder for FakeCluster {
    fn record(&mut self, event: AutoscalerEvent) {
        self.state.borrow_mut().events.push(event);
    }
}

pub struct FakeGroupState {
    pub bounds: NodeGroupBounds,
    pub current_size: u64,
    pub template: Node,
    pub node_names: Vec<String>,
    pub deleted_nodes: Vec<String>,
    pub resize_calls: Vec<u64>,
}

#[derive(Default)]
pub struct FakeProviderState {
    pub groups: BTreeMap<String, FakeGroupState>,
    pub fail_resize: bool,
    pub fail_delete: bool,
}

/// In-memory node-group provider. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct FakeNodeGroupProvider {
    state: Rc<RefCell<FakeProviderState>>,
}

impl FakeNodeGroupProvider {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a group with the given bounds, template and member nodes.
    pub fn add_group(&self, bounds: NodeGroupBounds, template: Node, node_names: Vec<String>) {
        let id = bounds.id.clone();
        let group = FakeGroupState {
            bounds,
            current_size: node_names.len() as u64,
            template,
            node_names,
            deleted_nodes: Default::default(),
            resize_calls: Default::default(),
        };
        assert!(
            self.state.borrow_mut().groups.insert(id, group).is_none(),
            "unique node group id should be used"
        );
    }

    pub fn group_size(&self, group_id: &str) -> u64 {
        self.state.borrow().groups[group_id].current_size
    }

    pub fn resize_calls(&self, group_id: &str) -> Vec<u64> {
        self.state.borrow().groups[group_id].resize_calls.clone()
    }

    pub fn deleted_nodes(&self, group_id: &str) -> Vec<String> {
        self.state.borrow().groups[group_id].deleted_nodes.clone()
    }

    pub fn total_mutations(&self) -> usize {
        let state = self.state.borrow();
        state
            .groups
            .values()
            .map(|group| group.resize_calls.len() + group.deleted_nodes.len())
            .sum()
    }

    pub fn set_fail_resize(&self, fail: bool) {
        self.state.borrow_mut().fail_resize = fail;
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.state.borrow_mut().fail_delete = fail;
    }
}

impl NodeGroupProvider for FakeNodeGroupProvider {
    fn groups(&self) -> Result<Vec<NodeGroup>, ProviderError> {
        Ok(self
            .state
            .borrow()
            .groups
            .values()
            .map(|group| NodeGroup {
                id: group.bounds.id.clone(),
                current_size: group.current_size,
                min_size: group.bounds.min,
                max_size: group.bounds.max,
            })
            .collect())
    }

    fn group_for_node(&self, node_name: &str) -> Result<Option<NodeGroup>, ProviderError> {
        Ok(self
            .state
            .borrow()
            .groups
            .values()
            .find(|group| group.node_names.iter().any(|name| name == node_name))
            .map(|group| NodeGroup {
                id: group.bounds.id.clone(),
                current_size: group.current_size,
                min_size: group.bounds.min,
                max_size: group.bounds.max,
            }))
    }

    fn template_node(&self, group_id: &str) -> Result<Node, ProviderError> {
        let state = self.state.borrow();
        let group = state
            .groups
            .get(group_id)
            .ok_or_else(|| ProviderError::GroupNotFound(group_id.to_string()))?;
        Ok(group.template.clone())
    }

    fn resize(&mut self, group_id: &str, new_size: u64) -> Result<(), ProviderError> {
        let mut state = self.state.borrow_mut();
        if state.fail_resize {
            return Err(ProviderError::Backend("resize rejected".to_string()));
        }
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| ProviderError::GroupNotFound(group_id.to_string()))?;
        if new_size == group.current_size {
            return Ok(());
        }
        if new_size < group.bounds.min || new_size > group.bounds.max {
            return Err(ProviderError::SizeOutOfBounds {
                group: group_id.to_string(),
                requested: new_size,
                min: group.bounds.min,
                max: group.bounds.max,
            });
        }
        group.resize_calls.push(new_size);
        group.current_size = new_size;
        Ok(())
    }

    fn delete_node(&mut self, group_id: &str, node_name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.borrow_mut();
        if state.fail_delete {
            return Err(ProviderError::Backend("delete rejected".to_string()));
        }
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| ProviderError::GroupNotFound(group_id.to_string()))?;
        group
            .node_names
            .retain(|name| name != node_name);
        group.deleted_nodes.push(node_name.to_string());
        group.current_size -= 1;
        Ok(())
    }
}

/// Predicate checker that always errors, for the unknown-means-no-fit policy.
pub struct FailingPredicateChecker {}
impl PredicateChecker for FailingPredicateChecker {
    fn fits(&self, pod: &Pod, _: &Node, _: &[&Pod]) -> Result<bool, PredicateError> {
        Err(PredicateError::Failed {
            plugin: "Fake".to_string(),
            pod: pod.metadata.name.clone(),
            message: "oracle unavailable".to_string(),
        })
    }
}

pub fn build_node(name: &str, cpu: u32, ram: u64) -> Node {
    Node::new(name.to_string(), cpu, ram)
}

pub fn build_node_available_since(name: &str, cpu: u32, ram: u64, available_time: f64) -> Node {
    let mut node = build_node(name, cpu, ram);
    node.status.available_time = available_time;
    node
}

pub fn build_pod(name: &str, cpu: u32, ram: u64) -> Pod {
    let mut pod = Pod::default();
    pod.metadata.name = name.to_string();
    pod.spec.resources.requests.cpu = cpu;
    pod.spec.resources.requests.ram = ram;
    pod
}

pub fn scheduled_pod(name: &str, cpu: u32, ram: u64, node_name: &str) -> Pod {
    let mut pod = build_pod(name, cpu, ram);
    pod.status.assigned_node = Some(node_name.to_string());
    pod
}

pub fn unschedulable_pod(name: &str, cpu: u32, ram: u64, since: f64) -> Pod {
    let mut pod = build_pod(name, cpu, ram);
    pod.status.conditions.push(PodCondition {
        status: "False".to_string(),
        condition_type: PodConditionType::PodScheduled,
        last_transition_time: since,
    });
    pod
}

pub fn default_test_config(with_suffix: Option<&str>) -> AutoscalerConfig {
    let mut default = r#"
    scan_interval: 10.0
    scale_down_delay: 600.0
    scale_down_unneeded_time: 600.0
    scale_down_utilization_threshold: 0.5
    scale_down_trial_interval: 60.0
    "#
    .to_string();

    if let Some(suffix) = with_suffix {
        default.push_str(suffix);
    }

    AutoscalerConfig::from_yaml(&default).unwrap()
}

/// Wires a reconciler to the fakes with the default predicate checker.
pub fn build_reconciler(
    config: AutoscalerConfig,
    cluster: &FakeCluster,
    provider: &FakeNodeGroupProvider,
    now: f64,
) -> Reconciler {
    Reconciler::new(
        config,
        cluster.api(),
        Box::new(provider.clone()),
        Box::new(DefaultPredicateChecker::new()),
        now,
    )
}

pub fn bounds(id: &str, min: u64, max: u64) -> NodeGroupBounds {
    NodeGroupBounds {
        id: id.to_string(),
        min,
        max,
        extra: Default::default(),
    }
}
