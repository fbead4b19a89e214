//! Node utilization as seen by the scale-down planner.

use std::collections::HashMap;

use crate::core::node::Node;
use crate::core::pod::Pod;

/// Utilization of a node, defined as the maximum over the cpu and ram
/// fractions of summed pod requests divided by allocatable.
/// A node with no pods has utilization 0. A dimension with zero allocatable
/// but nonzero requests yields infinity.
pub fn node_utilization(node: &Node, pods: &[&Pod]) -> f64 {
    let mut cpu_requests: u64 = 0;
    let mut ram_requests: u64 = 0;
    for pod in pods.iter() {
        let requests = pod.requested_resources();
        cpu_requests += requests.cpu as u64;
        ram_requests += requests.ram;
    }

    let cpu_utilization = fraction(cpu_requests, node.status.allocatable.cpu as u64);
    let ram_utilization = fraction(ram_requests, node.status.allocatable.ram);

    if cpu_utilization > ram_utilization {
        cpu_utilization
    } else {
        ram_utilization
    }
}

fn fraction(requested: u64, allocatable: u64) -> f64 {
    if allocatable == 0 {
        if requested == 0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        requested as f64 / allocatable as f64
    }
}

/// Groups a scheduled-pod snapshot by assigned node name.
pub fn pods_by_node(scheduled_pods: &[Pod]) -> HashMap<String, Vec<&Pod>> {
    let mut by_node: HashMap<String, Vec<&Pod>> = Default::default();
    for pod in scheduled_pods.iter() {
        if let Some(node_name) = &pod.status.assigned_node {
            by_node.entry(node_name.clone()).or_default().push(pod);
        }
    }
    by_node
}
