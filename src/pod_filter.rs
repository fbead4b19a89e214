//! Re-checks pods the scheduler marked unschedulable before they are allowed
//! to trigger a scale up, and detects markers made stale by cluster growth.

use log::info;

use crate::core::node::Node;
use crate::core::pod::Pod;
use crate::simulator::predicate::{check_fits, PredicateChecker};
use crate::simulator::utilization::pods_by_node;

/// Time the newest node became available to the scheduler. 0 for an empty
/// snapshot.
pub fn newest_node_available_time(nodes: &[Node]) -> f64 {
    nodes
        .iter()
        .map(|node| node.status.available_time)
        .fold(0.0, f64::max)
}

/// Splits unschedulable pods by the age of their marker relative to the
/// newest node. Pods marked before that node appeared go into the first
/// list: the world has changed since the scheduler gave up on them, so the
/// marker should be cleared and the pod retried rather than acted on.
pub fn slice_pods_by_scheduled_time(
    unschedulable_pods: Vec<Pod>,
    all_nodes_available_time: f64,
) -> (Vec<Pod>, Vec<Pod>) {
    let mut pods_to_reset = Vec::new();
    let mut pods_to_help = Vec::new();
    for pod in unschedulable_pods.into_iter() {
        match pod.unschedulable_since() {
            Some(since) if since < all_nodes_available_time => pods_to_reset.push(pod),
            Some(_) => pods_to_help.push(pod),
            // No marker at all: nothing to reset, nothing to help.
            None => {}
        }
    }
    (pods_to_reset, pods_to_help)
}

/// Drops pods that would in fact schedule on some current node with its
/// current pod set. Such pods mean the scheduler and the engine disagree,
/// and growing the cluster for them would be wasted capacity.
pub fn filter_out_schedulable(
    unschedulable_pods: Vec<Pod>,
    nodes: &[Node],
    scheduled_pods: &[Pod],
    checker: &dyn PredicateChecker,
) -> Vec<Pod> {
    let assigned = pods_by_node(scheduled_pods);
    let empty: Vec<&Pod> = Vec::new();

    unschedulable_pods
        .into_iter()
        .filter(|pod| {
            let schedulable_on = nodes.iter().find(|node| {
                let co_scheduled = assigned.get(&node.metadata.name).unwrap_or(&empty);
                check_fits(checker, pod, node, co_scheduled)
            });
            match schedulable_on {
                Some(node) => {
                    info!(
                        "Pod {:?} is marked unschedulable but fits on node {:?}",
                        pod.metadata.name, node.metadata.name
                    );
                    false
                }
                None => true,
            }
        })
        .collect()
}
