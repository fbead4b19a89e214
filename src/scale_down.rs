//! Scale-down planner: classifies nodes as unneeded and removes at most one
//! of them per pass once it has stayed unneeded long enough.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, info, warn};
use thiserror::Error;

use crate::cluster_api::{ClusterApiError, EventRecorder, PodEvictor};
use crate::core::events::AutoscalerEvent;
use crate::core::node::Node;
use crate::core::pod::Pod;
use crate::provider::{NodeGroupProvider, ProviderError};
use crate::simulator::predicate::PredicateChecker;
use crate::simulator::relocation::try_relocate;
use crate::simulator::usage_tracker::UsageTracker;
use crate::simulator::utilization::{node_utilization, pods_by_node};

#[derive(Debug, Error)]
pub enum ScaleDownError {
    #[error("node group provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("failed to evict pod {pod} from node {node}: {source}")]
    Eviction {
        pod: String,
        node: String,
        #[source]
        source: ClusterApiError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScaleDownStatus {
    NodeDeleted(String),
    NoNodeDeleted,
}

/// Output of one classification pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnneededNodesResult {
    /// Node name to the time it was first observed unneeded.
    pub unneeded: BTreeMap<String, f64>,
    /// Pod name to the destination its relocation plan names.
    pub hints: BTreeMap<String, String>,
}

/// Classifies nodes as unneeded: utilization below the threshold, managed by
/// a node group, evictable, and with every pod placeable elsewhere.
///
/// Candidates are walked in ascending utilization order and committed
/// provisionally: a later candidate must find destinations among nodes not
/// already committed for removal, so two underutilized nodes cannot both
/// plan to relocate onto each other. Committed plans are registered in the
/// usage tracker and returned as location hints.
#[allow(clippy::too_many_arguments)]
pub fn find_unneeded_nodes(
    nodes: &[Node],
    scheduled_pods: &[Pod],
    previous_unneeded: &BTreeMap<String, f64>,
    utilization_threshold: f64,
    provider: &dyn NodeGroupProvider,
    checker: &dyn PredicateChecker,
    hints: &BTreeMap<String, String>,
    usage_tracker: &mut UsageTracker,
    now: f64,
) -> UnneededNodesResult {
    let assigned = pods_by_node(scheduled_pods);
    let empty: Vec<&Pod> = Vec::new();

    // (a)-(c): underutilized, provider-managed, evictable.
    let mut candidates: Vec<(f64, &Node)> = Vec::new();
    for node in nodes.iter() {
        let pods_on_node = assigned.get(&node.metadata.name).unwrap_or(&empty);
        let utilization = node_utilization(node, pods_on_node);
        if utilization >= utilization_threshold {
            continue;
        }
        if node.scale_down_disabled() {
            debug!(
                "Node {:?} is underutilized but opted out of scale down",
                node.metadata.name
            );
            continue;
        }
        match provider.group_for_node(&node.metadata.name) {
            Ok(Some(_)) => candidates.push((utilization, node)),
            Ok(None) => {
                debug!(
                    "Node {:?} is underutilized but not managed by any node group",
                    node.metadata.name
                );
            }
            Err(error) => {
                warn!(
                    "Skipping node {:?}: group lookup failed: {}",
                    node.metadata.name, error
                );
            }
        }
    }
    candidates.sort_by(|(ua, a), (ub, b)| {
        ua.partial_cmp(ub)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.metadata.name.cmp(&b.metadata.name))
    });

    // (d): every pod must relocate onto the remaining nodes, with already
    // committed removals excluded from the destination set.
    let mut committed: BTreeSet<String> = Default::default();
    let mut sim_assigned: HashMap<String, Vec<&Pod>> = assigned.clone();
    let mut new_hints: BTreeMap<String, String> = Default::default();

    for (utilization, node) in candidates.into_iter() {
        let destinations: Vec<&Node> = nodes
            .iter()
            .filter(|other| {
                other.metadata.name != node.metadata.name
                    && !committed.contains(&other.metadata.name)
            })
            .collect();
        let pods_on_node = assigned.get(&node.metadata.name).unwrap_or(&empty);

        match try_relocate(pods_on_node, &destinations, &sim_assigned, hints, checker) {
            Ok(plan) => {
                debug!(
                    "Node {:?} (utilization {:.3}) is unneeded, relocation plan: {:?}",
                    node.metadata.name, utilization, plan
                );
                committed.insert(node.metadata.name.clone());
                for (pod_name, destination) in plan.into_iter() {
                    usage_tracker.register_usage(&pod_name, &destination, now);
                    if let Some(pod) = pods_on_node
                        .iter()
                        .copied()
                        .find(|pod| pod.metadata.name == pod_name)
                    {
                        sim_assigned.entry(destination.clone()).or_default().push(pod);
                    }
                    new_hints.insert(pod_name, destination);
                }
            }
            Err(error) => {
                debug!(
                    "Cannot scale down node {:?}: {}",
                    node.metadata.name, error
                );
            }
        }
    }

    // First-observed timestamps survive while the node stays unneeded;
    // nodes absent from this classification drop out.
    let mut unneeded: BTreeMap<String, f64> = Default::default();
    for node_name in committed.into_iter() {
        let since = previous_unneeded
            .get(&node_name)
            .copied()
            .unwrap_or(now)
            .min(now);
        unneeded.insert(node_name, since);
    }

    // Carry over hints for pods that still exist and got no fresh plan.
    let live_pods: BTreeSet<&str> = scheduled_pods
        .iter()
        .map(|pod| pod.metadata.name.as_str())
        .collect();
    let mut merged_hints = new_hints;
    for (pod_name, destination) in hints.iter() {
        if live_pods.contains(pod_name.as_str()) {
            merged_hints
                .entry(pod_name.clone())
                .or_insert_with(|| destination.clone());
        }
    }

    UnneededNodesResult {
        unneeded,
        hints: merged_hints,
    }
}

/// Removes the oldest node that has been unneeded for the full window:
/// re-verifies its relocation plan against the current snapshot, drains its
/// pods and asks the provider to delete it. At most one node per pass.
#[allow(clippy::too_many_arguments)]
pub fn scale_down(
    nodes: &[Node],
    unneeded: &BTreeMap<String, f64>,
    scheduled_pods: &[Pod],
    unneeded_time: f64,
    provider: &mut dyn NodeGroupProvider,
    checker: &dyn PredicateChecker,
    hints: &BTreeMap<String, String>,
    usage_tracker: &UsageTracker,
    evictor: &mut dyn PodEvictor,
    recorder: &mut dyn EventRecorder,
    now: f64,
) -> Result<ScaleDownStatus, ScaleDownError> {
    let assigned = pods_by_node(scheduled_pods);
    let empty: Vec<&Pod> = Vec::new();

    // Oldest unneeded first; name as the deterministic tie-break.
    let mut eligible: Vec<(f64, &str)> = unneeded
        .iter()
        .filter(|(_, since)| now - **since >= unneeded_time)
        .map(|(name, since)| (*since, name.as_str()))
        .collect();
    eligible.sort_by(|(sa, na), (sb, nb)| {
        sa.partial_cmp(sb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| na.cmp(nb))
    });

    for (since, node_name) in eligible.into_iter() {
        let node = match nodes.iter().find(|node| node.metadata.name == node_name) {
            Some(node) => node,
            None => {
                warn!(
                    "Unneeded node {:?} is missing from the snapshot, skipping",
                    node_name
                );
                continue;
            }
        };

        let group = match provider.group_for_node(node_name)? {
            Some(group) => group,
            None => {
                warn!(
                    "Unneeded node {:?} no longer belongs to a node group, skipping",
                    node_name
                );
                continue;
            }
        };
        if group.current_size <= group.min_size {
            debug!(
                "Not removing node {:?}: group {:?} is at minimum size {}",
                node_name, group.id, group.min_size
            );
            continue;
        }

        if usage_tracker.is_destination(node_name) {
            debug!(
                "Not removing node {:?}: fresh relocation plans point at it",
                node_name
            );
            continue;
        }

        // The classification ran on this snapshot already, but the plan is
        // re-verified here so the drain follows a plan that excludes nothing
        // but this node.
        let destinations: Vec<&Node> = nodes
            .iter()
            .filter(|other| other.metadata.name != node_name)
            .collect();
        let pods_on_node = assigned.get(node_name).unwrap_or(&empty);
        let plan = match try_relocate(pods_on_node, &destinations, &assigned, hints, checker) {
            Ok(plan) => plan,
            Err(error) => {
                debug!("Not removing node {:?}: {}", node_name, error);
                continue;
            }
        };

        info!(
            "Removing node {:?}, unneeded since {:.1}, {} pods to relocate",
            node_name,
            since,
            pods_on_node.len()
        );

        for pod in pods_on_node.iter().copied() {
            debug!(
                "Evicting pod {:?}, planned destination {:?}",
                pod.metadata.name,
                plan.get(&pod.metadata.name)
            );
            if let Err(error) = evictor.evict(pod) {
                recorder.record(AutoscalerEvent::ScaleDownFailed {
                    node_name: node_name.to_string(),
                    reason: format!("failed to evict pod {}: {}", pod.metadata.name, error),
                });
                return Err(ScaleDownError::Eviction {
                    pod: pod.metadata.name.clone(),
                    node: node_name.to_string(),
                    source: error,
                });
            }
        }

        if let Err(error) = provider.delete_node(&group.id, node_name) {
            recorder.record(AutoscalerEvent::ScaleDownFailed {
                node_name: node_name.to_string(),
                reason: error.to_string(),
            });
            return Err(error.into());
        }

        recorder.record(AutoscalerEvent::ScaleDown {
            node_name: node_name.to_string(),
        });
        return Ok(ScaleDownStatus::NodeDeleted(node_name.to_string()));
    }

    Ok(ScaleDownStatus::NoNodeDeleted)
}
