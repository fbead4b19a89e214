//! Scale-up planner: chooses one node group to expand and the delta needed
//! to place the pods the scheduler could not.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};
use thiserror::Error;

use crate::cluster_api::EventRecorder;
use crate::core::events::AutoscalerEvent;
use crate::core::node::Node;
use crate::core::pod::Pod;
use crate::provider::{NodeGroup, NodeGroupProvider, ProviderError};
use crate::simulator::predicate::{check_fits, PredicateChecker};
use crate::simulator::relocation::place_what_fits;

#[derive(Debug, Error)]
pub enum ScaleUpError {
    #[error("node group provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// The single group expansion committed by a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleUpPlan {
    pub group: String,
    pub delta: u64,
}

/// Picks the node group serving the most unschedulable pods, estimates the
/// smallest node count that accepts them all and requests one resize.
///
/// Returns `Ok(None)` when no expansion can help. Pods that fit no group
/// template receive a `NotTriggerScaleUp` event and do not block the rest.
pub fn scale_up(
    unschedulable_pods: &[Pod],
    provider: &mut dyn NodeGroupProvider,
    checker: &dyn PredicateChecker,
    recorder: &mut dyn EventRecorder,
) -> Result<Option<ScaleUpPlan>, ScaleUpError> {
    let groups = provider.groups()?;

    // Groups that can still grow, with a fresh template instance each.
    let mut expandable: BTreeMap<String, (NodeGroup, Node)> = Default::default();
    for group in groups.into_iter() {
        if group.current_size >= group.max_size {
            debug!("Node group {:?} is already at maximum size", group.id);
            continue;
        }
        match provider.template_node(&group.id) {
            Ok(template) => {
                let template = fresh_template_instance(&template, &group.id, 0);
                expandable.insert(group.id.clone(), (group, template));
            }
            Err(error) => {
                warn!(
                    "Skipping node group {:?}: failed to build template node: {}",
                    group.id, error
                );
            }
        }
    }

    if expandable.is_empty() {
        info!("All node groups are scaled to their maximum node count");
        return Ok(None);
    }

    // served(g): pods whose requests fit an empty template node of g.
    let mut served: BTreeMap<String, Vec<&Pod>> = Default::default();
    for pod in unschedulable_pods.iter() {
        let mut fits_somewhere = false;
        for (group_id, (_, template)) in expandable.iter() {
            if check_fits(checker, pod, template, &[]) {
                served.entry(group_id.clone()).or_default().push(pod);
                fits_somewhere = true;
            }
        }
        if !fits_somewhere {
            debug!(
                "Pod {:?} does not fit on any node group template",
                pod.metadata.name
            );
            recorder.record(AutoscalerEvent::NotTriggerScaleUp {
                pod_name: pod.metadata.name.clone(),
                reason: "pod does not fit on any node group template".to_string(),
            });
        }
    }

    // Choose the group serving the most pods; break ties by the smaller
    // increment needed, then by lexicographic group id (the map iteration
    // order).
    let mut best: Option<BestOption> = None;
    for (group_id, pods) in served.iter() {
        let (group, template) = &expandable[group_id];
        let worth_estimating = match &best {
            None => true,
            Some(current) => pods.len() >= current.served,
        };
        if !worth_estimating {
            continue;
        }
        let estimate = estimate_node_count(pods, template, group, checker);
        let better = match &best {
            None => true,
            Some(current) => {
                pods.len() > current.served
                    || (pods.len() == current.served && estimate.node_count < current.node_count)
            }
        };
        if better {
            best = Some(BestOption {
                group_id: group_id.clone(),
                served: pods.len(),
                node_count: estimate.node_count,
                placed: estimate.placed,
                unplaced: estimate.unplaced,
                new_size: group.current_size + estimate.node_count,
            });
        }
    }

    let option = match best {
        Some(option) => option,
        None => {
            info!("No node group can help any unschedulable pod");
            return Ok(None);
        }
    };

    info!(
        "Scaling up node group {:?} by {} nodes to serve {} pods",
        option.group_id,
        option.node_count,
        option.placed.len()
    );
    provider.resize(&option.group_id, option.new_size)?;

    for pod_name in option.placed.keys() {
        recorder.record(AutoscalerEvent::TriggeredScaleUp {
            pod_name: pod_name.clone(),
            group: option.group_id.clone(),
            delta: option.node_count,
        });
    }
    for pod_name in option.unplaced.iter() {
        recorder.record(AutoscalerEvent::NotTriggerScaleUp {
            pod_name: pod_name.clone(),
            reason: format!(
                "node group {} cannot grow enough to accommodate the pod",
                option.group_id
            ),
        });
    }

    Ok(Some(ScaleUpPlan {
        group: option.group_id,
        delta: option.node_count,
    }))
}

struct BestOption {
    group_id: String,
    served: usize,
    node_count: u64,
    placed: BTreeMap<String, String>,
    unplaced: Vec<String>,
    new_size: u64,
}

struct NodeCountEstimate {
    node_count: u64,
    placed: BTreeMap<String, String>,
    unplaced: Vec<String>,
}

/// Smallest k >= 1 such that k empty template nodes accept all pods, capped
/// at the group's remaining headroom. At the cap the placement is best
/// effort and leftover pods are reported.
fn estimate_node_count(
    pods: &[&Pod],
    template: &Node,
    group: &NodeGroup,
    checker: &dyn PredicateChecker,
) -> NodeCountEstimate {
    let headroom = group.max_size - group.current_size;
    let no_assignments: HashMap<String, Vec<&Pod>> = Default::default();
    let no_hints: BTreeMap<String, String> = Default::default();

    let mut last = None;
    for node_count in 1..=headroom {
        let synthetic: Vec<Node> = (0..node_count)
            .map(|i| fresh_template_instance(template, &group.id, i))
            .collect();
        let destinations: Vec<&Node> = synthetic.iter().collect();
        let (placed, unplaced) =
            place_what_fits(pods, &destinations, &no_assignments, &no_hints, checker);
        if unplaced.is_empty() {
            return NodeCountEstimate {
                node_count,
                placed,
                unplaced,
            };
        }
        last = Some((placed, unplaced));
    }

    // Headroom exhausted without placing everything.
    let (placed, unplaced) = last.unwrap_or_default();
    NodeCountEstimate {
        node_count: headroom,
        placed,
        unplaced,
    }
}

/// A hypothetical node the group would create: full allocatable, unique name.
fn fresh_template_instance(template: &Node, group_id: &str, index: u64) -> Node {
    let mut node = template.clone();
    if node.metadata.name.is_empty() {
        node.metadata.name = group_id.to_string();
    }
    node.metadata.name = format!("{}_{}", node.metadata.name, index);
    node.status.allocatable = node.status.capacity.clone();
    node
}
