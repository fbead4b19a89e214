//! Relocation planning: greedy placement of a set of pods onto candidate
//! destination nodes, accumulating assignments as they are made.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::core::node::Node;
use crate::core::pod::Pod;
use crate::simulator::predicate::{check_fits, PredicateChecker};

#[derive(Debug, Error, PartialEq)]
pub enum RelocationError {
    #[error("no destination accepts pod {0}")]
    NoPlaceFor(String),
}

/// Attempts to place every pod on exactly one destination node.
///
/// Pods are processed in descending request order (cpu-weighted, then ram)
/// to reduce fragmentation failures. For each pod the destination named in
/// `hints` is tried first, then the remaining destinations in ascending
/// node-name order. Placements made earlier in the walk count as
/// co-scheduled pods for later ones. `assigned` carries the pods currently
/// running on each destination.
///
/// Returns the full pod name to node name plan, or the first pod that could
/// not be placed. Deterministic for a fixed input.
pub fn try_relocate(
    pods: &[&Pod],
    destinations: &[&Node],
    assigned: &HashMap<String, Vec<&Pod>>,
    hints: &BTreeMap<String, String>,
    checker: &dyn PredicateChecker,
) -> Result<BTreeMap<String, String>, RelocationError> {
    let (plan, unplaced) = place_what_fits(pods, destinations, assigned, hints, checker);
    match unplaced.into_iter().next() {
        None => Ok(plan),
        Some(pod_name) => Err(RelocationError::NoPlaceFor(pod_name)),
    }
}

/// Best-effort variant of [`try_relocate`]: places what it can and returns
/// the plan together with the names of pods left over, in processing order.
pub fn place_what_fits(
    pods: &[&Pod],
    destinations: &[&Node],
    assigned: &HashMap<String, Vec<&Pod>>,
    hints: &BTreeMap<String, String>,
    checker: &dyn PredicateChecker,
) -> (BTreeMap<String, String>, Vec<String>) {
    let mut ordered_pods: Vec<&Pod> = pods.to_vec();
    ordered_pods.sort_by(|a, b| {
        let ka = (a.requested_resources().cpu, a.requested_resources().ram);
        let kb = (b.requested_resources().cpu, b.requested_resources().ram);
        kb.cmp(&ka)
    });

    let mut ordered_destinations: Vec<&Node> = destinations.to_vec();
    ordered_destinations.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    // Simulation frame: pods considered present on each destination, both
    // currently assigned ones and placements committed during this walk.
    let mut frame: HashMap<&str, Vec<&Pod>> = Default::default();
    for node in ordered_destinations.iter() {
        let name = node.metadata.name.as_str();
        frame.insert(
            name,
            assigned.get(name).cloned().unwrap_or_default(),
        );
    }

    let mut plan: BTreeMap<String, String> = Default::default();
    let mut unplaced: Vec<String> = Default::default();

    for pod in ordered_pods.into_iter() {
        let hinted = hints.get(&pod.metadata.name);
        let mut candidates: Vec<&Node> = Vec::with_capacity(ordered_destinations.len());
        if let Some(hint) = hinted {
            if let Some(node) = ordered_destinations
                .iter()
                .copied()
                .find(|node| &node.metadata.name == hint)
            {
                candidates.push(node);
            }
        }
        for node in ordered_destinations.iter().copied() {
            if Some(&node.metadata.name) != hinted {
                candidates.push(node);
            }
        }

        let mut placed = false;
        for node in candidates.into_iter() {
            let co_scheduled = frame
                .get(node.metadata.name.as_str())
                .map(|pods| pods.as_slice())
                .unwrap_or(&[]);
            if check_fits(checker, pod, node, co_scheduled) {
                plan.insert(pod.metadata.name.clone(), node.metadata.name.clone());
                if let Some(pods) = frame.get_mut(node.metadata.name.as_str()) {
                    pods.push(pod);
                }
                placed = true;
                break;
            }
        }
        if !placed {
            unplaced.push(pod.metadata.name.clone());
        }
    }

    (plan, unplaced)
}
