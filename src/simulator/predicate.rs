//! Scheduler predicate oracle reused by the planners to answer "does this
//! pod fit on that node".
//!
//! The default checker runs filter plugins registered globally, mirroring
//! scheduler behavior so the engine and the scheduler cannot disagree on
//! fit. Plugins must be pure with respect to their inputs.

use std::collections::HashMap;

use lazy_static::lazy_static;
use thiserror::Error;

use crate::core::node::Node;
use crate::core::pod::Pod;

#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("unknown predicate plugin {0}")]
    UnknownPlugin(String),
    #[error("predicate {plugin} failed for pod {pod}: {message}")]
    Failed {
        plugin: String,
        pod: String,
        message: String,
    },
}

/// Answers whether `pod` can be placed on `node` given the pods already
/// assigned to it within the current simulation frame.
pub trait PredicateChecker {
    fn fits(&self, pod: &Pod, node: &Node, co_scheduled: &[&Pod]) -> Result<bool, PredicateError>;
}

pub trait FilterPlugin: Send + Sync {
    fn filter(&self, pod: &Pod, node: &Node, co_scheduled: &[&Pod])
        -> Result<bool, PredicateError>;
}

lazy_static! {
    pub static ref PREDICATE_REGISTRY: HashMap<&'static str, Box<dyn FilterPlugin>> = {
        HashMap::from([
            ("Fit", Box::new(Fit {}) as Box<dyn FilterPlugin>),
            (
                "MatchNodeSelector",
                Box::new(MatchNodeSelector {}) as Box<dyn FilterPlugin>,
            ),
        ])
    };
}

// Fit checks that the pod's requests plus the requests of co-scheduled pods
// stay within the node's allocatable on every resource dimension.
pub struct Fit {}
impl FilterPlugin for Fit {
    fn filter(
        &self,
        pod: &Pod,
        node: &Node,
        co_scheduled: &[&Pod],
    ) -> Result<bool, PredicateError> {
        let mut requested = pod.requested_resources().clone();
        for other in co_scheduled.iter() {
            requested.accumulate(other.requested_resources());
        }
        Ok(requested.fits_within(&node.status.allocatable))
    }
}

// MatchNodeSelector checks that every label the pod selects on is present on
// the node with the expected value.
pub struct MatchNodeSelector {}
impl FilterPlugin for MatchNodeSelector {
    fn filter(&self, pod: &Pod, node: &Node, _: &[&Pod]) -> Result<bool, PredicateError> {
        Ok(pod
            .spec
            .node_selector
            .iter()
            .all(|(key, value)| node.metadata.labels.get(key) == Some(value)))
    }
}

/// Runs the enabled plugins in order; the pod fits iff every plugin accepts.
pub struct DefaultPredicateChecker {
    enabled: Vec<&'static str>,
}

impl DefaultPredicateChecker {
    pub fn new() -> Self {
        Self {
            enabled: vec!["Fit", "MatchNodeSelector"],
        }
    }
}

impl Default for DefaultPredicateChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl PredicateChecker for DefaultPredicateChecker {
    fn fits(&self, pod: &Pod, node: &Node, co_scheduled: &[&Pod]) -> Result<bool, PredicateError> {
        for name in self.enabled.iter() {
            let plugin = PREDICATE_REGISTRY
                .get(name)
                .ok_or_else(|| PredicateError::UnknownPlugin(name.to_string()))?;
            if !plugin.filter(pod, node, co_scheduled)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Planner-side wrapper implementing the "unknown means does not fit" policy:
/// an oracle failure is logged and reported as no fit, never halting a scan.
pub fn check_fits(
    checker: &dyn PredicateChecker,
    pod: &Pod,
    node: &Node,
    co_scheduled: &[&Pod],
) -> bool {
    match checker.fits(pod, node, co_scheduled) {
        Ok(fits) => fits,
        Err(error) => {
            log::warn!(
                "Predicate check for pod {:?} on node {:?} failed, assuming it does not fit: {}",
                pod.metadata.name,
                node.metadata.name,
                error
            );
            false
        }
    }
}
