//! Cluster autoscaling decision engine.
//!
//! The crate implements the scaling control loop of a container
//! orchestrator: a [`reconciler::Reconciler`] periodically snapshots nodes
//! and pods through the capability traits in [`cluster_api`], plans node
//! group expansions ([`scale_up`]) for pods the scheduler could not place,
//! and removes nodes that stay underutilized for a full hysteresis window
//! ([`scale_down`]), driving one of the cloud adapters behind
//! [`provider::NodeGroupProvider`].

pub mod cluster_api;
pub mod config;
pub mod core;
pub mod metrics;
pub mod pod_filter;
pub mod provider;
pub mod reconciler;
pub mod scale_down;
pub mod scale_up;
pub mod simulator;
pub mod test_util;
