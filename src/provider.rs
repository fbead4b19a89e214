//! Node-group provider abstraction over cloud-specific resize APIs.

use serde::Deserialize;
use thiserror::Error;

use crate::core::node::Node;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("node group {0} is not known to the provider")]
    GroupNotFound(String),
    #[error("resize of group {group} to {requested} is outside bounds [{min}, {max}]")]
    SizeOutOfBounds {
        group: String,
        requested: u64,
        min: u64,
        max: u64,
    },
    #[error("cloud backend error: {0}")]
    Backend(String),
}

/// Startup configuration tuple for one node group: identity, size bounds and
/// provider-opaque extras.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct NodeGroupBounds {
    pub id: String,
    pub min: u64,
    pub max: u64,
    #[serde(default)]
    pub extra: std::collections::HashMap<String, String>,
}

/// Observed state of one node group as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeGroup {
    pub id: String,
    pub current_size: u64,
    pub min_size: u64,
    pub max_size: u64,
}

/// The per-cloud capability set the engine drives.
///
/// `resize` and `delete_node` are asynchronous with respect to the cluster's
/// observation of membership: the engine never assumes the next tick already
/// reflects a mutation. Repeating a resize to the current target size must be
/// a no-op success.
pub trait NodeGroupProvider {
    fn groups(&self) -> Result<Vec<NodeGroup>, ProviderError>;

    /// The group owning `node_name`, or `None` for unmanaged nodes.
    fn group_for_node(&self, node_name: &str) -> Result<Option<NodeGroup>, ProviderError>;

    /// Resources and topology labels a newly created node of the group would
    /// carry.
    fn template_node(&self, group_id: &str) -> Result<Node, ProviderError>;

    fn resize(&mut self, group_id: &str, new_size: u64) -> Result<(), ProviderError>;

    fn delete_node(&mut self, group_id: &str, node_name: &str) -> Result<(), ProviderError>;
}
