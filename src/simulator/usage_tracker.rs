//! Tracks where relocation plans intend to move pods, so that a planned
//! destination is not itself removed while the plan is still fresh.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    /// Node the pod was last planned to move to.
    pub node_name: String,
    pub last_seen: f64,
}

/// Mapping of pod name to its last planned destination with a last-seen
/// timestamp. Entries live for the scale-down unneeded window; `cleanup`
/// drops everything older than the cutoff.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: BTreeMap<String, UsageRecord>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            usage: Default::default(),
        }
    }

    pub fn register_usage(&mut self, pod_name: &str, node_name: &str, now: f64) {
        self.usage.insert(
            pod_name.to_string(),
            UsageRecord {
                node_name: node_name.to_string(),
                last_seen: now,
            },
        );
    }

    /// Whether any fresh relocation plan points at `node_name`.
    pub fn is_destination(&self, node_name: &str) -> bool {
        self.usage
            .values()
            .any(|record| record.node_name == node_name)
    }

    pub fn get(&self, pod_name: &str) -> Option<&UsageRecord> {
        self.usage.get(pod_name)
    }

    /// Drops all records last seen before `cutoff`.
    pub fn cleanup(&mut self, cutoff: f64) {
        self.usage.retain(|_, record| record.last_seen >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }
}
