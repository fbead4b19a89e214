//! Common primitives shared by node and pod definitions.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Resource vector of a node or a pod request.
/// Extended resources (device plugins, hugepages and alike) are carried as an
/// opaque name to quantity mapping.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct RuntimeResources {
    pub cpu: u32, // in millicores
    pub ram: u64, // in bytes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extended: BTreeMap<String, u64>,
}

impl RuntimeResources {
    pub fn new(cpu: u32, ram: u64) -> Self {
        Self {
            cpu,
            ram,
            extended: Default::default(),
        }
    }

    /// Adds `other` to this vector in place, dimension by dimension.
    pub fn accumulate(&mut self, other: &RuntimeResources) {
        self.cpu += other.cpu;
        self.ram += other.ram;
        for (name, quantity) in other.extended.iter() {
            *self.extended.entry(name.clone()).or_insert(0) += quantity;
        }
    }

    /// Whether this vector fits within `available` on every dimension.
    /// An extended resource absent from `available` counts as zero capacity.
    pub fn fits_within(&self, available: &RuntimeResources) -> bool {
        if self.cpu > available.cpu || self.ram > available.ram {
            return false;
        }
        self.extended
            .iter()
            .all(|(name, quantity)| *quantity <= available.extended.get(name).copied().unwrap_or(0))
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}
