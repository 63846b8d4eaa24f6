//! Current-state index of the provisioning backend
//!
//! Built fresh on every run from a full listing: one lookup by MAC address and
//! one by the driver-specific unique power address, both mapping to backend
//! node ids.

use crate::domain::ports::ProvisioningBackend;
use crate::error::{Error, Result};
use crate::nodes::descriptor::NodeDescriptor;
use crate::nodes::drivers::{find_driver_handler, DriverFamily};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Lookup tables from node identity to backend node id
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    by_mac: HashMap<String, BTreeSet<String>>,
    by_power_address: HashMap<String, BTreeSet<String>>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// List every backend node and index it by its ports and power address.
    ///
    /// Nodes whose driver is unknown or whose record lacks an address field
    /// are only indexed by MAC.
    pub async fn discover(backend: &dyn ProvisioningBackend) -> Result<Self> {
        let mut index = Self::new();
        let nodes = backend.list_nodes().await?;
        debug!(nodes = nodes.len(), "Discovered existing nodes");

        for node in &nodes {
            for port in backend.list_ports(&node.uuid).await? {
                index.insert_mac(&port.address, &node.uuid);
            }

            match find_driver_handler(&node.driver) {
                Ok(family) => match family.unique_id_from_record(node) {
                    Some(key) => index.insert_power_address(&key, &node.uuid),
                    None => debug!(node = %node.uuid, "Node has no power address"),
                },
                Err(e) => debug!(node = %node.uuid, error = %e, "Skipping power address"),
            }
        }

        Ok(index)
    }

    pub fn insert_mac(&mut self, mac: &str, node_id: &str) {
        insert_id(&mut self.by_mac, mac.to_lowercase(), node_id, "mac");
    }

    pub fn insert_power_address(&mut self, key: &str, node_id: &str) {
        insert_id(
            &mut self.by_power_address,
            key.to_string(),
            node_id,
            "power address",
        );
    }

    #[cfg(test)]
    pub fn mac_count(&self) -> usize {
        self.by_mac.len()
    }

    #[cfg(test)]
    pub fn power_address_count(&self) -> usize {
        self.by_power_address.len()
    }

    /// Find the backend node a descriptor refers to.
    ///
    /// Returns `None` for a new node and fails with `InvalidNode` when more
    /// than one backend node matches.
    pub fn resolve(&self, node: &NodeDescriptor, family: DriverFamily) -> Result<Option<String>> {
        let mut candidates = BTreeSet::new();

        for mac in node.macs() {
            if let Some(ids) = self.by_mac.get(&mac) {
                candidates.extend(ids.iter().cloned());
            }
        }
        if let Some(key) = family.unique_id_from_descriptor(node) {
            if let Some(ids) = self.by_power_address.get(&key) {
                candidates.extend(ids.iter().cloned());
            }
        }

        if candidates.len() > 1 {
            return Err(Error::InvalidNode {
                reason: format!(
                    "multiple existing nodes match: {}",
                    candidates.into_iter().collect::<Vec<_>>().join(", ")
                ),
                node: Some(node.summary()),
            });
        }
        Ok(candidates.into_iter().next())
    }
}

/// Every id sharing a key is kept so that `resolve` reports the ambiguity
fn insert_id(map: &mut HashMap<String, BTreeSet<String>>, key: String, node_id: &str, kind: &str) {
    let ids = map.entry(key).or_default();
    if !ids.is_empty() && !ids.contains(node_id) {
        warn!(
            key = ?ids,
            kind,
            node = %node_id,
            "Identity shared by more than one backend node"
        );
    }
    ids.insert(node_id.to_string());
}
