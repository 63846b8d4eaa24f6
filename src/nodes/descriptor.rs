//! Desired-state node descriptors
//!
//! A descriptor identifies one physical machine by its hardware facts, its
//! MAC addresses and its power-management credentials. Keys the descriptor
//! does not know about are kept in the credential bag and translated by the
//! node's driver family.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Free-form node capabilities, either `"k:v,k:v"` or a JSON object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Capabilities {
    Text(String),
    Map(BTreeMap<String, String>),
}

impl Capabilities {
    /// Render in the `key:value,key:value` form the backend stores
    pub fn render(&self) -> String {
        match self {
            Capabilities::Text(text) => text.clone(),
            Capabilities::Map(map) => map
                .iter()
                .map(|(k, v)| format!("{k}:{v}"))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Desired state for one bare-metal node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Optional human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// CPU count
    #[serde(deserialize_with = "integer_or_string")]
    pub cpu: u64,
    /// Memory in MB
    #[serde(deserialize_with = "integer_or_string")]
    pub memory: u64,
    /// Local disk in GB
    #[serde(deserialize_with = "integer_or_string")]
    pub disk: u64,
    /// CPU architecture, e.g. `amd64`
    pub arch: String,
    /// MAC addresses, first one is the provisioning interface
    pub mac: Vec<String>,
    /// Power-management driver, e.g. `pxe_ipmitool`
    pub pm_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    /// Deploy kernel image id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_id: Option<String>,
    /// Deploy ramdisk image id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ramdisk_id: Option<String>,
    /// Power-management credentials (`pm_addr`, `pm_user`, ...) and any
    /// driver-prefixed keys
    #[serde(flatten)]
    pub power: BTreeMap<String, Value>,
}

pub(crate) fn integer_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("expected a non-negative integer, got {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("expected an integer, got {s:?}"))),
        other => Err(D::Error::custom(format!("expected an integer, got {other}"))),
    }
}

/// Render a JSON value the way it is sent to the backend: strings verbatim,
/// everything else as JSON text
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl NodeDescriptor {
    /// Look up a power-management field as a string
    pub fn power_field(&self, key: &str) -> Option<String> {
        self.power.get(key).map(value_to_string)
    }

    /// MAC addresses normalised to lower case
    pub fn macs(&self) -> impl Iterator<Item = String> + '_ {
        self.mac.iter().map(|m| m.to_lowercase())
    }

    /// Short rendering used in error messages and logs; never includes secrets
    pub fn summary(&self) -> String {
        let address = self
            .power_field("pm_addr")
            .unwrap_or_else(|| "<no pm_addr>".to_string());
        format!(
            "pm_type={} pm_addr={} mac=[{}]",
            self.pm_type,
            address,
            self.mac.join(", ")
        )
    }

    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.mac.is_empty() {
            return Err(Error::InvalidNode {
                reason: "at least one MAC address is required".into(),
                node: Some(self.summary()),
            });
        }
        if self.pm_type.trim().is_empty() {
            return Err(Error::InvalidNode {
                reason: "pm_type is required".into(),
                node: Some(self.summary()),
            });
        }
        Ok(())
    }

    /// Hardware facts as backend properties, values stringified
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        properties.insert("cpus".to_string(), self.cpu.to_string());
        properties.insert("memory_mb".to_string(), self.memory.to_string());
        properties.insert("local_gb".to_string(), self.disk.to_string());
        properties.insert("cpu_arch".to_string(), self.arch.clone());
        if let Some(capabilities) = &self.capabilities {
            properties.insert("capabilities".to_string(), capabilities.render());
        }
        properties
    }
}

/// Parse a JSON array of node descriptors, validating each one
pub fn parse_nodes(json: &str) -> Result<Vec<NodeDescriptor>> {
    let nodes: Vec<NodeDescriptor> = serde_json::from_str(json)?;
    for node in &nodes {
        node.validate()?;
    }
    Ok(nodes)
}

/// Load node descriptors from a JSON file
pub fn load_nodes(path: &Path) -> Result<Vec<NodeDescriptor>> {
    let content = std::fs::read_to_string(path)?;
    parse_nodes(&content)
}
