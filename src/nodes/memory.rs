//! In-memory provisioning backend for tests
//!
//! Records every call so tests can count creates, updates, port creations,
//! power transitions and deletes, and injects transient failures and lock
//! conflicts on demand.

use crate::domain::ports::{
    BackendNode, BackendPort, NodeCreateRequest, NodeValidation, PatchOperation, PowerState,
    ProvisioningBackend,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Every mutating call the backend received, in order
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub creates: Vec<NodeCreateRequest>,
    pub create_attempts: u32,
    pub updates: Vec<(String, Vec<PatchOperation>)>,
    pub update_attempts: u32,
    pub ports: Vec<(String, String)>,
    pub power: Vec<(String, PowerState)>,
    pub deletes: Vec<String>,
    pub validations: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, BackendNode>,
    ports: Vec<BackendPort>,
    next_id: u64,
    calls: CallLog,
    unavailable_creates: u32,
    conflicting_updates: u32,
    power_conflict: bool,
    validation: NodeValidation,
}

impl State {
    fn next_uuid(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}-{:04}", self.next_id)
    }
}

/// Provisioning backend holding its nodes in memory
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing node without recording a call
    pub fn seed_node(
        &self,
        driver: &str,
        driver_info: BTreeMap<String, Value>,
        macs: &[&str],
    ) -> String {
        let mut state = self.state.lock();
        let uuid = state.next_uuid("node");
        state.nodes.insert(
            uuid.clone(),
            BackendNode {
                uuid: uuid.clone(),
                driver: driver.to_string(),
                name: None,
                driver_info,
                properties: BTreeMap::new(),
            },
        );
        for mac in macs {
            let port_uuid = state.next_uuid("port");
            state.ports.push(BackendPort {
                uuid: port_uuid,
                address: (*mac).to_string(),
                node_uuid: uuid.clone(),
            });
        }
        uuid
    }

    /// Fail the next `count` create calls with a 503
    pub fn fail_creates(&self, count: u32) {
        self.state.lock().unavailable_creates = count;
    }

    /// Fail the next `count` update calls with a lock conflict
    pub fn conflict_updates(&self, count: u32) {
        self.state.lock().conflicting_updates = count;
    }

    /// Every power call reports a conflict
    pub fn conflict_power(&self) {
        self.state.lock().power_conflict = true;
    }

    /// Validation result reported for every node
    pub fn set_validation(&self, validation: NodeValidation) {
        self.state.lock().validation = validation;
    }

    pub fn calls(&self) -> CallLog {
        self.state.lock().calls.clone()
    }

    pub fn node_ids(&self) -> BTreeSet<String> {
        self.state.lock().nodes.keys().cloned().collect()
    }

    pub fn node(&self, uuid: &str) -> Option<BackendNode> {
        self.state.lock().nodes.get(uuid).cloned()
    }
}

fn missing(uuid: &str) -> Error {
    Error::NotFound {
        kind: "node".into(),
        name: uuid.into(),
    }
}

#[async_trait]
impl ProvisioningBackend for InMemoryBackend {
    async fn list_nodes(&self) -> Result<Vec<BackendNode>> {
        Ok(self.state.lock().nodes.values().cloned().collect())
    }

    async fn list_ports(&self, node_uuid: &str) -> Result<Vec<BackendPort>> {
        let state = self.state.lock();
        Ok(state
            .ports
            .iter()
            .filter(|p| p.node_uuid == node_uuid)
            .cloned()
            .collect())
    }

    async fn create_node(&self, request: &NodeCreateRequest) -> Result<BackendNode> {
        let mut state = self.state.lock();
        state.calls.create_attempts += 1;

        if state.unavailable_creates > 0 {
            state.unavailable_creates -= 1;
            return Err(Error::TemporarilyUnavailable {
                service: "ironic".into(),
                reason: "503 Service Unavailable".into(),
            });
        }

        state.calls.creates.push(request.clone());
        let uuid = state.next_uuid("node");
        let node = BackendNode {
            uuid: uuid.clone(),
            driver: request.driver.clone(),
            name: request.name.clone(),
            driver_info: request.driver_info.clone(),
            properties: request
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        };
        state.nodes.insert(uuid, node.clone());
        Ok(node)
    }

    async fn update_node(&self, node_uuid: &str, patch: &[PatchOperation]) -> Result<BackendNode> {
        let mut state = self.state.lock();
        state.calls.update_attempts += 1;

        if state.conflicting_updates > 0 {
            state.conflicting_updates -= 1;
            return Err(Error::Conflict {
                service: "ironic".into(),
                reason: format!("Node {node_uuid} is locked by host conductor-1"),
            });
        }

        state
            .calls
            .updates
            .push((node_uuid.to_string(), patch.to_vec()));
        let node = state
            .nodes
            .get_mut(node_uuid)
            .ok_or_else(|| missing(node_uuid))?;

        for op in patch {
            let value = Value::String(op.value.clone());
            if op.path == "/name" {
                node.name = Some(op.value.clone());
            } else if let Some(key) = op.path.strip_prefix("/properties/") {
                node.properties.insert(key.to_string(), value);
            } else if let Some(key) = op.path.strip_prefix("/driver_info/") {
                node.driver_info.insert(key.to_string(), value);
            }
        }
        Ok(node.clone())
    }

    async fn delete_node(&self, node_uuid: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.deletes.push(node_uuid.to_string());
        state.nodes.remove(node_uuid).ok_or_else(|| missing(node_uuid))?;
        state.ports.retain(|p| p.node_uuid != node_uuid);
        Ok(())
    }

    async fn create_port(&self, node_uuid: &str, address: &str) -> Result<BackendPort> {
        let mut state = self.state.lock();
        state
            .calls
            .ports
            .push((node_uuid.to_string(), address.to_string()));
        let port = BackendPort {
            uuid: state.next_uuid("port"),
            address: address.to_string(),
            node_uuid: node_uuid.to_string(),
        };
        state.ports.push(port.clone());
        Ok(port)
    }

    async fn set_power_state(&self, node_uuid: &str, target: PowerState) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.power.push((node_uuid.to_string(), target));
        if state.power_conflict {
            return Err(Error::Conflict {
                service: "ironic".into(),
                reason: format!("Node {node_uuid} is already being powered off"),
            });
        }
        Ok(())
    }

    async fn validate_node(&self, node_uuid: &str) -> Result<NodeValidation> {
        let mut state = self.state.lock();
        state.calls.validations.push(node_uuid.to_string());
        Ok(state.validation.clone())
    }
}
