//! Node reconciliation against the provisioning backend
//!
//! One pass per invocation: discover what the backend holds, register or
//! update every desired node in order, then report or delete the backend
//! nodes nobody asked for.

use crate::domain::ports::{
    BackendNode, NodeCreateRequest, PatchOperation, PowerState, ProvisioningBackend,
};
use crate::error::{Error, Result};
use crate::nodes::descriptor::{value_to_string, NodeDescriptor};
use crate::nodes::drivers::{find_driver_handler, DriverFamily};
use crate::nodes::index::NodeIndex;
use crate::retry::{retry, RetryPolicy, REGISTER_RETRY, UPDATE_RETRY};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

// =============================================================================
// Options and Results
// =============================================================================

/// Knobs for a registration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Delete backend nodes that are not in the desired list
    pub remove: bool,
    /// Retry policy for node creation while the backend is unavailable
    pub create_retry: RetryPolicy,
    /// Retry policy for node updates while the node is locked
    pub update_retry: RetryPolicy,
    /// Validate power credentials after each create or update
    pub validate: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            remove: false,
            create_retry: REGISTER_RETRY,
            update_retry: UPDATE_RETRY,
            validate: true,
        }
    }
}

/// What happened to one desired node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Registered(String),
    Updated(String),
}

impl NodeOutcome {
    pub fn id(&self) -> &str {
        match self {
            NodeOutcome::Registered(id) | NodeOutcome::Updated(id) => id,
        }
    }
}

/// Backend node ids touched by a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationSummary {
    pub registered: Vec<String>,
    pub updated: Vec<String>,
    /// Extra nodes that were deleted
    pub removed: Vec<String>,
    /// Extra nodes left in place
    pub extra: Vec<String>,
}

// =============================================================================
// Request Building
// =============================================================================

/// Drivers that boot a deploy kernel and ramdisk over the network
pub fn accepts_deploy_images(pm_type: &str) -> bool {
    pm_type.contains("pxe")
}

/// Fill deploy image ids into descriptors that do not name their own
pub fn populate_deploy_images(
    nodes: &mut [NodeDescriptor],
    kernel_id: Option<&str>,
    ramdisk_id: Option<&str>,
) {
    for node in nodes {
        if node.kernel_id.is_none() {
            node.kernel_id = kernel_id.map(str::to_string);
        }
        if node.ramdisk_id.is_none() {
            node.ramdisk_id = ramdisk_id.map(str::to_string);
        }
    }
}

fn deploy_images(node: &NodeDescriptor) -> Vec<(&'static str, &str)> {
    if !accepts_deploy_images(&node.pm_type) {
        return Vec::new();
    }
    let mut images = Vec::new();
    if let Some(kernel) = &node.kernel_id {
        images.push(("deploy_kernel", kernel.as_str()));
    }
    if let Some(ramdisk) = &node.ramdisk_id {
        images.push(("deploy_ramdisk", ramdisk.as_str()));
    }
    images
}

fn translate(node: &NodeDescriptor, family: DriverFamily) -> BTreeMap<String, Value> {
    let conversion = family.convert(node);
    for warning in &conversion.warnings {
        warn!(node = %node.summary(), "{}", warning);
    }
    conversion.driver_info
}

/// Creation request for a node the backend does not know yet
pub fn create_request(node: &NodeDescriptor, family: DriverFamily) -> NodeCreateRequest {
    let mut driver_info = translate(node, family);
    for (key, id) in deploy_images(node) {
        driver_info.insert(key.to_string(), Value::String(id.to_string()));
    }

    NodeCreateRequest {
        driver: node.pm_type.clone(),
        name: node.name.clone(),
        driver_info,
        properties: node.properties(),
    }
}

/// Replace operations bringing an existing node in line with its descriptor
pub fn update_patch(node: &NodeDescriptor, family: DriverFamily) -> Vec<PatchOperation> {
    let mut values: BTreeMap<String, String> = BTreeMap::new();

    for (key, value) in node.properties() {
        values.insert(format!("/properties/{key}"), value);
    }
    for (key, value) in translate(node, family) {
        values.insert(format!("/driver_info/{key}"), value_to_string(&value));
    }
    for (key, id) in deploy_images(node) {
        values.insert(format!("/driver_info/{key}"), id.to_string());
    }
    if let Some(name) = &node.name {
        values.insert("/name".to_string(), name.clone());
    }

    values
        .into_iter()
        .map(|(path, value)| PatchOperation::replace(path, value))
        .collect()
}

// =============================================================================
// Register / Update
// =============================================================================

async fn validate_power(backend: &dyn ProvisioningBackend, node: &NodeDescriptor, uuid: &str) {
    match backend.validate_node(uuid).await {
        Ok(validation) if validation.power_ok() => {
            debug!(node = %uuid, "Power credentials validated");
        }
        Ok(validation) => warn!(
            node = %uuid,
            descriptor = %node.summary(),
            reason = validation.power.reason.as_deref().unwrap_or("unknown"),
            "Power credentials failed validation"
        ),
        Err(e) => warn!(node = %uuid, error = %e, "Could not validate node"),
    }
}

/// Register a new node: create it, attach its ports and power it off
pub async fn register_ironic_node(
    backend: &dyn ProvisioningBackend,
    node: &NodeDescriptor,
    options: &RegisterOptions,
) -> Result<BackendNode> {
    let family = find_driver_handler(&node.pm_type)?;
    let request = create_request(node, family);
    let operation = format!("register node {}", node.summary());

    let created = retry(
        &options.create_retry,
        &operation,
        Error::is_transient,
        |attempt| {
            debug!(node = %node.summary(), attempt, "Registering node");
            backend.create_node(&request)
        },
    )
    .await
    .map_err(|e| {
        if e.is_transient() {
            Error::ServiceUnavailable {
                operation: operation.clone(),
                attempts: options.create_retry.max_attempts,
            }
        } else {
            e
        }
    })?;

    for mac in &node.mac {
        backend.create_port(&created.uuid, mac).await?;
    }

    match backend.set_power_state(&created.uuid, PowerState::Off).await {
        Ok(()) => {}
        Err(e) if e.is_conflict() => {
            debug!(node = %created.uuid, error = %e, "Power off already in progress");
        }
        Err(e) => return Err(e),
    }

    if options.validate {
        validate_power(backend, node, &created.uuid).await;
    }

    info!(node = %created.uuid, descriptor = %node.summary(), "Registered node");
    Ok(created)
}

/// Patch an existing node to match its descriptor
pub async fn update_node(
    backend: &dyn ProvisioningBackend,
    node_uuid: &str,
    node: &NodeDescriptor,
    options: &RegisterOptions,
) -> Result<BackendNode> {
    let family = find_driver_handler(&node.pm_type)?;
    let patch = update_patch(node, family);
    let operation = format!("update node {node_uuid}");

    let updated = retry(&options.update_retry, &operation, Error::is_conflict, |_| {
        backend.update_node(node_uuid, &patch)
    })
    .await?;

    if options.validate {
        validate_power(backend, node, node_uuid).await;
    }

    info!(node = %node_uuid, descriptor = %node.summary(), "Updated node");
    Ok(updated)
}

/// Register the node, or update it when the index already knows it
pub async fn update_or_register(
    backend: &dyn ProvisioningBackend,
    index: &NodeIndex,
    node: &NodeDescriptor,
    options: &RegisterOptions,
) -> Result<NodeOutcome> {
    node.validate()?;
    let family = find_driver_handler(&node.pm_type).map_err(|e| match e {
        Error::InvalidNode { reason, .. } => Error::InvalidNode {
            reason,
            node: Some(node.summary()),
        },
        other => other,
    })?;

    match index.resolve(node, family)? {
        Some(uuid) => {
            update_node(backend, &uuid, node, options).await?;
            Ok(NodeOutcome::Updated(uuid))
        }
        None => {
            let created = register_ironic_node(backend, node, options).await?;
            Ok(NodeOutcome::Registered(created.uuid))
        }
    }
}

// =============================================================================
// Cleanup
// =============================================================================

/// Deal with backend nodes outside `seen`: delete them when `remove` is set,
/// otherwise only report them.
///
/// Returns `(removed, extra)`.
pub async fn clean_up_extra_nodes(
    backend: &dyn ProvisioningBackend,
    seen: &BTreeSet<String>,
    remove: bool,
) -> Result<(Vec<String>, Vec<String>)> {
    let all: BTreeSet<String> = backend
        .list_nodes()
        .await?
        .into_iter()
        .map(|n| n.uuid)
        .collect();
    let extras: Vec<String> = all.difference(seen).cloned().collect();

    if !remove {
        for uuid in &extras {
            info!(node = %uuid, "Extra node not in the desired list, leaving in place");
        }
        return Ok((Vec::new(), extras));
    }

    for uuid in &extras {
        debug!(node = %uuid, "Removing extra node");
        backend.delete_node(uuid).await?;
    }
    Ok((extras, Vec::new()))
}

/// Converge the backend onto `nodes`
pub async fn register_all_nodes(
    backend: &dyn ProvisioningBackend,
    nodes: &[NodeDescriptor],
    options: &RegisterOptions,
) -> Result<RegistrationSummary> {
    info!(nodes = nodes.len(), "Registering all nodes");
    let index = NodeIndex::discover(backend).await?;

    let mut summary = RegistrationSummary::default();
    let mut seen = BTreeSet::new();

    for node in nodes {
        let outcome = update_or_register(backend, &index, node, options).await?;
        seen.insert(outcome.id().to_string());
        match outcome {
            NodeOutcome::Registered(id) => summary.registered.push(id),
            NodeOutcome::Updated(id) => summary.updated.push(id),
        }
    }

    let (removed, extra) = clean_up_extra_nodes(backend, &seen, options.remove).await?;
    summary.removed = removed;
    summary.extra = extra;

    info!(
        registered = summary.registered.len(),
        updated = summary.updated.len(),
        removed = summary.removed.len(),
        extra = summary.extra.len(),
        "Node registration complete"
    );
    Ok(summary)
}
