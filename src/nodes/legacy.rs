//! Deprecated Nova baremetal registration
//!
//! Used only when the identity service has no `ironic` service registered.
//! Nodes are created, never updated or cleaned up.

use crate::domain::ports::{LegacyBaremetal, LegacyNode, LegacyNodeRequest};
use crate::error::{Error, Result};
use crate::nodes::descriptor::NodeDescriptor;
use crate::retry::{retry, RetryPolicy};
use tracing::{debug, info};

/// Longest power password the legacy service accepts
pub const MAX_PM_PASSWORD_LEN: usize = 255;

fn legacy_request(service_host: &str, node: &NodeDescriptor) -> Result<LegacyNodeRequest> {
    let required = |key: &str| {
        node.power_field(key).ok_or_else(|| Error::InvalidNode {
            reason: format!("{key} is required for nova-baremetal"),
            node: Some(node.summary()),
        })
    };
    let prov_mac_address = node
        .mac
        .first()
        .cloned()
        .ok_or_else(|| Error::invalid_node("at least one MAC address is required"))?;

    let pm_password = node.power_field("pm_password").filter(|password| {
        if password.len() <= MAX_PM_PASSWORD_LEN {
            true
        } else {
            info!("Ignoring pm_password for nova-bm, it is longer than 255 characters");
            false
        }
    });

    Ok(LegacyNodeRequest {
        service_host: service_host.to_string(),
        cpus: node.cpu,
        memory_mb: node.memory,
        local_gb: node.disk,
        prov_mac_address,
        pm_address: required("pm_addr")?,
        pm_user: required("pm_user")?,
        pm_password,
    })
}

/// Register one node with Nova baremetal
pub async fn register_nova_bm_node(
    client: &dyn LegacyBaremetal,
    service_host: Option<&str>,
    node: &NodeDescriptor,
    policy: &RetryPolicy,
) -> Result<LegacyNode> {
    let service_host = service_host
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::Configuration("Nova-baremetal requires a service host.".into()))?;
    let request = legacy_request(service_host, node)?;
    let operation = format!("register nova-bm node {}", request.pm_address);

    let created = retry(policy, &operation, Error::is_transient, |attempt| {
        debug!(node = %request.pm_address, attempt, "Registering node with nova-baremetal");
        client.create_node(&request)
    })
    .await
    .map_err(|e| {
        if e.is_transient() {
            Error::ServiceUnavailable {
                operation: operation.clone(),
                attempts: policy.max_attempts,
            }
        } else {
            e
        }
    })?;

    for mac in node.mac.iter().skip(1) {
        client.add_interface(&created.id, mac).await?;
    }

    info!(node = %created.id, descriptor = %node.summary(), "Registered nova-bm node");
    Ok(created)
}

/// Register every node with Nova baremetal, in order
pub async fn register_all_nova_bm_nodes(
    client: &dyn LegacyBaremetal,
    service_host: Option<&str>,
    nodes: &[NodeDescriptor],
    policy: &RetryPolicy,
) -> Result<Vec<String>> {
    let mut registered = Vec::with_capacity(nodes.len());
    for node in nodes {
        node.validate()?;
        registered.push(register_nova_bm_node(client, service_host, node, policy).await?.id);
    }
    Ok(registered)
}
