//! Compute flavors for bare-metal hardware
//!
//! Flavors are derived from the distinct hardware shapes of the registered
//! nodes, or taken verbatim from a list, and tagged with the deploy kernel and
//! ramdisk the bare-metal driver boots.

use crate::domain::ports::{Flavor, FlavorRequest, FlavorService, ProvisioningBackend};
use crate::error::{Error, Result};
use crate::nodes::descriptor::{integer_or_string, value_to_string, NodeDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Flavors shipped by a stock compute install, removed before bare-metal ones
/// are created
pub const STOCK_FLAVORS: &[&str] = &["m1.tiny", "m1.small", "m1.medium", "m1.large", "m1.xlarge"];

const DEPLOY_KEY_PREFIX: &str = "baremetal:deploy";

/// One flavor to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorSpec {
    pub name: String,
    /// Memory in MB
    #[serde(deserialize_with = "integer_or_string")]
    pub memory: u64,
    /// Root disk in GB
    #[serde(deserialize_with = "integer_or_string")]
    pub disk: u64,
    #[serde(deserialize_with = "integer_or_string")]
    pub cpu: u64,
    pub arch: String,
    /// Ephemeral disk in GB
    #[serde(default, deserialize_with = "integer_or_string")]
    pub ephemeral: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_specs: BTreeMap<String, String>,
}

impl FlavorSpec {
    fn request(&self) -> FlavorRequest {
        FlavorRequest {
            name: self.name.clone(),
            ram: self.memory,
            vcpus: self.cpu,
            disk: self.disk,
            ephemeral: self.ephemeral,
        }
    }

    fn keys(&self, kernel_id: &str, ramdisk_id: &str) -> BTreeMap<String, String> {
        let mut keys = BTreeMap::new();
        keys.insert("cpu_arch".to_string(), self.arch.clone());
        keys.insert(format!("{DEPLOY_KEY_PREFIX}_kernel_id"), kernel_id.to_string());
        keys.insert(format!("{DEPLOY_KEY_PREFIX}_ramdisk_id"), ramdisk_id.to_string());
        keys.extend(self.extra_specs.clone());
        keys
    }
}

/// Parse a JSON list of flavors
pub fn parse_flavors(json: &str) -> Result<Vec<FlavorSpec>> {
    Ok(serde_json::from_str(json)?)
}

/// Hardware shape of one node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Hardware {
    memory: u64,
    disk: u64,
    cpu: u64,
    arch: String,
}

/// Distinct flavors for a set of hardware shapes; with `root_disk` the node
/// disk is split into a root disk and an ephemeral remainder
fn flavors_for_hardware(
    hardware: impl IntoIterator<Item = Hardware>,
    root_disk: Option<u64>,
) -> Result<Vec<FlavorSpec>> {
    let mut shapes = BTreeSet::new();

    for hw in hardware {
        let (disk, ephemeral) = match root_disk {
            Some(root) => {
                let ephemeral = hw.disk.checked_sub(root).ok_or_else(|| {
                    Error::Configuration(format!(
                        "root disk of {root} GB is larger than a node disk of {} GB",
                        hw.disk
                    ))
                })?;
                (root, ephemeral)
            }
            None => (hw.disk, 0),
        };
        shapes.insert((hw.memory, disk, hw.cpu, hw.arch, ephemeral));
    }

    Ok(shapes
        .into_iter()
        .map(|(memory, disk, cpu, arch, ephemeral)| FlavorSpec {
            name: format!("baremetal_{memory}_{disk}_{ephemeral}_{cpu}"),
            memory,
            disk,
            cpu,
            arch,
            ephemeral,
            extra_specs: BTreeMap::new(),
        })
        .collect())
}

/// Delete the stock flavors
pub async fn cleanup_flavors(client: &dyn FlavorService) -> Result<()> {
    debug!("Cleaning up non-baremetal flavors");
    for flavor in client.list_flavors().await? {
        if STOCK_FLAVORS.contains(&flavor.name.as_str()) {
            debug!(flavor = %flavor.name, "Deleting stock flavor");
            client.delete_flavor(&flavor.id).await?;
        }
    }
    Ok(())
}

/// Create one flavor per distinct hardware shape in `nodes`
pub async fn create_flavors_from_nodes(
    client: &dyn FlavorService,
    nodes: &[NodeDescriptor],
    kernel_id: &str,
    ramdisk_id: &str,
    root_disk: Option<u64>,
) -> Result<Vec<Flavor>> {
    debug!("Populating flavors to create from node list");
    let hardware = nodes.iter().map(|n| Hardware {
        memory: n.memory,
        disk: n.disk,
        cpu: n.cpu,
        arch: n.arch.clone(),
    });
    let flavors = flavors_for_hardware(hardware, root_disk)?;
    create_flavors_from_list(client, &flavors, kernel_id, ramdisk_id).await
}

fn property(node: &crate::domain::ports::BackendNode, key: &str) -> Option<String> {
    node.properties
        .get(key)
        .filter(|v| !v.is_null())
        .map(value_to_string)
        .filter(|v| !v.is_empty())
}

/// Create one flavor per distinct hardware shape registered with the
/// provisioning backend, skipping nodes with incomplete properties
pub async fn create_flavors_from_backend(
    client: &dyn FlavorService,
    backend: &dyn ProvisioningBackend,
    kernel_id: &str,
    ramdisk_id: &str,
    root_disk: Option<u64>,
) -> Result<Vec<Flavor>> {
    let mut hardware = Vec::new();

    'nodes: for node in backend.list_nodes().await? {
        let mut numbers = [0u64; 3];
        for (slot, key) in numbers.iter_mut().zip(["memory_mb", "local_gb", "cpus"]) {
            match property(&node, key).and_then(|v| v.parse().ok()) {
                Some(n) => *slot = n,
                None => {
                    warn!(node = %node.uuid, property = key, "Node property not set, not creating flavor from node");
                    continue 'nodes;
                }
            }
        }
        let Some(arch) = property(&node, "cpu_arch") else {
            warn!(node = %node.uuid, property = "cpu_arch", "Node property not set, not creating flavor from node");
            continue;
        };
        let [memory, disk, cpu] = numbers;
        hardware.push(Hardware {
            memory,
            disk,
            cpu,
            arch,
        });
    }

    let flavors = flavors_for_hardware(hardware, root_disk)?;
    create_flavors_from_list(client, &flavors, kernel_id, ramdisk_id).await
}

/// Drop the flavors whose name already exists
pub async fn filter_existing_flavors(
    client: &dyn FlavorService,
    flavors: &[FlavorSpec],
) -> Result<Vec<FlavorSpec>> {
    let existing: BTreeSet<String> = client
        .list_flavors()
        .await?
        .into_iter()
        .map(|f| f.name)
        .collect();
    Ok(flavors
        .iter()
        .filter(|f| !existing.contains(&f.name))
        .cloned()
        .collect())
}

/// Create the flavors that do not exist yet and tag them with the deploy images
pub async fn create_flavors_from_list(
    client: &dyn FlavorService,
    flavors: &[FlavorSpec],
    kernel_id: &str,
    ramdisk_id: &str,
) -> Result<Vec<Flavor>> {
    debug!("Creating flavors from flavors list");
    let mut created = Vec::new();

    for spec in filter_existing_flavors(client, flavors).await? {
        info!(
            flavor = %spec.name,
            memory = spec.memory,
            disk = spec.disk,
            cpu = spec.cpu,
            arch = %spec.arch,
            "Creating flavor"
        );
        let flavor = client.create_flavor(&spec.request()).await?;
        client
            .set_flavor_keys(&flavor.id, &spec.keys(kernel_id, ramdisk_id))
            .await?;
        created.push(flavor);
    }

    Ok(created)
}
