//! Domain Ports - Core trait definitions for the bootstrap toolkit
//!
//! These traits define the boundaries between the bootstrap logic and the
//! OpenStack services it drives. The `openstack` module provides HTTP adapters;
//! tests provide in-memory ones.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// Provisioning Backend Types
// =============================================================================

/// A node record as stored by the provisioning backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendNode {
    /// Backend-assigned identifier
    pub uuid: String,
    /// Driver the node is registered with
    pub driver: String,
    /// Optional human-readable name
    #[serde(default)]
    pub name: Option<String>,
    /// Driver-specific credentials and settings
    #[serde(default)]
    pub driver_info: BTreeMap<String, Value>,
    /// Hardware properties (cpus, memory_mb, local_gb, cpu_arch, capabilities)
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

/// A network port attached to a backend node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendPort {
    pub uuid: String,
    pub address: String,
    pub node_uuid: String,
}

/// Request body for registering a new node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCreateRequest {
    pub driver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub driver_info: BTreeMap<String, Value>,
    pub properties: BTreeMap<String, String>,
}

/// JSON-patch operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// One JSON-patch operation against a node record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: String,
}

impl PatchOperation {
    pub fn replace(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: value.into(),
        }
    }
}

/// Target power state for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    Off,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::Off => write!(f, "power off"),
        }
    }
}

/// Result of validating a single interface of a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceValidation {
    /// `None` when the interface is not supported by the driver
    #[serde(default)]
    pub result: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Result of validating a node's driver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeValidation {
    #[serde(default)]
    pub power: InterfaceValidation,
}

impl NodeValidation {
    /// Power credentials are considered valid unless explicitly rejected
    pub fn power_ok(&self) -> bool {
        self.power.result != Some(false)
    }
}

/// Port for the bare-metal provisioning service (Ironic)
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// List every node with details
    async fn list_nodes(&self) -> Result<Vec<BackendNode>>;

    /// List the ports attached to a node
    async fn list_ports(&self, node_uuid: &str) -> Result<Vec<BackendPort>>;

    /// Register a new node
    async fn create_node(&self, request: &NodeCreateRequest) -> Result<BackendNode>;

    /// Apply a patch to an existing node
    async fn update_node(&self, node_uuid: &str, patch: &[PatchOperation]) -> Result<BackendNode>;

    /// Delete a node
    async fn delete_node(&self, node_uuid: &str) -> Result<()>;

    /// Attach a port with the given MAC address to a node
    async fn create_port(&self, node_uuid: &str, address: &str) -> Result<BackendPort>;

    /// Request a power state transition
    async fn set_power_state(&self, node_uuid: &str, state: PowerState) -> Result<()>;

    /// Validate the node's driver interfaces
    async fn validate_node(&self, _node_uuid: &str) -> Result<NodeValidation> {
        Ok(NodeValidation::default())
    }
}

// =============================================================================
// Legacy Nova Baremetal Types
// =============================================================================

/// Request for the deprecated Nova baremetal extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyNodeRequest {
    pub service_host: String,
    pub cpus: u64,
    pub memory_mb: u64,
    pub local_gb: u64,
    pub prov_mac_address: String,
    pub pm_address: String,
    pub pm_user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pm_password: Option<String>,
}

/// Node record returned by the Nova baremetal extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyNode {
    pub id: String,
}

/// Port for the deprecated Nova baremetal extension
#[async_trait]
pub trait LegacyBaremetal: Send + Sync {
    async fn create_node(&self, request: &LegacyNodeRequest) -> Result<LegacyNode>;

    async fn add_interface(&self, node_id: &str, address: &str) -> Result<()>;
}

// =============================================================================
// Service Directory
// =============================================================================

/// Knowledge of which services are registered with the identity service
pub trait ServiceDirectory {
    fn has_service(&self, name: &str) -> bool;
}

// =============================================================================
// Image Types
// =============================================================================

/// Disk formats used for deploy images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    /// Amazon kernel image
    Aki,
    /// Amazon ramdisk image
    Ari,
}

impl std::fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskFormat::Aki => write!(f, "aki"),
            DiskFormat::Ari => write!(f, "ari"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
}

/// Port for the image service (Glance)
#[async_trait]
pub trait ImageCatalog: Send + Sync {
    async fn find_image(&self, name: &str, disk_format: DiskFormat) -> Result<Option<Image>>;

    async fn create_image(&self, name: &str, disk_format: DiskFormat, data: Vec<u8>) -> Result<Image>;
}

// =============================================================================
// Flavor Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
}

/// Request to create a compute flavor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorRequest {
    pub name: String,
    pub ram: u64,
    pub vcpus: u64,
    pub disk: u64,
    #[serde(rename = "OS-FLV-EXT-DATA:ephemeral")]
    pub ephemeral: u64,
}

/// Port for the compute service's flavor API (Nova)
#[async_trait]
pub trait FlavorService: Send + Sync {
    async fn list_flavors(&self) -> Result<Vec<Flavor>>;

    async fn create_flavor(&self, request: &FlavorRequest) -> Result<Flavor>;

    async fn set_flavor_keys(&self, flavor_id: &str, keys: &BTreeMap<String, String>) -> Result<()>;

    async fn delete_flavor(&self, flavor_id: &str) -> Result<()>;
}

// =============================================================================
// Identity Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "tenantId", skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEndpoint {
    pub region: String,
    pub service_id: String,
    #[serde(rename = "publicurl")]
    pub public_url: String,
    #[serde(rename = "adminurl")]
    pub admin_url: String,
    #[serde(rename = "internalurl")]
    pub internal_url: String,
}

/// Port for the identity service admin API (Keystone v2)
#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    async fn find_role(&self, name: &str) -> Result<Option<Role>>;

    async fn create_role(&self, name: &str) -> Result<Role>;

    async fn find_tenant(&self, name: &str) -> Result<Option<Tenant>>;

    async fn create_tenant(&self, name: &str) -> Result<Tenant>;

    async fn find_user(&self, name: &str) -> Result<Option<User>>;

    async fn create_user(&self, user: &NewUser) -> Result<User>;

    async fn add_user_role(&self, user_id: &str, role_id: &str, tenant_id: &str) -> Result<()>;

    async fn find_services_by_type(&self, service_type: &str) -> Result<Vec<Service>>;

    async fn create_service(&self, name: &str, service_type: &str, description: &str) -> Result<Service>;

    async fn endpoint_exists(&self, public_url: &str) -> Result<bool>;

    async fn create_endpoint(&self, endpoint: &NewEndpoint) -> Result<()>;
}

// =============================================================================
// Network Types
// =============================================================================

/// Request to create a network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRequest {
    pub name: String,
    pub admin_state_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(rename = "router:external", skip_serializing_if = "Option::is_none")]
    pub router_external: Option<bool>,
    #[serde(rename = "provider:network_type", skip_serializing_if = "Option::is_none")]
    pub provider_network_type: Option<String>,
    #[serde(rename = "provider:physical_network", skip_serializing_if = "Option::is_none")]
    pub provider_physical_network: Option<String>,
    #[serde(rename = "provider:segmentation_id", skip_serializing_if = "Option::is_none")]
    pub provider_segmentation_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRoute {
    pub destination: String,
    pub nexthop: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPool {
    pub start: String,
    pub end: String,
}

/// Request to create a subnet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRequest {
    pub network_id: String,
    pub ip_version: u8,
    pub cidr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_dhcp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dns_nameservers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub host_routes: Vec<HostRoute>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub allocation_pools: Vec<AllocationPool>,
}

/// Port for the networking service (Neutron)
#[async_trait]
pub trait NetworkService: Send + Sync {
    /// Create a network, returning its id
    async fn create_network(&self, request: &NetworkRequest) -> Result<String>;

    /// Create a subnet, returning its id
    async fn create_subnet(&self, request: &SubnetRequest) -> Result<String>;

    /// Create a router, returning its id
    async fn create_router(&self, name: &str) -> Result<String>;

    async fn add_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()>;

    async fn add_router_gateway(&self, router_id: &str, network_id: &str) -> Result<()>;
}
