//! Initial Neutron networks
//!
//! Creates the internal network (a flat provider network on the admin tenant
//! for `physical`, a shared tenant network for `float`) and, when described,
//! an external network routed through `default-router`.

use crate::domain::ports::{
    AllocationPool, HostRoute, IdentityAdmin, NetworkRequest, NetworkService, SubnetRequest,
};
use crate::error::{Error, Result};
use crate::keystone::ADMIN_TENANT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const METADATA_ROUTE: &str = "169.254.169.254/32";
const DEFAULT_NAMESERVER: &str = "8.8.8.8";
const VLAN_PHYSICAL_NETWORK: &str = "datacentre";
const ROUTER_NAME: &str = "default-router";

/// One network in the description file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameserver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation_id: Option<u32>,
}

/// Networks to create; one of `physical` or `float` is required
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical: Option<NetworkSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub float: Option<NetworkSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<NetworkSpec>,
}

impl NetworkDescription {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Physical,
    Float,
    External,
}

impl std::fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkKind::Physical => write!(f, "physical"),
            NetworkKind::Float => write!(f, "float"),
            NetworkKind::External => write!(f, "external"),
        }
    }
}

/// Ids of everything `initialize_neutron` created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeutronSetup {
    pub network_id: String,
    pub subnet_id: String,
    pub router_id: Option<String>,
    pub external_network_id: Option<String>,
}

/// Network creation request for one description entry
pub fn network_request(kind: NetworkKind, spec: &NetworkSpec, admin_tenant: Option<&str>) -> NetworkRequest {
    let mut request = NetworkRequest {
        name: spec.name.clone(),
        admin_state_up: true,
        ..Default::default()
    };

    match kind {
        NetworkKind::Physical => {
            request.tenant_id = admin_tenant.map(str::to_string);
            request.provider_network_type = Some("flat".into());
            request.provider_physical_network = Some(spec.name.clone());
        }
        NetworkKind::Float => request.shared = Some(true),
        NetworkKind::External => request.router_external = Some(true),
    }

    if let Some(vlan) = spec.segmentation_id {
        request.provider_network_type = Some("vlan".into());
        request.provider_segmentation_id = Some(vlan);
        request.provider_physical_network = Some(VLAN_PHYSICAL_NETWORK.into());
    }
    request
}

/// Subnet creation request for one description entry
pub fn subnet_request(
    kind: NetworkKind,
    spec: &NetworkSpec,
    network_id: &str,
    admin_tenant: Option<&str>,
) -> SubnetRequest {
    let mut request = SubnetRequest {
        network_id: network_id.to_string(),
        ip_version: 4,
        cidr: spec.cidr.clone(),
        gateway_ip: spec.gateway.clone(),
        ..Default::default()
    };

    match kind {
        NetworkKind::Physical => {
            request.tenant_id = admin_tenant.map(str::to_string);
            if let Some(metadata) = &spec.metadata_server {
                request.host_routes = vec![HostRoute {
                    destination: METADATA_ROUTE.into(),
                    nexthop: metadata.clone(),
                }];
            }
        }
        NetworkKind::External => request.enable_dhcp = Some(false),
        NetworkKind::Float => {}
    }

    match &spec.nameserver {
        Some(nameserver) => request.dns_nameservers = vec![nameserver.clone()],
        None if kind == NetworkKind::Float => {
            request.dns_nameservers = vec![DEFAULT_NAMESERVER.into()];
        }
        None => {}
    }

    if let (Some(start), Some(end)) = (&spec.allocation_start, &spec.allocation_end) {
        request.allocation_pools = vec![AllocationPool {
            start: start.clone(),
            end: end.clone(),
        }];
    }
    request
}

async fn create_network_and_subnet(
    client: &dyn NetworkService,
    kind: NetworkKind,
    spec: &NetworkSpec,
    admin_tenant: Option<&str>,
) -> Result<(String, String)> {
    debug!(kind = %kind, name = %spec.name, "Creating network");
    let network_id = client
        .create_network(&network_request(kind, spec, admin_tenant))
        .await?;
    debug!(kind = %kind, cidr = %spec.cidr, "Creating subnet");
    let subnet_id = client
        .create_subnet(&subnet_request(kind, spec, &network_id, admin_tenant))
        .await?;
    Ok((network_id, subnet_id))
}

/// Create the networks in `description`
pub async fn initialize_neutron(
    client: &dyn NetworkService,
    identity: &dyn IdentityAdmin,
    description: &NetworkDescription,
) -> Result<NeutronSetup> {
    let (kind, spec, admin_tenant) = match (&description.physical, &description.float) {
        (Some(physical), _) => {
            debug!("Discovering admin tenant");
            let tenant = identity
                .find_tenant(ADMIN_TENANT)
                .await?
                .ok_or_else(|| Error::Configuration("No admin tenant registered in Keystone".into()))?;
            if physical.metadata_server.as_deref().map_or(true, str::is_empty) {
                return Err(Error::Configuration(
                    "metadata_server is required for physical networks".into(),
                ));
            }
            (NetworkKind::Physical, physical, Some(tenant.id))
        }
        (None, Some(float)) => (NetworkKind::Float, float, None),
        (None, None) => {
            return Err(Error::Configuration("No float or physical network defined.".into()))
        }
    };

    let (network_id, subnet_id) =
        create_network_and_subnet(client, kind, spec, admin_tenant.as_deref()).await?;
    let mut setup = NeutronSetup {
        network_id,
        subnet_id,
        ..Default::default()
    };

    if let Some(external) = &description.external {
        debug!("Creating router");
        let router_id = client.create_router(ROUTER_NAME).await?;
        client.add_router_interface(&router_id, &setup.subnet_id).await?;

        let (external_id, _) =
            create_network_and_subnet(client, NetworkKind::External, external, None).await?;
        client.add_router_gateway(&router_id, &external_id).await?;

        setup.router_id = Some(router_id);
        setup.external_network_id = Some(external_id);
    }

    debug!("Neutron configured");
    Ok(setup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{NewEndpoint, NewUser, Role, Service, Tenant, User};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingNeutron {
        networks: Mutex<Vec<NetworkRequest>>,
        subnets: Mutex<Vec<SubnetRequest>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NetworkService for RecordingNeutron {
        async fn create_network(&self, request: &NetworkRequest) -> Result<String> {
            let mut networks = self.networks.lock();
            networks.push(request.clone());
            Ok(format!("net-{}", networks.len()))
        }

        async fn create_subnet(&self, request: &SubnetRequest) -> Result<String> {
            let mut subnets = self.subnets.lock();
            subnets.push(request.clone());
            Ok(format!("subnet-{}", subnets.len()))
        }

        async fn create_router(&self, name: &str) -> Result<String> {
            self.calls.lock().push(format!("router {name}"));
            Ok("router-1".into())
        }

        async fn add_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
            self.calls.lock().push(format!("interface {router_id} {subnet_id}"));
            Ok(())
        }

        async fn add_router_gateway(&self, router_id: &str, network_id: &str) -> Result<()> {
            self.calls.lock().push(format!("gateway {router_id} {network_id}"));
            Ok(())
        }
    }

    /// Identity stub that only knows the admin tenant
    struct AdminTenantOnly(Option<&'static str>);

    #[async_trait]
    impl IdentityAdmin for AdminTenantOnly {
        async fn find_role(&self, _: &str) -> Result<Option<Role>> {
            Ok(None)
        }
        async fn create_role(&self, _: &str) -> Result<Role> {
            unimplemented!()
        }
        async fn find_tenant(&self, name: &str) -> Result<Option<Tenant>> {
            Ok(self.0.filter(|_| name == "admin").map(|id| Tenant {
                id: id.into(),
                name: name.into(),
            }))
        }
        async fn create_tenant(&self, _: &str) -> Result<Tenant> {
            unimplemented!()
        }
        async fn find_user(&self, _: &str) -> Result<Option<User>> {
            Ok(None)
        }
        async fn create_user(&self, _: &NewUser) -> Result<User> {
            unimplemented!()
        }
        async fn add_user_role(&self, _: &str, _: &str, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn find_services_by_type(&self, _: &str) -> Result<Vec<Service>> {
            Ok(vec![])
        }
        async fn create_service(&self, _: &str, _: &str, _: &str) -> Result<Service> {
            unimplemented!()
        }
        async fn endpoint_exists(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn create_endpoint(&self, _: &NewEndpoint) -> Result<()> {
            unimplemented!()
        }
    }

    fn description(json: &str) -> NetworkDescription {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_physical_network() {
        let neutron = RecordingNeutron::default();
        let desc = description(
            r#"{"physical": {
                "gateway": "192.0.2.1", "metadata_server": "192.0.2.1",
                "cidr": "192.0.2.0/24", "allocation_start": "192.0.2.2",
                "allocation_end": "192.0.2.20", "name": "ctlplane"
            }}"#,
        );

        let setup = initialize_neutron(&neutron, &AdminTenantOnly(Some("admin-id")), &desc)
            .await
            .unwrap();
        assert_eq!(setup.network_id, "net-1");
        assert_eq!(setup.router_id, None);

        let network = &neutron.networks.lock()[0];
        assert_eq!(network.tenant_id.as_deref(), Some("admin-id"));
        assert_eq!(network.provider_network_type.as_deref(), Some("flat"));
        assert_eq!(network.provider_physical_network.as_deref(), Some("ctlplane"));

        let subnet = &neutron.subnets.lock()[0];
        assert_eq!(subnet.network_id, "net-1");
        assert_eq!(subnet.gateway_ip.as_deref(), Some("192.0.2.1"));
        assert_eq!(subnet.host_routes[0].destination, "169.254.169.254/32");
        assert_eq!(subnet.allocation_pools[0].end, "192.0.2.20");
        assert!(subnet.dns_nameservers.is_empty());
    }

    #[tokio::test]
    async fn test_float_with_external_router() {
        let neutron = RecordingNeutron::default();
        let desc = description(
            r#"{
                "float": {"name": "default-net", "cidr": "10.0.0.0/8"},
                "external": {"name": "ext-net", "cidr": "172.16.0.0/24", "gateway": "172.16.0.1"}
            }"#,
        );

        let setup = initialize_neutron(&neutron, &AdminTenantOnly(None), &desc)
            .await
            .unwrap();
        assert_eq!(setup.router_id.as_deref(), Some("router-1"));
        assert_eq!(setup.external_network_id.as_deref(), Some("net-2"));

        let networks = neutron.networks.lock();
        assert_eq!(networks[0].shared, Some(true));
        assert_eq!(networks[1].router_external, Some(true));

        let subnets = neutron.subnets.lock();
        assert_eq!(subnets[0].dns_nameservers, vec!["8.8.8.8".to_string()]);
        assert_eq!(subnets[1].enable_dhcp, Some(false));

        assert_eq!(
            *neutron.calls.lock(),
            vec![
                "router default-router".to_string(),
                "interface router-1 subnet-1".to_string(),
                "gateway router-1 net-2".to_string(),
            ]
        );
    }

    #[test]
    fn test_segmentation_id_selects_vlan() {
        let spec = NetworkSpec {
            name: "ctlplane".into(),
            cidr: "192.0.2.0/24".into(),
            segmentation_id: Some(25),
            ..Default::default()
        };
        let request = network_request(NetworkKind::Physical, &spec, Some("admin-id"));
        assert_eq!(request.provider_network_type.as_deref(), Some("vlan"));
        assert_eq!(request.provider_segmentation_id, Some(25));
        assert_eq!(request.provider_physical_network.as_deref(), Some("datacentre"));
    }

    #[tokio::test]
    async fn test_invalid_descriptions() {
        let neutron = RecordingNeutron::default();

        let err = initialize_neutron(&neutron, &AdminTenantOnly(Some("a")), &NetworkDescription::default())
            .await
            .unwrap_err();
        assert_matches!(err, Error::Configuration(ref m) if m.contains("No float or physical"));

        let desc = description(r#"{"physical": {"name": "ctlplane", "cidr": "192.0.2.0/24"}}"#);
        let err = initialize_neutron(&neutron, &AdminTenantOnly(Some("a")), &desc)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Configuration(ref m) if m.contains("metadata_server"));

        let desc = description(
            r#"{"physical": {"name": "ctlplane", "cidr": "192.0.2.0/24", "metadata_server": "192.0.2.1"}}"#,
        );
        let err = initialize_neutron(&neutron, &AdminTenantOnly(None), &desc)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Configuration(ref m) if m.contains("admin tenant"));
        assert!(neutron.networks.lock().is_empty());
    }
}
