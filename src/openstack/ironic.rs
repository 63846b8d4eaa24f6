//! Bare-metal provisioning API (Ironic v1)

use super::{versioned_url, ServiceClient, Session};
use crate::domain::ports::{
    BackendNode, BackendPort, NodeCreateRequest, NodeValidation, PatchOperation, PowerState,
    ProvisioningBackend,
};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

/// Microversion sent with every request; nodes created with it skip the
/// `enroll` state
pub const IRONIC_API_VERSION: &str = "1.9";
const API_VERSION_HEADER: &str = "X-OpenStack-Ironic-API-Version";

#[derive(Deserialize)]
struct NodeList {
    nodes: Vec<BackendNode>,
}

#[derive(Deserialize)]
struct PortEntry {
    uuid: String,
    address: String,
}

#[derive(Deserialize)]
struct PortList {
    ports: Vec<PortEntry>,
}

/// Ironic client bound to a session token
#[derive(Clone)]
pub struct IronicClient {
    client: ServiceClient,
}

impl IronicClient {
    pub fn new(session: &Session, endpoint: &str) -> Self {
        Self {
            client: ServiceClient::new(
                "ironic",
                &versioned_url(endpoint, "v1"),
                session.token(),
                session.http().clone(),
            ),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, path)
            .header(API_VERSION_HEADER, IRONIC_API_VERSION)
    }
}

#[async_trait]
impl ProvisioningBackend for IronicClient {
    async fn list_nodes(&self) -> Result<Vec<BackendNode>> {
        let path = "/nodes/detail";
        let response = self.client.send(path, self.request(Method::GET, path)).await?;
        Ok(response.json::<NodeList>().await?.nodes)
    }

    async fn list_ports(&self, node_uuid: &str) -> Result<Vec<BackendPort>> {
        let path = format!("/nodes/{node_uuid}/ports");
        let response = self.client.send(&path, self.request(Method::GET, &path)).await?;
        Ok(response
            .json::<PortList>()
            .await?
            .ports
            .into_iter()
            .map(|port| BackendPort {
                uuid: port.uuid,
                address: port.address,
                node_uuid: node_uuid.to_string(),
            })
            .collect())
    }

    async fn create_node(&self, request: &NodeCreateRequest) -> Result<BackendNode> {
        let path = "/nodes";
        let response = self
            .client
            .send(path, self.request(Method::POST, path).json(request))
            .await?;
        Ok(response.json().await?)
    }

    async fn update_node(&self, node_uuid: &str, patch: &[PatchOperation]) -> Result<BackendNode> {
        let path = format!("/nodes/{node_uuid}");
        let response = self
            .client
            .send(&path, self.request(Method::PATCH, &path).json(patch))
            .await?;
        Ok(response.json().await?)
    }

    async fn delete_node(&self, node_uuid: &str) -> Result<()> {
        let path = format!("/nodes/{node_uuid}");
        self.client
            .send(&path, self.request(Method::DELETE, &path))
            .await?;
        Ok(())
    }

    async fn create_port(&self, node_uuid: &str, address: &str) -> Result<BackendPort> {
        let path = "/ports";
        let body = json!({ "node_uuid": node_uuid, "address": address });
        let response = self
            .client
            .send(path, self.request(Method::POST, path).json(&body))
            .await?;
        let port: PortEntry = response.json().await?;
        Ok(BackendPort {
            uuid: port.uuid,
            address: port.address,
            node_uuid: node_uuid.to_string(),
        })
    }

    async fn set_power_state(&self, node_uuid: &str, state: PowerState) -> Result<()> {
        let path = format!("/nodes/{node_uuid}/states/power");
        let body = json!({ "target": state.to_string() });
        self.client
            .send(&path, self.request(Method::PUT, &path).json(&body))
            .await?;
        Ok(())
    }

    async fn validate_node(&self, node_uuid: &str) -> Result<NodeValidation> {
        let path = format!("/nodes/{node_uuid}/validate");
        let response = self.client.send(&path, self.request(Method::GET, &path)).await?;
        Ok(response.json().await?)
    }
}
