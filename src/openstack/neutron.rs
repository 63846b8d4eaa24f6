//! Networking API (Neutron v2.0)

use super::{versioned_url, ServiceClient, Session};
use crate::domain::ports::{NetworkRequest, NetworkService, SubnetRequest};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct NetworkEnvelope {
    network: Created,
}

#[derive(Deserialize)]
struct SubnetEnvelope {
    subnet: Created,
}

#[derive(Deserialize)]
struct RouterEnvelope {
    router: Created,
}

/// Neutron client bound to a session token
#[derive(Clone)]
pub struct NeutronClient {
    client: ServiceClient,
}

impl NeutronClient {
    pub fn new(session: &Session, endpoint: &str) -> Self {
        Self {
            client: ServiceClient::new(
                "neutron",
                &versioned_url(endpoint, "v2.0"),
                session.token(),
                session.http().clone(),
            ),
        }
    }
}

#[async_trait]
impl NetworkService for NeutronClient {
    async fn create_network(&self, request: &NetworkRequest) -> Result<String> {
        let created: NetworkEnvelope = self
            .client
            .post("/networks", &json!({ "network": request }))
            .await?;
        Ok(created.network.id)
    }

    async fn create_subnet(&self, request: &SubnetRequest) -> Result<String> {
        let created: SubnetEnvelope = self
            .client
            .post("/subnets", &json!({ "subnet": request }))
            .await?;
        Ok(created.subnet.id)
    }

    async fn create_router(&self, name: &str) -> Result<String> {
        let created: RouterEnvelope = self
            .client
            .post("/routers", &json!({ "router": { "name": name } }))
            .await?;
        Ok(created.router.id)
    }

    async fn add_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        self.client
            .put(
                &format!("/routers/{router_id}/add_router_interface"),
                &json!({ "subnet_id": subnet_id }),
            )
            .await
    }

    async fn add_router_gateway(&self, router_id: &str, network_id: &str) -> Result<()> {
        self.client
            .put(
                &format!("/routers/{router_id}"),
                &json!({ "router": { "external_gateway_info": { "network_id": network_id } } }),
            )
            .await
    }
}
