//! Compute API (Nova v2): flavors and the deprecated baremetal extension

use super::{ServiceClient, Session};
use crate::domain::ports::{
    Flavor, FlavorRequest, FlavorService, LegacyBaremetal, LegacyNode, LegacyNodeRequest,
};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Deserialize)]
struct FlavorList {
    flavors: Vec<Flavor>,
}

#[derive(Serialize, Deserialize)]
struct FlavorEnvelope<T> {
    flavor: T,
}

#[derive(Serialize, Deserialize)]
struct NodeEnvelope<T> {
    node: T,
}

/// Nova client bound to a session token
#[derive(Clone)]
pub struct NovaClient {
    client: ServiceClient,
}

impl NovaClient {
    pub fn new(session: &Session, endpoint: &str) -> Self {
        Self {
            client: ServiceClient::new("nova", endpoint, session.token(), session.http().clone()),
        }
    }
}

#[async_trait]
impl FlavorService for NovaClient {
    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        Ok(self.client.get::<FlavorList>("/flavors").await?.flavors)
    }

    async fn create_flavor(&self, request: &FlavorRequest) -> Result<Flavor> {
        let created: FlavorEnvelope<Flavor> = self
            .client
            .post("/flavors", &FlavorEnvelope { flavor: request })
            .await?;
        Ok(created.flavor)
    }

    async fn set_flavor_keys(&self, flavor_id: &str, keys: &BTreeMap<String, String>) -> Result<()> {
        self.client
            .post_empty(
                &format!("/flavors/{flavor_id}/os-extra_specs"),
                &json!({ "extra_specs": keys }),
            )
            .await
    }

    async fn delete_flavor(&self, flavor_id: &str) -> Result<()> {
        self.client.delete(&format!("/flavors/{flavor_id}")).await
    }
}

#[async_trait]
impl LegacyBaremetal for NovaClient {
    async fn create_node(&self, request: &LegacyNodeRequest) -> Result<LegacyNode> {
        let created: NodeEnvelope<LegacyNode> = self
            .client
            .post("/os-baremetal-nodes", &NodeEnvelope { node: request })
            .await?;
        Ok(created.node)
    }

    async fn add_interface(&self, node_id: &str, address: &str) -> Result<()> {
        self.client
            .post_empty(
                &format!("/os-baremetal-nodes/{node_id}/action"),
                &json!({ "add_interface": { "address": address } }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_request_body() {
        let request = FlavorRequest {
            name: "baremetal_2048_40_0_1".into(),
            ram: 2048,
            vcpus: 1,
            disk: 40,
            ephemeral: 0,
        };
        let body = serde_json::to_value(FlavorEnvelope { flavor: &request }).unwrap();
        assert_eq!(
            body,
            json!({"flavor": {
                "name": "baremetal_2048_40_0_1",
                "ram": 2048,
                "vcpus": 1,
                "disk": 40,
                "OS-FLV-EXT-DATA:ephemeral": 0
            }})
        );
    }

    #[test]
    fn test_flavor_list_parsing() {
        let list: FlavorList = serde_json::from_str(
            r#"{"flavors": [{"id": "1", "name": "m1.tiny", "links": []}]}"#,
        )
        .unwrap();
        assert_eq!(list.flavors[0].name, "m1.tiny");
    }

    #[test]
    fn test_legacy_node_body_omits_missing_password() {
        let request = LegacyNodeRequest {
            service_host: "seed".into(),
            cpus: 1,
            memory_mb: 512,
            local_gb: 10,
            prov_mac_address: "aa:bb:cc:dd:ee:ff".into(),
            pm_address: "10.0.0.8".into(),
            pm_user: "root".into(),
            pm_password: None,
        };
        let body = serde_json::to_value(NodeEnvelope { node: &request }).unwrap();
        assert!(body["node"].get("pm_password").is_none());
        assert_eq!(body["node"]["service_host"], "seed");
    }
}
