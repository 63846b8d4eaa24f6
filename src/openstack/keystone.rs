//! Identity admin API (Keystone v2 with the OS-KSADM extension)

use super::{build_http_client, ServiceClient};
use crate::domain::ports::{IdentityAdmin, NewEndpoint, NewUser, Role, Service, Tenant, User};
use crate::error::Result;
use crate::keystone::admin_api_url;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct RoleList {
    roles: Vec<Role>,
}

#[derive(Deserialize)]
struct RoleEnvelope {
    role: Role,
}

#[derive(Deserialize)]
struct TenantList {
    tenants: Vec<Tenant>,
}

#[derive(Deserialize)]
struct TenantEnvelope {
    tenant: Tenant,
}

#[derive(Deserialize)]
struct UserList {
    users: Vec<User>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
struct ServiceList {
    #[serde(rename = "OS-KSADM:services")]
    services: Vec<Service>,
}

#[derive(Deserialize)]
struct ServiceEnvelope {
    #[serde(rename = "OS-KSADM:service")]
    service: Service,
}

#[derive(Deserialize)]
struct EndpointEntry {
    #[serde(rename = "publicurl")]
    public_url: String,
}

#[derive(Deserialize)]
struct EndpointList {
    endpoints: Vec<EndpointEntry>,
}

/// Keystone v2 admin client
#[derive(Clone)]
pub struct KeystoneAdminClient {
    client: ServiceClient,
}

impl KeystoneAdminClient {
    pub fn new(http: Client, admin_url: &str, token: &str) -> Self {
        Self {
            client: ServiceClient::new("keystone", admin_url, token, http),
        }
    }

    /// Client for a freshly deployed Keystone, authenticated by the bootstrap
    /// admin token
    pub fn with_admin_token(host: &str, admin_token: &str, public: Option<&str>) -> Result<Self> {
        let http = build_http_client(None)?;
        Ok(Self::new(http, &admin_api_url(host, public), admin_token))
    }
}

#[async_trait]
impl IdentityAdmin for KeystoneAdminClient {
    async fn find_role(&self, name: &str) -> Result<Option<Role>> {
        let roles: RoleList = self.client.get("/OS-KSADM/roles").await?;
        Ok(roles.roles.into_iter().find(|role| role.name == name))
    }

    async fn create_role(&self, name: &str) -> Result<Role> {
        let created: RoleEnvelope = self
            .client
            .post("/OS-KSADM/roles", &json!({ "role": { "name": name } }))
            .await?;
        Ok(created.role)
    }

    async fn find_tenant(&self, name: &str) -> Result<Option<Tenant>> {
        let tenants: TenantList = self.client.get("/tenants").await?;
        Ok(tenants.tenants.into_iter().find(|tenant| tenant.name == name))
    }

    async fn create_tenant(&self, name: &str) -> Result<Tenant> {
        let created: TenantEnvelope = self
            .client
            .post("/tenants", &json!({ "tenant": { "name": name, "enabled": true } }))
            .await?;
        Ok(created.tenant)
    }

    async fn find_user(&self, name: &str) -> Result<Option<User>> {
        let users: UserList = self.client.get("/users").await?;
        Ok(users.users.into_iter().find(|user| user.name == name))
    }

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut body = serde_json::to_value(user)?;
        body["enabled"] = json!(true);
        let created: UserEnvelope = self.client.post("/users", &json!({ "user": body })).await?;
        Ok(created.user)
    }

    async fn add_user_role(&self, user_id: &str, role_id: &str, tenant_id: &str) -> Result<()> {
        let path = format!("/tenants/{tenant_id}/users/{user_id}/roles/OS-KSADM/{role_id}");
        self.client
            .send(&path, self.client.request(Method::PUT, &path))
            .await?;
        Ok(())
    }

    async fn find_services_by_type(&self, service_type: &str) -> Result<Vec<Service>> {
        let services: ServiceList = self.client.get("/OS-KSADM/services").await?;
        Ok(services
            .services
            .into_iter()
            .filter(|service| service.service_type == service_type)
            .collect())
    }

    async fn create_service(&self, name: &str, service_type: &str, description: &str) -> Result<Service> {
        let body = json!({
            "OS-KSADM:service": {
                "name": name,
                "type": service_type,
                "description": description,
            }
        });
        let created: ServiceEnvelope = self.client.post("/OS-KSADM/services", &body).await?;
        Ok(created.service)
    }

    async fn endpoint_exists(&self, public_url: &str) -> Result<bool> {
        let endpoints: EndpointList = self.client.get("/endpoints").await?;
        Ok(endpoints
            .endpoints
            .iter()
            .any(|endpoint| endpoint.public_url == public_url))
    }

    async fn create_endpoint(&self, endpoint: &NewEndpoint) -> Result<()> {
        self.client
            .post_empty("/endpoints", &json!({ "endpoint": endpoint }))
            .await
    }
}
