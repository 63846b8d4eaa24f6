//! Keystone v2 password session and service catalog

use super::{build_http_client, GlanceClient, IronicClient, KeystoneAdminClient, NeutronClient, NovaClient};
use crate::config::Credentials;
use crate::domain::ports::ServiceDirectory;
use crate::error::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

/// Which URL of a catalog endpoint to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    Public,
    Admin,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEndpoint {
    #[serde(rename = "publicURL")]
    pub public_url: String,
    #[serde(rename = "adminURL", default)]
    pub admin_url: Option<String>,
    #[serde(rename = "internalURL", default)]
    pub internal_url: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl CatalogEndpoint {
    fn url(&self, interface: Interface) -> &str {
        match interface {
            Interface::Public => &self.public_url,
            Interface::Admin => self.admin_url.as_deref().unwrap_or(&self.public_url),
            Interface::Internal => self.internal_url.as_deref().unwrap_or(&self.public_url),
        }
    }
}

/// One service in the catalog returned with the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct Token {
    id: String,
}

/// An authenticated identity session
#[derive(Clone)]
pub struct Session {
    http: Client,
    token: String,
    catalog: Vec<CatalogEntry>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("catalog", &self.catalog)
            .finish()
    }
}

impl Session {
    pub fn new(http: Client, token: impl Into<String>, catalog: Vec<CatalogEntry>) -> Self {
        Self {
            http,
            token: token.into(),
            catalog,
        }
    }

    /// Authenticate with username, password and tenant
    pub async fn authenticate(credentials: &Credentials) -> Result<Self> {
        let http = build_http_client(credentials.cacert.as_deref())?;
        let url = format!("{}/tokens", credentials.auth_url.trim_end_matches('/'));
        debug!(%url, username = %credentials.username, "Authenticating with Keystone");

        let body = json!({
            "auth": {
                "tenantName": credentials.tenant_name,
                "passwordCredentials": {
                    "username": credentials.username,
                    "password": credentials.password,
                }
            }
        });

        let response = http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| super::send_error("keystone", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(super::error_for_status("keystone", "/tokens", status, &body));
        }

        let token: TokenResponse = response.json().await?;
        info!(
            services = token.access.service_catalog.len(),
            "Authenticated with Keystone"
        );
        Ok(Self::new(http, token.access.token.id, token.access.service_catalog))
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    /// URL of the first endpoint registered for `service_type`
    pub fn endpoint(&self, service_type: &str, interface: Interface) -> Result<String> {
        self.catalog
            .iter()
            .find(|entry| entry.service_type == service_type)
            .and_then(|entry| entry.endpoints.first())
            .map(|endpoint| endpoint.url(interface).to_string())
            .ok_or_else(|| Error::NotFound {
                kind: "endpoint".into(),
                name: service_type.into(),
            })
    }

    // =========================================================================
    // Service Clients
    // =========================================================================

    pub fn ironic(&self) -> Result<IronicClient> {
        Ok(IronicClient::new(self, &self.endpoint("baremetal", Interface::Public)?))
    }

    pub fn nova(&self) -> Result<NovaClient> {
        Ok(NovaClient::new(self, &self.endpoint("compute", Interface::Public)?))
    }

    pub fn glance(&self) -> Result<GlanceClient> {
        Ok(GlanceClient::new(self, &self.endpoint("image", Interface::Public)?))
    }

    pub fn neutron(&self) -> Result<NeutronClient> {
        Ok(NeutronClient::new(self, &self.endpoint("network", Interface::Public)?))
    }

    /// Identity admin API reached with this session's token
    pub fn identity_admin(&self) -> Result<KeystoneAdminClient> {
        let url = self.endpoint("identity", Interface::Admin)?;
        Ok(KeystoneAdminClient::new(self.http.clone(), &url, &self.token))
    }
}

impl ServiceDirectory for Session {
    fn has_service(&self, name: &str) -> bool {
        self.catalog.iter().any(|entry| entry.name == name)
    }
}
