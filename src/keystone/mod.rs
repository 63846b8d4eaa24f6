//! Identity service bootstrap
//!
//! `initialize` prepares a fresh Keystone (admin role, tenants, admin user and
//! the identity endpoint) through the admin token; `setup_endpoints` registers
//! users, services and endpoints for the rest of the cloud. Every creation is
//! idempotent.

pub mod endpoints;

pub use endpoints::{
    admin_api_url, bracket_ipv6, find_service, EndpointConfig, EndpointOverrides, EndpointUrls,
    KeystoneEndpointOptions, ServiceTemplate, SERVICES,
};

use crate::domain::ports::{IdentityAdmin, NewEndpoint, NewUser, Role, Service, Tenant, User};
use crate::error::{Error, Result};
use crate::retry::{retry, RetryPolicy};
use indexmap::IndexMap;
use tracing::{debug, info};

pub const DEFAULT_REGION: &str = "regionOne";
pub const ADMIN_ROLE: &str = "admin";
pub const ADMIN_TENANT: &str = "admin";
pub const SERVICE_TENANT: &str = "service";
const SERVICE_USER_EMAIL: &str = "email=nobody@example.com";

/// Parameters for `initialize`
#[derive(Debug, Clone)]
pub struct InitializeOptions {
    pub admin_email: String,
    pub admin_password: String,
    pub region: String,
    pub endpoint: KeystoneEndpointOptions,
    /// How long to wait for Keystone to answer the first call
    pub poll: RetryPolicy,
}

// =============================================================================
// Idempotent Helpers
// =============================================================================

/// Create a role unless it already exists
pub async fn create_role(client: &dyn IdentityAdmin, name: &str) -> Result<Role> {
    if let Some(role) = client.find_role(name).await? {
        info!(role = %name, "Role was already created");
        return Ok(role);
    }
    debug!(role = %name, "Creating role");
    client.create_role(name).await
}

/// Create a tenant unless it already exists
pub async fn create_tenant(client: &dyn IdentityAdmin, name: &str) -> Result<Tenant> {
    if let Some(tenant) = client.find_tenant(name).await? {
        info!(tenant = %name, "Tenant was already created");
        return Ok(tenant);
    }
    debug!(tenant = %name, "Creating tenant");
    client.create_tenant(name).await
}

/// Create a service unless one of the same type exists
pub async fn create_service(
    client: &dyn IdentityAdmin,
    name: &str,
    service_type: &str,
    description: &str,
) -> Result<Service> {
    if let Some(service) = client.find_services_by_type(service_type).await?.into_iter().next() {
        info!(service = %name, service_type = %service_type, "Service already created");
        return Ok(service);
    }
    debug!(service_type = %service_type, "Creating service");
    client.create_service(name, service_type, description).await
}

/// Create an endpoint unless one with the same public URL exists
pub async fn create_endpoint(
    client: &dyn IdentityAdmin,
    region: &str,
    service_id: &str,
    urls: &EndpointUrls,
) -> Result<()> {
    if client.endpoint_exists(&urls.public).await? {
        info!(service = %service_id, public_url = %urls.public, "Endpoint already exists");
        return Ok(());
    }
    debug!(service = %service_id, "Creating endpoint");
    client
        .create_endpoint(&NewEndpoint {
            region: region.to_string(),
            service_id: service_id.to_string(),
            public_url: urls.public.clone(),
            admin_url: urls.admin.clone(),
            internal_url: urls.internal.clone(),
        })
        .await
}

async fn require_role(client: &dyn IdentityAdmin, name: &str) -> Result<Role> {
    client.find_role(name).await?.ok_or_else(|| Error::NotFound {
        kind: "role".into(),
        name: name.into(),
    })
}

async fn require_tenant(client: &dyn IdentityAdmin, name: &str) -> Result<Tenant> {
    client.find_tenant(name).await?.ok_or_else(|| Error::NotFound {
        kind: "tenant".into(),
        name: name.into(),
    })
}

/// Create the user a service authenticates as, with the admin role on the
/// service tenant
pub async fn create_user_for_service(
    client: &dyn IdentityAdmin,
    name: &str,
    password: Option<&str>,
) -> Result<User> {
    if let Some(user) = client.find_user(name).await? {
        info!(user = %name, "User already exists");
        return Ok(user);
    }

    debug!(user = %name, "Creating user");
    let service_tenant = require_tenant(client, SERVICE_TENANT).await?;
    let user = client
        .create_user(&NewUser {
            name: name.to_string(),
            password: password.map(str::to_string),
            email: Some(SERVICE_USER_EMAIL.to_string()),
            tenant_id: Some(service_tenant.id.clone()),
        })
        .await?;

    let admin = require_role(client, ADMIN_ROLE).await?;
    client
        .add_user_role(&user.id, &admin.id, &service_tenant.id)
        .await?;

    if matches!(name, "ceilometer" | "gnocchi") {
        let reseller = require_role(client, "ResellerAdmin").await?;
        client
            .add_user_role(&user.id, &reseller.id, &service_tenant.id)
            .await?;
    }

    Ok(user)
}

// =============================================================================
// Initialize
// =============================================================================

/// Create the `admin` role, polling until Keystone answers
async fn create_admin_role(client: &dyn IdentityAdmin, poll: &RetryPolicy) -> Result<Role> {
    retry(poll, "create admin role", Error::is_transient, |attempt| {
        debug!(attempt, "Creating admin role");
        create_role(client, ADMIN_ROLE)
    })
    .await
    .map_err(|e| {
        if e.is_transient() {
            Error::ServiceUnavailable {
                operation: "create admin role".into(),
                attempts: poll.max_attempts,
            }
        } else {
            e
        }
    })
}

async fn create_admin_user(client: &dyn IdentityAdmin, email: &str, password: &str) -> Result<User> {
    let admin_tenant = require_tenant(client, ADMIN_TENANT).await?;

    if let Some(user) = client.find_user("admin").await? {
        info!("Admin user already exists, skip creation");
        return Ok(user);
    }
    info!("Creating admin user");
    client
        .create_user(&NewUser {
            name: "admin".into(),
            password: Some(password.to_string()),
            email: Some(email.to_string()),
            tenant_id: Some(admin_tenant.id),
        })
        .await
}

/// Register the identity service's own endpoint
pub async fn create_keystone_endpoint(
    client: &dyn IdentityAdmin,
    region: &str,
    options: &KeystoneEndpointOptions,
) -> Result<()> {
    debug!("Creating keystone endpoint");
    let service = create_service(client, "keystone", "identity", "Keystone Identity Service").await?;
    create_endpoint(client, region, &service.id, &options.urls()).await
}

/// Post-deployment initialization of Keystone
pub async fn initialize(client: &dyn IdentityAdmin, options: &InitializeOptions) -> Result<()> {
    create_admin_role(client, &options.poll).await?;
    create_tenant(client, ADMIN_TENANT).await?;
    create_tenant(client, SERVICE_TENANT).await?;
    create_admin_user(client, &options.admin_email, &options.admin_password).await?;
    create_keystone_endpoint(client, &options.region, &options.endpoint).await?;
    info!(host = %options.endpoint.host, "Keystone initialized");
    Ok(())
}

// =============================================================================
// Service Endpoints
// =============================================================================

/// Roles every deployment needs besides `admin`
pub const SERVICE_ROLES: &[&str] = &["swiftoperator", "ResellerAdmin", "heat_stack_user"];

/// Register one service: its user, the service itself and its endpoint
pub async fn register_endpoint(
    client: &dyn IdentityAdmin,
    config: &EndpointConfig,
    region: &str,
) -> Result<()> {
    if !config.nouser {
        create_user_for_service(client, &config.name, config.password.as_deref()).await?;
    }
    let service = create_service(client, &config.name, &config.service_type, &config.description).await?;
    create_endpoint(client, region, &service.id, &config.urls()).await
}

/// Register every service in `endpoints`, in file order.
///
/// `internal_host` is usually the host of `OS_AUTH_URL`; `public_host`
/// switches public URLs to HTTPS on each service's SSL port.
pub async fn setup_endpoints(
    client: &dyn IdentityAdmin,
    endpoints: &IndexMap<String, EndpointOverrides>,
    internal_host: &str,
    public_host: Option<&str>,
    region: Option<&str>,
) -> Result<()> {
    let configs = endpoints
        .iter()
        .map(|(name, overrides)| {
            let template = find_service(name)
                .ok_or_else(|| Error::Configuration(format!("unknown service: {name}")))?;
            Ok(EndpointConfig::resolve(template, internal_host, public_host, overrides))
        })
        .collect::<Result<Vec<_>>>()?;

    for role in SERVICE_ROLES {
        create_role(client, role).await?;
    }

    debug!(services = configs.len(), "Creating service endpoints");
    let region = region.unwrap_or(DEFAULT_REGION);
    for config in &configs {
        register_endpoint(client, config, region).await?;
    }
    Ok(())
}

/// Host part of an auth URL, e.g. `OS_AUTH_URL`
pub fn host_from_url(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| Error::Configuration(format!("invalid URL {url}: {e}")))?;
    parsed
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| Error::Configuration(format!("URL has no host: {url}")))
}
