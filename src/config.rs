//! Environment configuration
//!
//! OpenStack credentials follow the usual `OS_*` variables of the command-line
//! clients. Every missing variable is reported at once.

use crate::error::{Error, Result};
use std::path::PathBuf;

pub const ENV_USERNAME: &str = "OS_USERNAME";
pub const ENV_PASSWORD: &str = "OS_PASSWORD";
pub const ENV_TENANT_NAME: &str = "OS_TENANT_NAME";
pub const ENV_AUTH_URL: &str = "OS_AUTH_URL";
pub const ENV_CACERT: &str = "OS_CACERT";
pub const ENV_ROOT_DISK: &str = "ROOT_DISK";

// =============================================================================
// Credentials
// =============================================================================

/// Password credentials for the identity service
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub tenant_name: String,
    pub auth_url: String,
    /// Extra trusted root certificate (PEM) for TLS
    pub cacert: Option<PathBuf>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tenant_name", &self.tenant_name)
            .field("auth_url", &self.auth_url)
            .field("cacert", &self.cacert)
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through `lookup`; empty values count as missing
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let username = get(ENV_USERNAME);
        let password = get(ENV_PASSWORD);
        let tenant_name = get(ENV_TENANT_NAME);
        let auth_url = get(ENV_AUTH_URL);

        let mut missing: Vec<String> = [
            (ENV_USERNAME, username.is_none()),
            (ENV_PASSWORD, password.is_none()),
            (ENV_TENANT_NAME, tenant_name.is_none()),
            (ENV_AUTH_URL, auth_url.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(key, _)| key.to_string())
        .collect();

        match (username, password, tenant_name, auth_url) {
            (Some(username), Some(password), Some(tenant_name), Some(auth_url)) => Ok(Self {
                username,
                password,
                tenant_name,
                auth_url,
                cacert: get(ENV_CACERT).map(PathBuf::from),
            }),
            _ => {
                missing.sort();
                Err(Error::MissingEnvironment { variables: missing })
            }
        }
    }
}

// =============================================================================
// Flavor Settings
// =============================================================================

/// Root disk size (GB) for generated flavors, from `ROOT_DISK`
pub fn root_disk_from_env() -> Result<Option<u64>> {
    parse_root_disk(std::env::var(ENV_ROOT_DISK).ok().as_deref())
}

fn parse_root_disk(value: Option<&str>) -> Result<Option<u64>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            Error::Configuration(format!("{ENV_ROOT_DISK} must be a size in GB, got {raw:?}"))
        }),
    }
}
