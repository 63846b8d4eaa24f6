//! Service catalogue and endpoint URL templating

use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;

/// Static description of an OpenStack service the catalogue knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTemplate {
    pub name: &'static str,
    pub service_type: &'static str,
    pub description: &'static str,
    pub path: Option<&'static str>,
    pub admin_path: Option<&'static str>,
    pub port: Option<u16>,
    pub ssl_port: Option<u16>,
    /// Service runs without a dedicated identity user
    pub nouser: bool,
}

const fn service(
    name: &'static str,
    service_type: &'static str,
    description: &'static str,
    path: Option<&'static str>,
    port: Option<u16>,
    ssl_port: Option<u16>,
) -> ServiceTemplate {
    ServiceTemplate {
        name,
        service_type,
        description,
        path,
        admin_path: None,
        port,
        ssl_port,
        nouser: false,
    }
}

/// Every service `setup_endpoints` can register
pub static SERVICES: &[ServiceTemplate] = &[
    service("heat", "orchestration", "Heat Service", Some("/v1/%(tenant_id)s"), Some(8004), Some(13004)),
    service("heatcfn", "cloudformation", "Heat CloudFormation Service", Some("/v1"), Some(8000), Some(13005)),
    service("neutron", "network", "Neutron Service", None, Some(9696), Some(13696)),
    service("glance", "image", "Glance Image Service", None, Some(9292), Some(13292)),
    ServiceTemplate {
        admin_path: Some("/services/Admin"),
        ..service("ec2", "ec2", "EC2 Compatibility Layer", Some("/services/Cloud"), Some(8773), Some(13773))
    },
    service("nova", "compute", "Nova Compute Service", Some("/v2.1/$(tenant_id)s"), Some(8774), Some(13774)),
    service("ceilometer", "metering", "Ceilometer Service", None, Some(8777), Some(13777)),
    service("gnocchi", "metric", "OpenStack Metric Service", None, Some(8041), Some(13041)),
    service("aodh", "alarming", "OpenStack Alarming Service", None, Some(8042), Some(13042)),
    service("cinder", "volume", "Cinder Volume Service", Some("/v1/%(tenant_id)s"), Some(8776), Some(13776)),
    service("cinderv2", "volumev2", "Cinder Volume Service v2", Some("/v2/%(tenant_id)s"), Some(8776), Some(13776)),
    ServiceTemplate {
        admin_path: Some("/v1"),
        ..service("swift", "object-store", "Swift Object Storage Service", Some("/v1/AUTH_%(tenant_id)s"), Some(8080), Some(13808))
    },
    ServiceTemplate {
        admin_path: Some("/admin"),
        nouser: true,
        ..service("horizon", "dashboard", "OpenStack Dashboard", Some("/"), None, None)
    },
    service("ironic", "baremetal", "Ironic Service", None, Some(6385), Some(13385)),
    service("tuskar", "management", "Tuskar Service", Some("/v2"), Some(8585), None),
    service("manila", "share", "Manila Service", Some("/v1/%(tenant_id)s"), Some(8786), Some(13786)),
    service("sahara", "data-processing", "Sahara Service", Some("/v1.1/%(tenant_id)s"), Some(8386), None),
    service("trove", "database", "Trove Service", Some("/v1.0/%(tenant_id)s"), Some(8779), None),
    service("congress", "policy", "Congress Service", Some("/"), Some(1789), None),
];

/// Look up a catalogue entry by service name
pub fn find_service(name: &str) -> Option<&'static ServiceTemplate> {
    SERVICES.iter().find(|s| s.name == name)
}

/// Per-service overrides from the endpoints file; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nouser: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_host: Option<String>,
}

/// Fully resolved configuration of one service endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub name: String,
    pub service_type: String,
    pub description: String,
    pub path: String,
    pub admin_path: Option<String>,
    pub port: Option<u16>,
    pub ssl_port: Option<u16>,
    pub admin_port: Option<u16>,
    pub nouser: bool,
    pub password: Option<String>,
    pub internal_host: String,
    pub public_host: Option<String>,
}

impl EndpointConfig {
    /// Catalogue defaults, then the common hosts, then per-service overrides
    pub fn resolve(
        template: &ServiceTemplate,
        internal_host: &str,
        public_host: Option<&str>,
        overrides: &EndpointOverrides,
    ) -> Self {
        let owned = |s: Option<&str>| s.map(str::to_string);
        Self {
            name: overrides.name.clone().unwrap_or_else(|| template.name.to_string()),
            service_type: overrides
                .service_type
                .clone()
                .unwrap_or_else(|| template.service_type.to_string()),
            description: overrides
                .description
                .clone()
                .unwrap_or_else(|| template.description.to_string()),
            path: overrides
                .path
                .clone()
                .or_else(|| owned(template.path))
                .unwrap_or_else(|| "/".to_string()),
            admin_path: overrides.admin_path.clone().or_else(|| owned(template.admin_path)),
            port: overrides.port.or(template.port),
            ssl_port: overrides.ssl_port.or(template.ssl_port),
            admin_port: overrides.admin_port,
            nouser: overrides.nouser.unwrap_or(template.nouser),
            password: overrides.password.clone(),
            internal_host: overrides
                .internal_host
                .clone()
                .unwrap_or_else(|| internal_host.to_string()),
            public_host: overrides.public_host.clone().or_else(|| owned(public_host)),
        }
    }

    /// Public, admin and internal URLs for this service
    pub fn urls(&self) -> EndpointUrls {
        let internal_host = bracket_ipv6(&self.internal_host);
        let public_host = self.public_host.as_deref().map(bracket_ipv6);

        let internal = format_url("http", &internal_host, self.port, &self.path);

        let public = match (&public_host, self.ssl_port) {
            (Some(host), Some(ssl_port)) => format_url("https", host, Some(ssl_port), &self.path),
            (Some(host), None) => format_url("http", host, self.port, &self.path),
            (None, _) => internal.clone(),
        };

        let admin = format_url(
            "http",
            &internal_host,
            self.admin_port.or(self.port),
            self.admin_path.as_deref().unwrap_or(&self.path),
        );

        EndpointUrls {
            public,
            admin,
            internal,
        }
    }
}

/// The three URLs registered for a service endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrls {
    pub public: String,
    pub admin: String,
    pub internal: String,
}

/// Wrap an IPv6 literal in brackets so it can carry a port
pub fn bracket_ipv6(host: &str) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

fn format_url(scheme: &str, host: &str, port: Option<u16>, path: &str) -> String {
    match port {
        Some(port) => format!("{scheme}://{host}:{port}{path}"),
        None => format!("{scheme}://{host}{path}"),
    }
}

// =============================================================================
// Identity Endpoint
// =============================================================================

pub const KEYSTONE_PUBLIC_PORT: u16 = 5000;
pub const KEYSTONE_SSL_PORT: u16 = 13000;
pub const KEYSTONE_ADMIN_PORT: u16 = 35357;
pub const KEYSTONE_INTERNAL_PORT: u16 = 5000;

/// Hosts and ports for the identity service's own endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeystoneEndpointOptions {
    /// Host Keystone runs on; default for every URL
    pub host: String,
    /// Host for an HTTPS public endpoint
    pub ssl: Option<String>,
    /// Host for a plain HTTP public endpoint
    pub public: Option<String>,
    pub admin: Option<String>,
    pub internal: Option<String>,
    pub public_port: Option<u16>,
    pub admin_port: Option<u16>,
    pub internal_port: Option<u16>,
}

impl KeystoneEndpointOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// URLs of the identity endpoint; an SSL host wins over a public host
    pub fn urls(&self) -> EndpointUrls {
        let url = |scheme: &str, host: &str, port: u16| {
            format!("{scheme}://{}:{port}/v2.0", bracket_ipv6(host))
        };

        let public = match (&self.ssl, &self.public) {
            (Some(ssl), _) => url("https", ssl, self.public_port.unwrap_or(KEYSTONE_SSL_PORT)),
            (None, Some(public)) => url("http", public, self.public_port.unwrap_or(KEYSTONE_PUBLIC_PORT)),
            (None, None) => url("http", &self.host, self.public_port.unwrap_or(KEYSTONE_PUBLIC_PORT)),
        };
        let admin = url(
            "http",
            self.admin.as_deref().unwrap_or(&self.host),
            self.admin_port.unwrap_or(KEYSTONE_ADMIN_PORT),
        );
        let internal = url(
            "http",
            self.internal.as_deref().unwrap_or(&self.host),
            self.internal_port.unwrap_or(KEYSTONE_INTERNAL_PORT),
        );

        EndpointUrls {
            public,
            admin,
            internal,
        }
    }
}

/// Admin API URL used with the bootstrap admin token; never served over TLS
pub fn admin_api_url(host: &str, public: Option<&str>) -> String {
    format!(
        "http://{}:{KEYSTONE_ADMIN_PORT}/v2.0",
        bracket_ipv6(public.unwrap_or(host))
    )
}
