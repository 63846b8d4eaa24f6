//! os-cloud-config
//!
//! Bootstrap tooling for an OpenStack-based private cloud. The centre of the
//! crate is bare-metal node reconciliation: a declarative list of nodes is
//! converged onto the provisioning service, matching existing records by MAC
//! address or power-management address so repeated runs update rather than
//! duplicate. Around it sit the one-shot setup steps of a fresh cloud.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          os-cloud-config CLI                          │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────┐  ┌──────────┐  ┌────────┐  ┌─────┐  │
//! │  │    nodes     │  │ flavors  │  │ keystone │  │neutron │  │ pki │  │
//! │  │ (reconciler) │  │ + glance │  │          │  │        │  │     │  │
//! │  └──────┬───────┘  └────┬─────┘  └────┬─────┘  └───┬────┘  └─────┘  │
//! │         └───────────────┴─────────────┴────────────┘                  │
//! │                     domain::ports (async traits)                      │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                   openstack (reqwest service clients)                 │
//! │       Ironic · Nova · Glance · Keystone · Neutron · Session           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`nodes`]: node descriptors, driver families, identity index and registration
//! - [`flavors`]: compute flavors derived from node hardware
//! - [`glance`]: deploy kernel and ramdisk images
//! - [`keystone`]: identity service initialization and endpoint registration
//! - [`neutron`]: control-plane and floating networks
//! - [`pki`]: self-signed CA, Keystone signing and SSL certificates
//! - [`openstack`]: HTTP clients implementing the domain ports
//! - [`domain`]: port traits and wire types
//! - [`config`]: environment credentials
//! - [`retry`]: bounded retry policies
//! - [`error`]: error types and handling

pub mod config;
pub mod domain;
pub mod error;
pub mod flavors;
pub mod glance;
pub mod keystone;
pub mod neutron;
pub mod nodes;
pub mod openstack;
pub mod pki;
pub mod retry;

// Re-export commonly used types
pub use config::Credentials;

pub use domain::ports::{
    BackendNode, FlavorService, IdentityAdmin, ImageCatalog, LegacyBaremetal, NetworkService,
    ProvisioningBackend, ServiceDirectory,
};

pub use error::{Error, Result};

pub use nodes::{
    find_driver_handler, register_all_nodes, DriverFamily, NodeDescriptor, NodeIndex,
    RegisterOptions, RegistrationSummary,
};

pub use openstack::Session;

pub use retry::{RetryPolicy, REGISTER_RETRY, UPDATE_RETRY};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
