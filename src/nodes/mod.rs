//! Bare-metal node registration
//!
//! Converges the provisioning backend onto a declarative list of nodes:
//! - `descriptor`: desired-state input records
//! - `drivers`: power-management driver families and credential translation
//! - `index`: current-state lookup by MAC and power address
//! - `register`: register-or-update and cleanup
//! - `legacy`: the deprecated Nova baremetal path

pub mod descriptor;
pub mod drivers;
pub mod index;
pub mod legacy;
pub mod register;

#[cfg(test)]
pub(crate) mod memory;

pub use descriptor::{load_nodes, parse_nodes, Capabilities, NodeDescriptor};
pub use drivers::{find_driver_handler, ConversionWarning, DriverFamily, DriverInfoConversion};
pub use index::NodeIndex;
pub use legacy::{register_all_nova_bm_nodes, register_nova_bm_node};
pub use register::{
    clean_up_extra_nodes, register_all_nodes, register_ironic_node, update_or_register,
    NodeOutcome, RegisterOptions, RegistrationSummary,
};
