//! Domain layer - port definitions for the OpenStack services
//!
//! Bootstrap logic is written against these traits; the `openstack` module
//! implements them over HTTP.

pub mod ports;

pub use ports::*;
