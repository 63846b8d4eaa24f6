//! Power-management driver families
//!
//! Each family knows how to translate the generic `pm_*` vocabulary of a node
//! descriptor into the field names its backend driver expects, and how to
//! derive the "unique power address" used to recognise an already registered
//! node. Families are selected from the descriptor's `pm_type` by an ordered
//! table of glob patterns; the first match wins.

use crate::domain::ports::BackendNode;
use crate::error::{Error, Result};
use crate::nodes::descriptor::{value_to_string, NodeDescriptor};
use glob::Pattern;
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// Driver Families
// =============================================================================

/// A family of backend drivers sharing one driver-info schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverFamily {
    Ipmi,
    Drac,
    Ilo,
    Ucs,
    Irmc,
    Amt,
    Wol,
    IBoot,
    Fake,
    Ssh,
}

/// `pm_type` patterns in match order
const DRIVER_PATTERNS: &[(&str, DriverFamily)] = &[
    ("ipmi", DriverFamily::Ipmi),
    ("*_ipmitool", DriverFamily::Ipmi),
    ("*_ipminative", DriverFamily::Ipmi),
    ("*_drac", DriverFamily::Drac),
    ("*_ilo", DriverFamily::Ilo),
    ("*_ucs", DriverFamily::Ucs),
    ("*_irmc", DriverFamily::Irmc),
    ("*_amt", DriverFamily::Amt),
    ("*_wol", DriverFamily::Wol),
    ("*_iboot", DriverFamily::IBoot),
    ("fake", DriverFamily::Fake),
    ("fake-hardware", DriverFamily::Fake),
    ("fake_pxe", DriverFamily::Fake),
    ("fake_agent", DriverFamily::Fake),
    ("pxe_ssh", DriverFamily::Ssh),
    ("*_ssh", DriverFamily::Ssh),
];

/// How a family derives a node's unique power address from driver-info
#[derive(Debug, Clone, Copy)]
enum Identity {
    /// Nodes of this family are only recognised by MAC address
    MacOnly,
    Address {
        address: &'static str,
        port: Option<&'static str>,
        relay: Option<&'static str>,
    },
}

/// Static description of a driver family
#[derive(Debug)]
struct FamilySpec {
    prefix: &'static str,
    mapping: &'static [(&'static str, &'static str)],
    deprecated: &'static [(&'static str, &'static str)],
    defaults: &'static [(&'static str, &'static str)],
    identity: Identity,
}

static IPMI: FamilySpec = FamilySpec {
    prefix: "ipmi",
    mapping: &[
        ("pm_addr", "ipmi_address"),
        ("pm_user", "ipmi_username"),
        ("pm_password", "ipmi_password"),
        ("pm_port", "ipmi_port"),
    ],
    deprecated: &[("pm_privilege_level", "ipmi_priv_level")],
    defaults: &[],
    identity: Identity::Address {
        address: "ipmi_address",
        port: Some("ipmi_port"),
        relay: None,
    },
};

static DRAC: FamilySpec = FamilySpec {
    prefix: "drac",
    mapping: &[
        ("pm_addr", "drac_address"),
        ("pm_user", "drac_username"),
        ("pm_password", "drac_password"),
        ("pm_port", "drac_port"),
    ],
    deprecated: &[],
    defaults: &[],
    identity: Identity::Address {
        address: "drac_address",
        port: Some("drac_port"),
        relay: None,
    },
};

static ILO: FamilySpec = FamilySpec {
    prefix: "ilo",
    mapping: &[
        ("pm_addr", "ilo_address"),
        ("pm_user", "ilo_username"),
        ("pm_password", "ilo_password"),
    ],
    deprecated: &[],
    defaults: &[],
    identity: Identity::Address {
        address: "ilo_address",
        port: None,
        relay: None,
    },
};

static UCS: FamilySpec = FamilySpec {
    prefix: "ucs",
    mapping: &[
        ("pm_addr", "ucs_address"),
        ("pm_user", "ucs_username"),
        ("pm_password", "ucs_password"),
        ("pm_port", "ucs_port"),
    ],
    deprecated: &[("pm_service_profile", "ucs_service_profile")],
    defaults: &[],
    identity: Identity::Address {
        address: "ucs_address",
        port: Some("ucs_port"),
        relay: None,
    },
};

static IRMC: FamilySpec = FamilySpec {
    prefix: "irmc",
    mapping: &[
        ("pm_addr", "irmc_address"),
        ("pm_user", "irmc_username"),
        ("pm_password", "irmc_password"),
        ("pm_port", "irmc_port"),
    ],
    deprecated: &[
        ("pm_auth_method", "irmc_auth_method"),
        ("pm_client_timeout", "irmc_client_timeout"),
        ("pm_sensor_method", "irmc_sensor_method"),
        ("pm_deploy_iso", "irmc_deploy_iso"),
    ],
    defaults: &[],
    identity: Identity::Address {
        address: "irmc_address",
        port: Some("irmc_port"),
        relay: None,
    },
};

static AMT: FamilySpec = FamilySpec {
    prefix: "amt",
    mapping: &[
        ("pm_addr", "amt_address"),
        ("pm_user", "amt_username"),
        ("pm_password", "amt_password"),
    ],
    deprecated: &[],
    defaults: &[],
    identity: Identity::Address {
        address: "amt_address",
        port: None,
        relay: None,
    },
};

static WOL: FamilySpec = FamilySpec {
    prefix: "wol",
    mapping: &[("pm_addr", "wol_host"), ("pm_port", "wol_port")],
    deprecated: &[],
    defaults: &[],
    identity: Identity::Address {
        address: "wol_host",
        port: Some("wol_port"),
        relay: None,
    },
};

static IBOOT: FamilySpec = FamilySpec {
    prefix: "iboot",
    mapping: &[
        ("pm_addr", "iboot_address"),
        ("pm_user", "iboot_username"),
        ("pm_password", "iboot_password"),
        ("pm_port", "iboot_port"),
    ],
    deprecated: &[("pm_relay_id", "iboot_relay_id")],
    defaults: &[],
    identity: Identity::Address {
        address: "iboot_address",
        port: Some("iboot_port"),
        relay: Some("iboot_relay_id"),
    },
};

static FAKE: FamilySpec = FamilySpec {
    prefix: "fake",
    mapping: &[],
    deprecated: &[],
    defaults: &[],
    identity: Identity::MacOnly,
};

// Several VMs share one hypervisor address, so SSH nodes are matched by MAC.
static SSH: FamilySpec = FamilySpec {
    prefix: "ssh",
    mapping: &[
        ("pm_addr", "ssh_address"),
        ("pm_user", "ssh_username"),
        ("pm_password", "ssh_key_contents"),
    ],
    deprecated: &[("pm_virt_type", "ssh_virt_type")],
    defaults: &[("ssh_virt_type", "virsh")],
    identity: Identity::MacOnly,
};

// =============================================================================
// Key Translation
// =============================================================================

/// Something the translation noticed that the operator should hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionWarning {
    /// A deprecated key was accepted under its canonical name
    Deprecated { key: String, replacement: String },
    /// A `pm_*` key this driver does not understand was dropped
    Unsupported { key: String, driver: String },
}

impl std::fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionWarning::Deprecated { key, replacement } => {
                write!(f, "key {key} is deprecated, please use {replacement}")
            }
            ConversionWarning::Unsupported { key, driver } => write!(
                f,
                "key {key} is not supported by {driver} drivers and will not be passed"
            ),
        }
    }
}

/// Driver-info produced from a descriptor, plus any warnings raised
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverInfoConversion {
    pub driver_info: BTreeMap<String, Value>,
    pub warnings: Vec<ConversionWarning>,
}

/// Select the driver family for a `pm_type`
pub fn find_driver_handler(pm_type: &str) -> Result<DriverFamily> {
    for (pattern, family) in DRIVER_PATTERNS {
        let pattern = Pattern::new(pattern)
            .map_err(|e| Error::Internal(format!("invalid driver pattern {pattern}: {e}")))?;
        if pattern.matches(pm_type) {
            return Ok(*family);
        }
    }
    Err(Error::invalid_node(format!(
        "unknown pm_type (ironic driver to use): {pm_type}"
    )))
}

impl DriverFamily {
    fn spec(self) -> &'static FamilySpec {
        match self {
            DriverFamily::Ipmi => &IPMI,
            DriverFamily::Drac => &DRAC,
            DriverFamily::Ilo => &ILO,
            DriverFamily::Ucs => &UCS,
            DriverFamily::Irmc => &IRMC,
            DriverFamily::Amt => &AMT,
            DriverFamily::Wol => &WOL,
            DriverFamily::IBoot => &IBOOT,
            DriverFamily::Fake => &FAKE,
            DriverFamily::Ssh => &SSH,
        }
    }

    /// Resolve one descriptor key to its driver-info name.
    ///
    /// Returns the canonical key (`None` when the key is not passed on) and a
    /// warning when the caller should surface one.
    pub fn convert_key(self, key: &str) -> (Option<String>, Option<ConversionWarning>) {
        let spec = self.spec();

        if let Some((_, target)) = spec.mapping.iter().find(|(from, _)| *from == key) {
            return (Some((*target).to_string()), None);
        }
        if let Some((_, target)) = spec.deprecated.iter().find(|(from, _)| *from == key) {
            let warning = ConversionWarning::Deprecated {
                key: key.to_string(),
                replacement: (*target).to_string(),
            };
            return (Some((*target).to_string()), Some(warning));
        }
        if key.starts_with(&format!("{}_", spec.prefix)) {
            return (Some(key.to_string()), None);
        }
        if key.starts_with("pm_") && key != "pm_type" {
            let warning = ConversionWarning::Unsupported {
                key: key.to_string(),
                driver: spec.prefix.to_string(),
            };
            return (None, Some(warning));
        }
        (None, None)
    }

    /// Translate a descriptor's credential bag into backend driver-info
    pub fn convert(self, node: &NodeDescriptor) -> DriverInfoConversion {
        let spec = self.spec();
        let mut conversion = DriverInfoConversion::default();

        for (key, value) in spec.defaults {
            conversion
                .driver_info
                .insert((*key).to_string(), Value::String((*value).to_string()));
        }

        for (key, value) in &node.power {
            let (target, warning) = self.convert_key(key);
            if let Some(warning) = warning {
                conversion.warnings.push(warning);
            }
            if let Some(target) = target {
                conversion.driver_info.insert(target, value.clone());
            }
        }

        conversion
    }

    /// Unique power address computed from translated driver-info
    pub fn unique_id_from_driver_info(self, driver_info: &BTreeMap<String, Value>) -> Option<String> {
        let present = |key: &str| {
            driver_info
                .get(key)
                .filter(|v| !v.is_null())
                .map(value_to_string)
        };

        match self.spec().identity {
            Identity::MacOnly => None,
            Identity::Address {
                address,
                port,
                relay,
            } => {
                let mut result = present(address)?;
                if let Some(port) = port.and_then(present) {
                    result = format!("{result}:{port}");
                }
                if let Some(relay) = relay.and_then(present) {
                    result = format!("{result}#{relay}");
                }
                Some(result)
            }
        }
    }

    /// Unique power address of a desired node
    pub fn unique_id_from_descriptor(self, node: &NodeDescriptor) -> Option<String> {
        self.unique_id_from_driver_info(&self.convert(node).driver_info)
    }

    /// Unique power address of an existing backend record; `None` when the
    /// record lacks the address field
    pub fn unique_id_from_record(self, node: &BackendNode) -> Option<String> {
        self.unique_id_from_driver_info(&node.driver_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn descriptor(value: Value) -> NodeDescriptor {
        serde_json::from_value(value).unwrap()
    }

    fn base(pm_type: &str, extra: Value) -> NodeDescriptor {
        let mut value = json!({
            "mac": ["aa:bb:cc:dd:ee:ff"],
            "pm_type": pm_type,
            "cpu": 1, "memory": 2048, "disk": 30, "arch": "amd64"
        });
        if let (Some(target), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            target.extend(extra.clone());
        }
        descriptor(value)
    }

    #[test]
    fn test_find_driver_handler() {
        assert_eq!(find_driver_handler("ipmi").unwrap(), DriverFamily::Ipmi);
        assert_eq!(find_driver_handler("pxe_ipmitool").unwrap(), DriverFamily::Ipmi);
        assert_eq!(find_driver_handler("agent_ipmitool").unwrap(), DriverFamily::Ipmi);
        assert_eq!(find_driver_handler("pxe_ipminative").unwrap(), DriverFamily::Ipmi);
        assert_eq!(find_driver_handler("pxe_drac").unwrap(), DriverFamily::Drac);
        assert_eq!(find_driver_handler("iscsi_ilo").unwrap(), DriverFamily::Ilo);
        assert_eq!(find_driver_handler("pxe_ucs").unwrap(), DriverFamily::Ucs);
        assert_eq!(find_driver_handler("pxe_irmc").unwrap(), DriverFamily::Irmc);
        assert_eq!(find_driver_handler("pxe_amt").unwrap(), DriverFamily::Amt);
        assert_eq!(find_driver_handler("pxe_wol").unwrap(), DriverFamily::Wol);
        assert_eq!(find_driver_handler("pxe_iboot").unwrap(), DriverFamily::IBoot);
        assert_eq!(find_driver_handler("fake_pxe").unwrap(), DriverFamily::Fake);
        assert_eq!(find_driver_handler("fake").unwrap(), DriverFamily::Fake);
        assert_eq!(find_driver_handler("pxe_ssh").unwrap(), DriverFamily::Ssh);
        assert_eq!(find_driver_handler("agent_ssh").unwrap(), DriverFamily::Ssh);
    }

    #[test]
    fn test_first_pattern_wins() {
        // Matches both "*_ipmitool" and would never reach the fake patterns
        assert_eq!(find_driver_handler("fake_ipmitool").unwrap(), DriverFamily::Ipmi);
    }

    #[test]
    fn test_unknown_driver_is_invalid_node() {
        let err = find_driver_handler("pxe_magic").unwrap_err();
        assert_matches!(err, Error::InvalidNode { .. });
        assert!(err.to_string().contains("pxe_magic"));
    }

    #[test]
    fn test_ipmi_conversion() {
        let node = base(
            "ipmi",
            json!({"pm_addr": "10.0.0.5", "pm_user": "x", "pm_password": "y"}),
        );
        let conversion = DriverFamily::Ipmi.convert(&node);

        assert!(conversion.warnings.is_empty());
        assert_eq!(
            conversion.driver_info,
            BTreeMap::from([
                ("ipmi_address".to_string(), json!("10.0.0.5")),
                ("ipmi_username".to_string(), json!("x")),
                ("ipmi_password".to_string(), json!("y")),
            ])
        );
    }

    #[test]
    fn test_deprecated_key_is_renamed_with_warning() {
        let node = base(
            "pxe_ipmitool",
            json!({"pm_addr": "10.0.0.5", "pm_privilege_level": "OPERATOR"}),
        );
        let conversion = DriverFamily::Ipmi.convert(&node);

        assert_eq!(conversion.driver_info["ipmi_priv_level"], json!("OPERATOR"));
        assert_eq!(
            conversion.warnings,
            vec![ConversionWarning::Deprecated {
                key: "pm_privilege_level".into(),
                replacement: "ipmi_priv_level".into(),
            }]
        );
    }

    #[test]
    fn test_prefixed_key_passes_through_and_unknown_pm_key_is_dropped() {
        let node = base(
            "pxe_ipmitool",
            json!({"pm_addr": "10.0.0.5", "ipmi_bridging": "single", "pm_foo": "bar", "other": 1}),
        );
        let conversion = DriverFamily::Ipmi.convert(&node);

        assert_eq!(conversion.driver_info["ipmi_bridging"], json!("single"));
        assert!(!conversion.driver_info.contains_key("pm_foo"));
        assert!(!conversion.driver_info.contains_key("other"));
        assert_eq!(
            conversion.warnings,
            vec![ConversionWarning::Unsupported {
                key: "pm_foo".into(),
                driver: "ipmi".into(),
            }]
        );
    }

    #[test]
    fn test_ssh_defaults_and_override() {
        let node = base(
            "pxe_ssh",
            json!({"pm_addr": "192.168.122.1", "pm_user": "stack", "pm_password": "KEY"}),
        );
        let conversion = DriverFamily::Ssh.convert(&node);
        assert_eq!(conversion.driver_info["ssh_virt_type"], json!("virsh"));
        assert_eq!(conversion.driver_info["ssh_key_contents"], json!("KEY"));

        let node = base("pxe_ssh", json!({"pm_addr": "h", "pm_virt_type": "vbox"}));
        let conversion = DriverFamily::Ssh.convert(&node);
        assert_eq!(conversion.driver_info["ssh_virt_type"], json!("vbox"));
        assert_eq!(conversion.warnings.len(), 1);
    }

    #[test]
    fn test_unique_ids() {
        let node = base("pxe_ipmitool", json!({"pm_addr": "10.0.0.5"}));
        assert_eq!(
            DriverFamily::Ipmi.unique_id_from_descriptor(&node).as_deref(),
            Some("10.0.0.5")
        );

        let node = base("pxe_ipmitool", json!({"pm_addr": "10.0.0.5", "pm_port": 6230}));
        assert_eq!(
            DriverFamily::Ipmi.unique_id_from_descriptor(&node).as_deref(),
            Some("10.0.0.5:6230")
        );

        let node = base(
            "pxe_iboot",
            json!({"pm_addr": "10.0.0.9", "pm_port": 9100, "pm_relay_id": 2}),
        );
        assert_eq!(
            DriverFamily::IBoot.unique_id_from_descriptor(&node).as_deref(),
            Some("10.0.0.9:9100#2")
        );

        let node = base("pxe_ilo", json!({"pm_addr": "10.0.0.7", "pm_port": 1}));
        assert_eq!(
            DriverFamily::Ilo.unique_id_from_descriptor(&node).as_deref(),
            Some("10.0.0.7")
        );

        let node = base("pxe_ssh", json!({"pm_addr": "192.168.122.1"}));
        assert_eq!(DriverFamily::Ssh.unique_id_from_descriptor(&node), None);

        let node = base("fake_pxe", json!({}));
        assert_eq!(DriverFamily::Fake.unique_id_from_descriptor(&node), None);
    }

    #[test]
    fn test_unique_id_from_record_without_address() {
        let record = BackendNode {
            uuid: "uuid-1".into(),
            driver: "pxe_ipmitool".into(),
            name: None,
            driver_info: BTreeMap::from([("ipmi_username".to_string(), json!("admin"))]),
            properties: BTreeMap::new(),
        };
        assert_eq!(DriverFamily::Ipmi.unique_id_from_record(&record), None);
    }

    #[test]
    fn test_wol_uses_host_field() {
        let node = base("pxe_wol", json!({"pm_addr": "10.1.1.255", "pm_port": 9}));
        let conversion = DriverFamily::Wol.convert(&node);
        assert_eq!(conversion.driver_info["wol_host"], json!("10.1.1.255"));
        assert_eq!(
            DriverFamily::Wol.unique_id_from_descriptor(&node).as_deref(),
            Some("10.1.1.255:9")
        );
    }
}
