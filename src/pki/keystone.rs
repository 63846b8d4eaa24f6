//! Keystone token-signing material

use super::{
    child_object, create_ca_pair, create_signing_pair, read_json_object, write_ca_and_signing_files,
    write_json_object,
};
use crate::error::Result;
use serde_json::Value;
use std::path::Path;
use tracing::info;

pub const KEYSTONE_CA_NAME: &str = "Keystone CA";
pub const KEYSTONE_SIGNING_NAME: &str = "Keystone Signing";

const CA_SERIAL: u64 = 1;
const SIGNING_SERIAL: u64 = 2;

/// Write `ca_key.pem`, `ca_cert.pem`, `signing_key.pem` and
/// `signing_cert.pem` into `directory`, readable by the owner only
pub fn create_and_write_ca_and_signing_pairs(directory: &Path) -> Result<()> {
    let ca = create_ca_pair(KEYSTONE_CA_NAME, CA_SERIAL)?;
    let signing = create_signing_pair(&ca, KEYSTONE_SIGNING_NAME, SIGNING_SERIAL)?;

    write_ca_and_signing_files(directory, &ca, &signing)?;
    info!(directory = %directory.display(), "Wrote Keystone PKI files");
    Ok(())
}

struct JsonLayout {
    parent: &'static str,
    ca_cert: &'static str,
    signing_key: &'static str,
    signing_cert: &'static str,
}

const HEAT_LAYOUT: JsonLayout = JsonLayout {
    parent: "parameter_defaults",
    ca_cert: "KeystoneCACertificate",
    signing_key: "KeystoneSigningKey",
    signing_cert: "KeystoneSigningCertificate",
};

const SEED_LAYOUT: JsonLayout = JsonLayout {
    parent: "keystone",
    ca_cert: "ca_certificate",
    signing_key: "signing_key",
    signing_cert: "signing_certificate",
};

/// Add the CA certificate and signing pair to a JSON environment file.
///
/// Seed machines use a different layout. A file already holding all three
/// values is left untouched; returns whether the file was written.
pub fn generate_certs_into_json(path: &Path, seed: bool) -> Result<bool> {
    let layout = if seed { &SEED_LAYOUT } else { &HEAT_LAYOUT };
    let mut data = read_json_object(path)?;
    let parent = child_object(&mut data, layout.parent)?;

    if [layout.ca_cert, layout.signing_key, layout.signing_cert]
        .iter()
        .all(|key| parent.contains_key(*key))
    {
        info!(path = %path.display(), "Key/certs are already present, skipping");
        return Ok(false);
    }

    let ca = create_ca_pair(KEYSTONE_CA_NAME, CA_SERIAL)?;
    let signing = create_signing_pair(&ca, KEYSTONE_SIGNING_NAME, SIGNING_SERIAL)?;
    parent.insert(layout.ca_cert.to_string(), Value::String(ca.cert_pem));
    parent.insert(layout.signing_key.to_string(), Value::String(signing.key_pem));
    parent.insert(layout.signing_cert.to_string(), Value::String(signing.cert_pem));

    write_json_object(path, &data)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::test_support::{common_name, with_cert};
    use serde_json::json;

    #[test]
    fn test_write_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("keystone-pki");

        create_and_write_ca_and_signing_pairs(&target).unwrap();

        for name in ["ca_key.pem", "ca_cert.pem", "signing_key.pem", "signing_cert.pem"] {
            let path = target.join(name);
            assert!(path.is_file(), "{name}");
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = std::fs::metadata(&path).unwrap().permissions().mode();
                assert_eq!(mode & 0o777, 0o600, "{name}");
            }
        }

        let cert = std::fs::read_to_string(target.join("signing_cert.pem")).unwrap();
        with_cert(&cert, |cert| assert_eq!(common_name(cert), KEYSTONE_SIGNING_NAME));
    }

    #[test]
    fn test_generate_into_heat_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");
        std::fs::write(&path, r#"{"parameter_defaults": {"Other": 1}}"#).unwrap();

        assert!(generate_certs_into_json(&path, false).unwrap());

        let data: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let defaults = &data["parameter_defaults"];
        assert_eq!(defaults["Other"], json!(1));
        with_cert(defaults["KeystoneCACertificate"].as_str().unwrap(), |cert| {
            assert_eq!(common_name(cert), KEYSTONE_CA_NAME)
        });
        assert!(defaults["KeystoneSigningKey"].as_str().unwrap().contains("PRIVATE KEY"));
        assert!(defaults["KeystoneSigningCertificate"].is_string());
    }

    #[test]
    fn test_seed_layout_and_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");

        assert!(generate_certs_into_json(&path, true).unwrap());
        let first = std::fs::read_to_string(&path).unwrap();
        let data: Value = serde_json::from_str(&first).unwrap();
        assert!(data["keystone"]["ca_certificate"].is_string());
        assert!(data["keystone"]["signing_key"].is_string());
        assert!(data["keystone"]["signing_certificate"].is_string());

        assert!(!generate_certs_into_json(&path, true).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }
}
