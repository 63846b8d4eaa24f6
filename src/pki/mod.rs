//! Self-signed PKI material
//!
//! A throwaway CA plus leaf certificates signed by it, meant for
//! proof-of-concept deployments. Keystone uses the pair for token signing;
//! the SSL helpers store service certificates in a Heat environment file.
//!
//! Keys are ECDSA P-256, the default of the certificate library.

pub mod keystone;
pub mod ssl;

pub use keystone::{
    create_and_write_ca_and_signing_pairs, generate_certs_into_json, KEYSTONE_CA_NAME,
    KEYSTONE_SIGNING_NAME,
};
pub use ssl::{create_and_write_ssl_ca, generate_cert_into_json};

use crate::error::{Error, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, Issuer, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Validity of every generated certificate
pub const CERT_VALIDITY_DAYS: i64 = 10 * 365;

/// A PEM private key and the PEM certificate for it
#[derive(Clone, PartialEq, Eq)]
pub struct KeyCertPair {
    pub key_pem: String,
    pub cert_pem: String,
}

impl std::fmt::Debug for KeyCertPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCertPair")
            .field("key_pem", &"<redacted>")
            .field("cert_pem", &self.cert_pem)
            .finish()
    }
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, DnValue::Utf8String("XX".to_string()));
    dn.push(DnType::StateOrProvinceName, DnValue::Utf8String("Unset".to_string()));
    dn.push(DnType::LocalityName, DnValue::Utf8String("Unset".to_string()));
    dn.push(DnType::OrganizationName, DnValue::Utf8String("Unset".to_string()));
    dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
    dn
}

fn params(common_name: &str, serial: u64) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(common_name);
    params.serial_number = Some(SerialNumber::from(serial));

    let now = ::time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + ::time::Duration::days(CERT_VALIDITY_DAYS);
    params
}

fn generate_key(what: &str) -> Result<KeyPair> {
    KeyPair::generate().map_err(|e| Error::Pki(format!("failed to generate {what} key: {e}")))
}

/// Create a CA key and self-signed certificate allowed to sign leaf
/// certificates only
pub fn create_ca_pair(common_name: &str, serial: u64) -> Result<KeyCertPair> {
    let mut params = params(common_name, serial);
    params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let key = generate_key("CA")?;
    debug!(common_name, "Generated CA key");
    let cert = params
        .self_signed(&key)
        .map_err(|e| Error::Pki(format!("failed to create CA certificate: {e}")))?;
    debug!(common_name, serial, "Generated CA certificate");

    Ok(KeyCertPair {
        key_pem: key.serialize_pem(),
        cert_pem: cert.pem(),
    })
}

/// Create a key and a certificate for it issued by `ca`
pub fn create_signing_pair(ca: &KeyCertPair, common_name: &str, serial: u64) -> Result<KeyCertPair> {
    let ca_key = KeyPair::from_pem(&ca.key_pem)
        .map_err(|e| Error::Pki(format!("failed to load CA key: {e}")))?;
    let issuer = Issuer::from_ca_cert_pem(&ca.cert_pem, &ca_key)
        .map_err(|e| Error::Pki(format!("failed to load CA certificate: {e}")))?;

    let mut params = params(common_name, serial);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];

    let key = generate_key("signing")?;
    debug!(common_name, "Generated signing key");
    let cert = params
        .signed_by(&key, &issuer)
        .map_err(|e| Error::Pki(format!("failed to sign certificate: {e}")))?;
    debug!(common_name, serial, "Generated signing certificate");

    Ok(KeyCertPair {
        key_pem: key.serialize_pem(),
        cert_pem: cert.pem(),
    })
}

// =============================================================================
// Files
// =============================================================================

/// Write a PEM file readable by the owner only
fn write_pki_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    debug!(path = %path.display(), "Wrote PKI file");
    Ok(())
}

/// File names written by [`write_ca_and_signing_files`]
pub const PKI_FILES: [&str; 4] = ["ca_key.pem", "ca_cert.pem", "signing_key.pem", "signing_cert.pem"];

/// Write a CA and signing pair as [`PKI_FILES`] into `directory`, creating it
/// when missing
pub(crate) fn write_ca_and_signing_files(
    directory: &Path,
    ca: &KeyCertPair,
    signing: &KeyCertPair,
) -> Result<()> {
    if !directory.is_dir() {
        std::fs::create_dir_all(directory)?;
    }
    let contents = [&ca.key_pem, &ca.cert_pem, &signing.key_pem, &signing.cert_pem];
    for (name, pem) in PKI_FILES.iter().zip(contents) {
        write_pki_file(&directory.join(name), pem)?;
    }
    Ok(())
}

/// Read a JSON object from `path`; a missing file is an empty object
pub(crate) fn read_json_object(path: &Path) -> Result<Map<String, Value>> {
    if !path.is_file() {
        return Ok(Map::new());
    }
    match serde_json::from_str(&std::fs::read_to_string(path)?)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Pki(format!(
            "{} does not contain a JSON object",
            path.display()
        ))),
    }
}

pub(crate) fn write_json_object(path: &Path, data: &Map<String, Value>) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(data)?)?;
    debug!(path = %path.display(), "Wrote key/certs");
    Ok(())
}

/// Object at `key` inside `parent`, created when missing
pub(crate) fn child_object<'a>(
    parent: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Map<String, Value>> {
    parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| Error::Pki(format!("{key} is not a JSON object")))
}
