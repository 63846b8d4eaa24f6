//! Service SSL certificates stored in a Heat environment
//!
//! With a top-level `parameters` object the certificate for `<name>` lives in
//! `parameters.<name>SSLCertificate` / `<name>SSLCertificateKey` and the CA in
//! `parameters.CaSSLCertificate` / `CaSSLCertificateKey`. Otherwise the
//! certificate goes to `<name>.ssl.certificate` / `certificate_key` and the CA
//! to `ssl.ca_certificate` / `ca_certificate_key`. A counter next to the CA
//! provides certificate serials.
//!
//! A standalone CA with a signing pair can also be written to a directory.

use super::{
    child_object, create_ca_pair, create_signing_pair, read_json_object, write_ca_and_signing_files,
    write_json_object, KeyCertPair, PKI_FILES,
};
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

pub const SSL_CA_NAME: &str = "os-cloud-config CA";
pub const SSL_SIGNING_NAME: &str = "os-cloud-config Signing";
const CA_SERIAL: u64 = 1;
const SIGNING_SERIAL: u64 = 2;

/// Where one certificate and the CA live in the environment
struct Layout {
    cert_path: Vec<String>,
    cert: String,
    cert_key: String,
    ca_path: Vec<String>,
    ca_cert: &'static str,
    ca_key: &'static str,
    counter: &'static str,
    /// Counter spelling found in older environment files
    legacy_counter: Option<&'static str>,
}

impl Layout {
    fn for_environment(data: &Map<String, Value>, name: &str) -> Self {
        if data.contains_key("parameters") {
            Self {
                cert_path: vec!["parameters".into()],
                cert: format!("{name}SSLCertificate"),
                cert_key: format!("{name}SSLCertificateKey"),
                ca_path: vec!["parameters".into()],
                ca_cert: "CaSSLCertificate",
                ca_key: "CaSSLCertificateKey",
                counter: "SSLCertificateCount",
                legacy_counter: Some("SSLCertificatCount"),
            }
        } else {
            Self {
                cert_path: vec![name.to_string(), "ssl".into()],
                cert: "certificate".into(),
                cert_key: "certificate_key".into(),
                ca_path: vec!["ssl".into()],
                ca_cert: "ca_certificate",
                ca_key: "ca_certificate_key",
                counter: "certificate_count",
                legacy_counter: None,
            }
        }
    }
}

fn object_at<'a>(data: &'a mut Map<String, Value>, path: &[String]) -> Result<&'a mut Map<String, Value>> {
    let mut current = data;
    for key in path {
        current = child_object(current, key)?;
    }
    Ok(current)
}

fn string_field(map: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::Pki(format!("{key} is not a PEM string"))),
    }
}

/// Existing CA from the environment, or a new one stored there
fn ensure_ca(ca_parent: &mut Map<String, Value>, layout: &Layout) -> Result<KeyCertPair> {
    let cert = string_field(ca_parent, layout.ca_cert)?;
    let key = string_field(ca_parent, layout.ca_key)?;

    match (cert, key) {
        (Some(cert_pem), Some(key_pem)) => Ok(KeyCertPair { key_pem, cert_pem }),
        (None, None) => {
            let ca = create_ca_pair(SSL_CA_NAME, CA_SERIAL)?;
            ca_parent.insert(layout.ca_key.to_string(), Value::String(ca.key_pem.clone()));
            ca_parent.insert(layout.ca_cert.to_string(), Value::String(ca.cert_pem.clone()));
            Ok(ca)
        }
        _ => Err(Error::Pki("Only one of CA certificate or key defined.".into())),
    }
}

/// Serial for the next certificate; the counter holds the last one issued
fn next_serial(ca_parent: &mut Map<String, Value>, layout: &Layout) -> u64 {
    let legacy = layout
        .legacy_counter
        .and_then(|key| ca_parent.remove(key))
        .and_then(|value| value.as_u64());
    ca_parent
        .get(layout.counter)
        .and_then(Value::as_u64)
        .or(legacy)
        .unwrap_or(0)
        + 1
}

/// Create a certificate for `name`, signed by the environment's CA, and store
/// it in the Heat environment at `path`.
///
/// An existing certificate is kept unless `overwrite` is set; returns whether
/// the file was written.
pub fn generate_cert_into_json(path: &Path, name: &str, overwrite: bool) -> Result<bool> {
    let mut data = read_json_object(path)?;
    let layout = Layout::for_environment(&data, name);

    let parent = object_at(&mut data, &layout.cert_path)?;
    let has_cert = parent.contains_key(&layout.cert);
    let has_key = parent.contains_key(&layout.cert_key);

    if has_cert != has_key && !overwrite {
        return Err(Error::Pki("Only one of certificate or key defined.".into()));
    }
    if has_cert && !overwrite {
        info!(path = %path.display(), name, "Key/certs are already present, skipping");
        return Ok(false);
    }

    let ca_parent = object_at(&mut data, &layout.ca_path)?;
    let ca = ensure_ca(ca_parent, &layout)?;
    let serial = next_serial(ca_parent, &layout);
    ca_parent.insert(layout.counter.to_string(), Value::from(serial));

    let cert = create_signing_pair(&ca, name, serial)?;
    let parent = object_at(&mut data, &layout.cert_path)?;
    parent.insert(layout.cert_key.clone(), Value::String(cert.key_pem));
    parent.insert(layout.cert.clone(), Value::String(cert.cert_pem));

    write_json_object(path, &data)?;
    info!(path = %path.display(), name, serial, "Wrote SSL certificate");
    Ok(true)
}

/// Write a self-signed CA and a signing pair into `directory`.
///
/// Existing files are kept unless `overwrite` is set; returns whether the
/// files were written.
pub fn create_and_write_ssl_ca(directory: &Path, overwrite: bool) -> Result<bool> {
    if !overwrite && PKI_FILES.iter().any(|name| directory.join(name).exists()) {
        info!(directory = %directory.display(), "CA files are already present, skipping");
        return Ok(false);
    }

    let ca = create_ca_pair(SSL_CA_NAME, CA_SERIAL)?;
    let signing = create_signing_pair(&ca, SSL_SIGNING_NAME, SIGNING_SERIAL)?;
    write_ca_and_signing_files(directory, &ca, &signing)?;
    info!(directory = %directory.display(), "Wrote SSL CA files");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::test_support::{common_name, with_cert};
    use assert_matches::assert_matches;

    fn read(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_parameters_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");
        std::fs::write(&path, r#"{"parameters": {}}"#).unwrap();

        assert!(generate_cert_into_json(&path, "Swift", false).unwrap());
        let data = read(&path);
        let params = &data["parameters"];

        assert!(params["CaSSLCertificate"].is_string());
        assert!(params["CaSSLCertificateKey"].is_string());
        assert_eq!(params["SSLCertificateCount"], 1);
        let ca_subject = with_cert(params["CaSSLCertificate"].as_str().unwrap(), |c| c.subject().to_string());
        with_cert(params["SwiftSSLCertificate"].as_str().unwrap(), |cert| {
            assert_eq!(common_name(cert), "Swift");
            assert_eq!(cert.issuer().to_string(), ca_subject);
            assert_eq!(cert.tbs_certificate.serial.to_string(), "1");
        });
    }

    #[test]
    fn test_nested_layout_reuses_ca() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");

        assert!(generate_cert_into_json(&path, "nova", false).unwrap());
        let first = read(&path);
        assert!(first["nova"]["ssl"]["certificate"].is_string());
        assert!(first["nova"]["ssl"]["certificate_key"].is_string());

        assert!(generate_cert_into_json(&path, "glance", false).unwrap());
        let second = read(&path);
        assert_eq!(second["ssl"]["ca_certificate"], first["ssl"]["ca_certificate"]);
        assert_eq!(second["ssl"]["certificate_count"], 2);
        assert_eq!(second["nova"], first["nova"]);
        with_cert(second["glance"]["ssl"]["certificate"].as_str().unwrap(), |cert| {
            assert_eq!(cert.tbs_certificate.serial.to_string(), "2");
        });
    }

    #[test]
    fn test_existing_certificate_is_kept_unless_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");

        generate_cert_into_json(&path, "nova", false).unwrap();
        let before = read(&path);
        assert!(!generate_cert_into_json(&path, "nova", false).unwrap());
        assert_eq!(read(&path), before);

        assert!(generate_cert_into_json(&path, "nova", true).unwrap());
        assert_ne!(read(&path)["nova"], before["nova"]);
    }

    #[test]
    fn test_half_present_pairs_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");

        std::fs::write(&path, r#"{"parameters": {"novaSSLCertificate": "x"}}"#).unwrap();
        assert_matches!(
            generate_cert_into_json(&path, "nova", false),
            Err(Error::Pki(ref m)) if m.contains("certificate or key")
        );

        std::fs::write(&path, r#"{"parameters": {"CaSSLCertificate": "x"}}"#).unwrap();
        assert_matches!(
            generate_cert_into_json(&path, "nova", false),
            Err(Error::Pki(ref m)) if m.contains("CA certificate or key")
        );
    }

    #[test]
    fn test_counter_with_older_spelling_is_continued() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");
        std::fs::write(&path, r#"{"parameters": {"SSLCertificatCount": 4}}"#).unwrap();

        assert!(generate_cert_into_json(&path, "Swift", false).unwrap());
        let data = read(&path);
        let params = &data["parameters"];
        assert_eq!(params["SSLCertificateCount"], 5);
        assert!(params.get("SSLCertificatCount").is_none());
        with_cert(params["SwiftSSLCertificate"].as_str().unwrap(), |cert| {
            assert_eq!(cert.tbs_certificate.serial.to_string(), "5");
        });
    }

    #[test]
    fn test_ssl_ca_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ca");

        assert!(create_and_write_ssl_ca(&target, false).unwrap());
        for name in PKI_FILES {
            let path = target.join(name);
            assert!(path.is_file(), "{name}");
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = std::fs::metadata(&path).unwrap().permissions().mode();
                assert_eq!(mode & 0o777, 0o600, "{name}");
            }
        }

        let read_pem = |name: &str| std::fs::read_to_string(target.join(name)).unwrap();
        let ca_subject = with_cert(&read_pem("ca_cert.pem"), |cert| {
            assert_eq!(common_name(cert), SSL_CA_NAME);
            cert.subject().to_string()
        });
        with_cert(&read_pem("signing_cert.pem"), |cert| {
            assert_eq!(common_name(cert), SSL_SIGNING_NAME);
            assert_eq!(cert.issuer().to_string(), ca_subject);
        });

        let before = read_pem("ca_cert.pem");
        assert!(!create_and_write_ssl_ca(&target, false).unwrap());
        assert_eq!(read_pem("ca_cert.pem"), before);

        assert!(create_and_write_ssl_ca(&target, true).unwrap());
        assert_ne!(read_pem("ca_cert.pem"), before);
    }
}
