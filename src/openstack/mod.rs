//! OpenStack service clients
//!
//! Thin `reqwest` adapters implementing the domain ports against the REST APIs
//! of Keystone (v2), Ironic, Nova, Glance (v1) and Neutron (v2.0). A [`Session`]
//! authenticates once and hands out clients for the services in its catalog.

pub mod glance;
pub mod ironic;
pub mod keystone;
pub mod neutron;
pub mod nova;
pub mod session;

pub use glance::GlanceClient;
pub use ironic::IronicClient;
pub use keystone::KeystoneAdminClient;
pub use neutron::NeutronClient;
pub use nova::NovaClient;
pub use session::Session;

use crate::error::{Error, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Build the HTTP client shared by every service, trusting `cacert` in
/// addition to the system roots
pub fn build_http_client(cacert: Option<&Path>) -> Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT);

    if let Some(path) = cacert {
        let pem = std::fs::read(path)?;
        let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
            Error::Configuration(format!("invalid CA certificate {}: {e}", path.display()))
        })?;
        builder = builder.add_root_certificate(cert);
    }

    Ok(builder.build()?)
}

/// Error for a non-success response from `service`
pub(crate) fn error_for_status(service: &str, path: &str, status: StatusCode, body: &str) -> Error {
    let reason = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no reason").to_string()
    } else {
        body.trim().to_string()
    };

    match status {
        StatusCode::CONFLICT => Error::Conflict {
            service: service.to_string(),
            reason,
        },
        StatusCode::SERVICE_UNAVAILABLE => Error::TemporarilyUnavailable {
            service: service.to_string(),
            reason,
        },
        StatusCode::NOT_FOUND => Error::NotFound {
            kind: service.to_string(),
            name: path.to_string(),
        },
        _ => Error::Api {
            service: service.to_string(),
            status: status.as_u16(),
            reason,
        },
    }
}

/// Catalog URLs usually stop at the port; append the API version once
pub(crate) fn versioned_url(endpoint: &str, version: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.ends_with(&format!("/{version}")) {
        endpoint.to_string()
    } else {
        format!("{endpoint}/{version}")
    }
}

pub(crate) fn send_error(service: &str, err: reqwest::Error) -> Error {
    if err.is_connect() {
        Error::ConnectionRefused {
            service: service.to_string(),
            reason: err.to_string(),
        }
    } else {
        Error::Http(err)
    }
}

// =============================================================================
// Service Client
// =============================================================================

/// Authenticated access to one service endpoint
#[derive(Clone)]
pub(crate) struct ServiceClient {
    service: &'static str,
    base_url: String,
    token: String,
    http: Client,
}

impl ServiceClient {
    pub(crate) fn new(service: &'static str, base_url: &str, token: &str, http: Client) -> Self {
        Self {
            service,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        }
    }

    #[cfg(test)]
    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(service = self.service, %method, %url, "OpenStack request");
        self.http
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, &self.token)
    }

    /// Send `request`, turning failures into service errors
    pub(crate) async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| send_error(self.service, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(self.service, path, status, &body))
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path, self.request(Method::GET, path)).await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .send(path, self.request(Method::POST, path).json(body))
            .await?;
        Ok(response.json().await?)
    }

    /// PUT whose response body is ignored
    pub(crate) async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(path, self.request(Method::PUT, path).json(body))
            .await?;
        Ok(())
    }

    /// POST whose response body is ignored
    pub(crate) async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(path, self.request(Method::POST, path).json(body))
            .await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        self.send(path, self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_status_mapping() {
        assert_matches!(
            error_for_status("ironic", "/v1/nodes/x", StatusCode::CONFLICT, "Node x is locked"),
            Error::Conflict { ref reason, .. } if reason == "Node x is locked"
        );
        assert_matches!(
            error_for_status("ironic", "/v1/nodes", StatusCode::SERVICE_UNAVAILABLE, ""),
            Error::TemporarilyUnavailable { ref reason, .. } if reason == "Service Unavailable"
        );
        assert_matches!(
            error_for_status("glance", "/v1/images/x", StatusCode::NOT_FOUND, ""),
            Error::NotFound { ref kind, ref name } if kind == "glance" && name == "/v1/images/x"
        );
        assert_matches!(
            error_for_status("nova", "/flavors", StatusCode::BAD_REQUEST, "bad"),
            Error::Api { status: 400, .. }
        );
    }

    #[test]
    fn test_versioned_url() {
        assert_eq!(versioned_url("http://192.0.2.1:6385", "v1"), "http://192.0.2.1:6385/v1");
        assert_eq!(versioned_url("http://192.0.2.1:6385/", "v1"), "http://192.0.2.1:6385/v1");
        assert_eq!(versioned_url("http://192.0.2.1:6385/v1/", "v1"), "http://192.0.2.1:6385/v1");
        assert_eq!(versioned_url("http://192.0.2.1:9696", "v2.0"), "http://192.0.2.1:9696/v2.0");
    }

    #[test]
    fn test_retry_classification_of_mapped_errors() {
        assert!(error_for_status("ironic", "/", StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(error_for_status("ironic", "/", StatusCode::CONFLICT, "").is_conflict());
        assert!(!error_for_status("ironic", "/", StatusCode::INTERNAL_SERVER_ERROR, "").is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let client = ServiceClient::new("ironic", "http://127.0.0.1:1", "token", build_http_client(None).unwrap());
        let err = client.get::<serde_json::Value>("/v1/nodes").await.unwrap_err();
        assert_matches!(err, Error::ConnectionRefused { .. });
        assert!(err.is_transient());
    }
}
