//! Error types for os-cloud-config
//!
//! Provides structured error types for every bootstrap component including
//! node registration, OpenStack service calls, flavors, Keystone and PKI.

use thiserror::Error;

/// Unified error type for the toolkit
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{}", missing_environment_message(.variables))]
    MissingEnvironment { variables: Vec<String> },

    // =========================================================================
    // Node Registration Errors
    // =========================================================================
    #[error("Invalid node: {reason}{}", .node.as_ref().map(|n| format!(" (node: {n})")).unwrap_or_default())]
    InvalidNode { reason: String, node: Option<String> },

    // =========================================================================
    // OpenStack Service Errors
    // =========================================================================
    #[error("Connection refused by {service}: {reason}")]
    ConnectionRefused { service: String, reason: String },

    #[error("Service {service} temporarily unavailable: {reason}")]
    TemporarilyUnavailable { service: String, reason: String },

    #[error("Service unavailable after {attempts} attempts: {operation}")]
    ServiceUnavailable { operation: String, attempts: u32 },

    #[error("Conflict reported by {service}: {reason}")]
    Conflict { service: String, reason: String },

    #[error("Resource not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    #[error("OpenStack API error: {service} returned {status}: {reason}")]
    Api {
        service: String,
        status: u16,
        reason: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // PKI Errors
    // =========================================================================
    #[error("PKI error: {0}")]
    Pki(String),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn missing_environment_message(variables: &[String]) -> String {
    let plural = if variables.len() == 1 { " is" } else { "s are" };
    format!(
        "{} environment variable{} required to be set.",
        variables.join(", "),
        plural
    )
}

impl Error {
    /// Check if this error is transient (the service may come back)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ConnectionRefused { .. } | Error::TemporarilyUnavailable { .. }
        )
    }

    /// Check if the backend rejected the call because the resource is locked
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this error is retryable by any of the retry policies
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || self.is_conflict()
    }

    /// Build an `InvalidNode` error without a node rendering
    pub fn invalid_node(reason: impl Into<String>) -> Self {
        Error::InvalidNode {
            reason: reason.into(),
            node: None,
        }
    }
}

/// Result type alias for the toolkit
pub type Result<T> = std::result::Result<T, Error>;
