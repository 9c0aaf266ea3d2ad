//! Cloud provider error types

use perconaflow_remote::RemoteError;
use std::path::PathBuf;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A cloud API call failed. `operation` names the call.
    #[error("{operation} failed: {message}")]
    Api { operation: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource {0} is not configured, call configure first")]
    NotConfigured(String),

    #[error(
        "Key pair `{name}` already exists in the cloud but does not match the local key {}",
        path.display()
    )]
    KeyPairMismatch { name: String, path: PathBuf },

    #[error("Remote execution on {host} failed: {source}")]
    Remote {
        host: String,
        #[source]
        source: RemoteError,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn api(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Api {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn remote(host: impl Into<String>, source: RemoteError) -> Self {
        Self::Remote {
            host: host.into(),
            source,
        }
    }

    /// Output of the failed remote command, when this is one
    pub fn remote_output(&self) -> Option<&str> {
        match self {
            CloudError::Remote { source, .. } => source.output(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
