//! Google Cloud provider error types

use perconaflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("gcloud not found. Please install the Google Cloud SDK")]
    GcloudNotFound,

    #[error("gcloud command failed: {0}")]
    CommandFailed(String),

    /// Non-success HTTP status from the Compute API
    #[error("{operation} failed with {status}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    /// A long-running operation finished with errors
    #[error("{operation} operation failed: {message}")]
    Operation { operation: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

impl GcpError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GcpError::Api { status: 404, .. })
    }
}

impl From<GcpError> for CloudError {
    fn from(err: GcpError) -> Self {
        match err {
            GcpError::Cloud(e) => e,
            GcpError::GcloudNotFound | GcpError::CommandFailed(_) => {
                CloudError::AuthenticationFailed(err.to_string())
            }
            GcpError::Api {
                operation,
                status,
                message,
            } => CloudError::Api {
                operation,
                message: format!("HTTP {}: {}", status, message),
            },
            GcpError::Operation { operation, message } => CloudError::Api { operation, message },
            GcpError::Http(e) => CloudError::api("Compute API request", e),
            GcpError::Json(e) => CloudError::Json(e),
            GcpError::Io(e) => CloudError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, GcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_maps_operation() {
        let err = GcpError::Api {
            operation: "insert network".to_string(),
            status: 409,
            message: "already exists".to_string(),
        };
        assert!(!err.is_not_found());

        match CloudError::from(err) {
            CloudError::Api { operation, message } => {
                assert_eq!(operation, "insert network");
                assert_eq!(message, "HTTP 409: already exists");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cloud_error_passes_through() {
        let err = GcpError::Cloud(CloudError::Cancelled("operation".to_string()));
        assert!(matches!(CloudError::from(err), CloudError::Cancelled(_)));
    }
}
