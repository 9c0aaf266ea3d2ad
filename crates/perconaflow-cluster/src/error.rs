//! Cluster provisioning error types

use perconaflow_cloud::{CloudError, ResourceId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    /// A step on one node failed; `node` is the instance's public address
    #[error("{node}: {step}: {source}")]
    Step {
        node: String,
        step: String,
        #[source]
        source: Box<ClusterError>,
    },

    /// A create failed part way; whatever exists belongs to `resource_id`
    #[error("create {resource_id} failed: {source}")]
    Create {
        resource_id: ResourceId,
        #[source]
        source: Box<ClusterError>,
    },

    #[error("Version {requested} not found, available versions: {available:?}")]
    VersionNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error("No available versions of {0}")]
    NoVersions(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid PMM address `{address}`: {message}")]
    InvalidPmmAddress { address: String, message: String },

    #[error("PMM API {operation} failed: {message}")]
    PmmApi { operation: String, message: String },

    #[error("Telemetry report failed: {0}")]
    Telemetry(String),

    #[error("RDS instance {0} is not found")]
    RdsNotFound(String),

    #[error("Unexpected output of `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// The innermost error, past every `Step` and `Create` wrapper
    pub fn root(&self) -> &ClusterError {
        match self {
            ClusterError::Step { source, .. } | ClusterError::Create { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// ResourceID left behind by a failed create
    pub fn resource_id(&self) -> Option<&ResourceId> {
        match self {
            ClusterError::Create { resource_id, .. } => Some(resource_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;

/// Names the node and step a failure belongs to
pub trait StepContext<T> {
    fn step(self, node: &str, step: &str) -> Result<T>;
}

impl<T, E: Into<ClusterError>> StepContext<T> for std::result::Result<T, E> {
    fn step(self, node: &str, step: &str) -> Result<T> {
        self.map_err(|e| ClusterError::Step {
            node: node.to_string(),
            step: step.to_string(),
            source: Box::new(e.into()),
        })
    }
}
