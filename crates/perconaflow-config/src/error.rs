use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Cluster file not found. Looked in:\n\
        - current directory: cluster.local.kdl, cluster.kdl\n\
        - ./.perconaflow/ directory\n\
        - ~/.config/perconaflow/cluster.kdl\n\
        Set PERCONAFLOW_CONFIG_PATH to point at a file directly"
    )]
    ClusterFileNotFound,

    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing `{0}` node")]
    MissingNode(&'static str),

    #[error("Invalid value for `{key}`: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConfigError {
    pub(crate) fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
