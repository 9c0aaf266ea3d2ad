//! Remote execution error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("Key error: {0}")]
    Key(#[from] russh_keys::Error),

    #[error("Authentication rejected for {user}@{host}")]
    AuthenticationRejected { user: String, host: String },

    #[error("Connection to {host} timed out")]
    ConnectTimeout { host: String },

    /// Non-zero exit status. `output` holds combined stdout and stderr so
    /// callers can match on it.
    #[error("Command exited with status {status}: {output}")]
    CommandFailed { status: u32, output: String },

    #[error("Channel closed without an exit status: {output}")]
    NoExitStatus { output: String },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("SFTP on {path} failed: {source}")]
    Sftp {
        path: String,
        #[source]
        source: russh_sftp::client::error::Error,
    },

    #[error("Edit of {path} failed: {source}")]
    Edit {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    pub fn sftp(path: &str, source: russh_sftp::client::error::Error) -> Self {
        RemoteError::Sftp {
            path: path.to_string(),
            source,
        }
    }

    /// Combined output of a failed command, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            RemoteError::CommandFailed { output, .. } | RemoteError::NoExitStatus { output } => {
                Some(output)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
