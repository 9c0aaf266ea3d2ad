//! gcloud CLI token source
//!
//! Compute API calls authenticate with the active gcloud account's access
//! token. Tokens are cached and refreshed before they expire.

use crate::error::{GcpError, Result};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;

/// gcloud issues tokens valid for an hour
const TOKEN_LIFETIME: Duration = Duration::from_secs(45 * 60);

#[derive(Default)]
pub struct TokenSource {
    cached: Mutex<Option<(String, Instant)>>,
}

impl TokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, issued)) = cached.as_ref() {
            if issued.elapsed() < TOKEN_LIFETIME {
                return Ok(token.clone());
            }
        }

        let token = run_gcloud(&["auth", "print-access-token"]).await?;
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(GcpError::CommandFailed("gcloud returned an empty token".into()));
        }
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }
}

/// Run a gcloud command and return stdout
async fn run_gcloud(args: &[&str]) -> Result<String> {
    tracing::debug!("Running: gcloud {}", args.join(" "));

    let output = Command::new("gcloud")
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GcpError::GcloudNotFound,
            _ => GcpError::Io(e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GcpError::CommandFailed(stderr.trim().to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
