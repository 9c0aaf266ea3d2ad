//! Private key handling
//!
//! Keys live at `{dir}/{name}.pem`. A missing key is generated with
//! `ssh-keygen`; an existing one is never overwritten.

use crate::error::{RemoteError, Result};
use russh_keys::PublicKeyBase64;
use russh_keys::key::KeyPair;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Load a private key without a passphrase
pub fn load_private_key(path: &Path) -> Result<KeyPair> {
    Ok(russh_keys::load_secret_key(path, None)?)
}

/// OpenSSH `authorized_keys` form of the key's public half (`<algo> <base64>`)
pub fn public_key_openssh(key: &KeyPair) -> Result<String> {
    let public = key.clone_public_key()?;
    Ok(format!("{} {}", public.name(), public.public_key_base64()))
}

/// Reads the public key for `path`, generating a new ed25519 key pair first
/// when the file does not exist yet.
pub async fn ensure_key_pair(path: &Path, comment: &str) -> Result<String> {
    if !path.exists() {
        generate_key_pair(path, comment).await?;
    }
    let key = load_private_key(path)?;
    public_key_openssh(&key)
}

async fn generate_key_pair(path: &Path, comment: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    tracing::info!("Generating key pair at {}", path.display());

    let output = Command::new("ssh-keygen")
        .args(["-q", "-t", "ed25519", "-N", "", "-C", comment, "-f"])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| RemoteError::KeyGeneration(format!("failed to run ssh-keygen: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RemoteError::KeyGeneration(stderr.trim().to_string()));
    }
    Ok(())
}

/// The algorithm and key blob of an OpenSSH public key line, without comment.
/// Two keys are the same key when these match byte for byte.
pub fn key_material(public_key: &str) -> Option<(&str, &str)> {
    let mut parts = public_key.split_whitespace();
    Some((parts.next()?, parts.next()?))
}

/// Whether two OpenSSH public key lines describe the same key
pub fn same_public_key(a: &str, b: &str) -> bool {
    match (key_material(a), key_material(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
