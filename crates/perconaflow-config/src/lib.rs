//! PerconaFlow configuration
//!
//! Typed cluster configuration, its KDL loader and cluster file discovery.

pub mod error;
pub mod model;
pub mod parser;

pub use error::*;
pub use model::*;
pub use parser::{parse_cluster_file, parse_cluster_str, parse_provider_str};

use std::path::PathBuf;

const CONFIG_PATH_ENV: &str = "PERCONAFLOW_CONFIG_PATH";
const CANDIDATES: [&str; 2] = ["cluster.local.kdl", "cluster.kdl"];

/// PerconaFlow's config directory (`~/.config/perconaflow`)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("perconaflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the cluster file
///
/// Search order:
/// 1. `PERCONAFLOW_CONFIG_PATH`
/// 2. current directory: `cluster.local.kdl`, `cluster.kdl`
/// 3. `./.perconaflow/`, same order
/// 4. `~/.config/perconaflow/cluster.kdl`
pub fn find_cluster_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at a missing file: {}", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".perconaflow");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("perconaflow").join("cluster.kdl");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ClusterFileNotFound)
}
