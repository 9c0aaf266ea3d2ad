use anyhow::Context;
use colored::Colorize;
use perconaflow_cloud::CloudProvider;
use perconaflow_cloud_aws::{AwsProvider, AwsSettings};
use perconaflow_cloud_gcp::{GcpProvider, GcpSettings};
use perconaflow_config::{CloudKind, ClusterConfig, ProviderSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Resolve and parse the cluster file. `--config` wins over discovery.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<(PathBuf, ClusterConfig)> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => perconaflow_config::find_cluster_file()?,
    };
    tracing::debug!("Loading cluster file {}", path.display());
    let config = perconaflow_config::parse_cluster_file(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok((path, config))
}

/// Adapter for the configured cloud
pub fn build_provider(
    settings: &ProviderSettings,
    cancel: CancellationToken,
) -> anyhow::Result<Arc<dyn CloudProvider>> {
    tracing::debug!("Building {} provider", settings.cloud);
    let provider: Arc<dyn CloudProvider> = match settings.cloud {
        CloudKind::Aws => Arc::new(AwsProvider::new(AwsSettings::from_provider(settings)?, cancel)),
        CloudKind::Gcp => Arc::new(GcpProvider::new(GcpSettings::from_provider(settings)?, cancel)),
    };
    Ok(provider)
}

/// Token cancelled on the first Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, cancelling...".yellow());
            token.cancel();
        }
    });
    cancel
}

pub fn print_loaded_config(path: &Path) {
    eprintln!("Cluster file: {}", path.display().to_string().cyan());
}
