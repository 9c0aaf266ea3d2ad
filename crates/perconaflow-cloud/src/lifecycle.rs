//! Instance readiness
//!
//! After the cloud reports instances healthy, sshd may still be starting.
//! These helpers block until every instance accepts an authenticated session.

use crate::error::{CloudError, Result};
use crate::poll::{PollConfig, poll_until};
use crate::provider::Instance;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use perconaflow_remote::RemoteExecutor;
use std::path::Path;

/// Login user of the Ubuntu images both clouds boot
pub const SSH_USER: &str = "ubuntu";

/// Executor authenticated with the cluster's private key
pub fn remote_executor(key_path: &Path) -> Result<RemoteExecutor> {
    RemoteExecutor::from_key_file(SSH_USER, key_path).map_err(|e| CloudError::remote("localhost", e))
}

/// Readiness check against one host
#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    async fn check_reachable(&self, host: &str) -> perconaflow_remote::Result<()>;
}

#[async_trait]
impl ReachabilityCheck for RemoteExecutor {
    async fn check_reachable(&self, host: &str) -> perconaflow_remote::Result<()> {
        self.ssh_ping(host).await
    }
}

/// Wait until `instance` accepts SSH on its public address
pub async fn wait_for_instance<P: ReachabilityCheck + ?Sized>(
    check: &P,
    instance: &Instance,
    poll: &PollConfig,
) -> Result<()> {
    let what = format!("ssh on {}", instance.public_ip);
    poll_until(poll, &what, move || async move {
        match check.check_reachable(&instance.public_ip).await {
            Ok(()) => Ok(Some(())),
            Err(e) => {
                tracing::debug!("{} not reachable yet: {}", instance.public_ip, e);
                Ok(None)
            }
        }
    })
    .await
}

/// Wait for every instance concurrently; the first failure wins
pub async fn wait_until_reachable<P: ReachabilityCheck + ?Sized>(
    check: &P,
    instances: &[Instance],
    poll: &PollConfig,
) -> Result<()> {
    tracing::info!("Waiting for {} instance(s) to accept SSH", instances.len());
    try_join_all(
        instances
            .iter()
            .map(|instance| wait_for_instance(check, instance, poll)),
    )
    .await?;
    tracing::info!("All instances reachable");
    Ok(())
}
