//! Cloud provider trait definition

use crate::error::Result;
use crate::resource::{Labels, ResourceId};
use async_trait::async_trait;
use perconaflow_config::InfraParams;
use perconaflow_remote::FileEditor;
use serde::{Deserialize, Serialize};

/// Cloud provider abstraction trait
///
/// AWS and GCP implement this; the cluster facade is written once against it.
/// Every method that touches cloud state is keyed by a [`ResourceId`], and every
/// object the provider creates carries that id as a tag or label.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws", "gcp")
    fn name(&self) -> &str;

    /// Resolve the image, open an authenticated session and record the
    /// provisioning parameters for `resource_id`. Idempotent; a delete-only flow
    /// may call it with [`InfraParams::for_destroy`].
    async fn configure(&self, resource_id: &ResourceId, params: &InfraParams) -> Result<()>;

    /// Get-or-create key pair, VPC, gateway, security group, subnet and route table
    async fn create_infrastructure(&self, resource_id: &ResourceId) -> Result<()>;

    /// Launch `count` instances, wait until they are healthy and accept SSH,
    /// then return them as re-listed from the cloud.
    async fn create_instances(
        &self,
        resource_id: &ResourceId,
        count: usize,
        labels: &Labels,
    ) -> Result<Vec<Instance>>;

    /// Instances carrying the ResourceID label plus every label in `labels`
    async fn list_instances(&self, resource_id: &ResourceId, labels: &Labels)
    -> Result<Vec<Instance>>;

    /// Delete every tagged object in dependency order
    async fn delete_infrastructure(&self, resource_id: &ResourceId) -> Result<()>;

    /// Run a shell command on `instance`, returning combined output
    async fn run_command(
        &self,
        resource_id: &ResourceId,
        instance: &Instance,
        command: &str,
    ) -> Result<String>;

    /// Write `contents` to `remote_path` on `instance`
    async fn send_file(
        &self,
        resource_id: &ResourceId,
        instance: &Instance,
        contents: &[u8],
        remote_path: &str,
    ) -> Result<()>;

    /// Rewrite `remote_path` on `instance` through `editor`
    async fn edit_file(
        &self,
        resource_id: &ResourceId,
        instance: &Instance,
        remote_path: &str,
        editor: FileEditor,
    ) -> Result<()>;

    /// Provider credentials handed to a monitoring server for managed
    /// database discovery
    async fn credentials(&self) -> Result<Credentials>;
}

/// A launched virtual machine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    pub public_ip: String,
    pub private_ip: String,
}

impl Instance {
    pub fn new(public_ip: impl Into<String>, private_ip: impl Into<String>) -> Self {
        Self {
            public_ip: public_ip.into(),
            private_ip: private_ip.into(),
        }
    }
}

/// Access key pair for a cloud account
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}
