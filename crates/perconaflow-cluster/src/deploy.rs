//! Shared context of one provisioning run

use crate::error::Result;
use crate::node::Node;
use crate::pmm::normalize_pmm_address;
use perconaflow_cloud::{CloudProvider, Instance, PollConfig, ResourceId, role_labels};
use perconaflow_config::ClusterParams;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

/// Cloud, ResourceID and parameters every installer step reads
pub struct Deployment<'a> {
    pub cloud: &'a dyn CloudProvider,
    pub resource_id: &'a ResourceId,
    pub params: &'a ClusterParams,
    /// Normalized PMM server address, when monitoring is requested
    pub pmm_url: Option<Url>,
    /// Waits on HTTP APIs (orchestrator, PMM server)
    pub api_poll: PollConfig,
}

impl<'a> Deployment<'a> {
    pub fn new(
        cloud: &'a dyn CloudProvider,
        resource_id: &'a ResourceId,
        params: &'a ClusterParams,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let pmm_url = params
            .pmm_address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .map(normalize_pmm_address)
            .transpose()?;
        Ok(Self {
            cloud,
            resource_id,
            params,
            pmm_url,
            api_poll: PollConfig::operation(cancel),
        })
    }

    pub fn with_api_poll(mut self, poll: PollConfig) -> Self {
        self.api_poll = poll;
        self
    }

    /// Launch `count` instances carrying `role`
    pub async fn launch(&self, count: usize, role: &str) -> Result<Vec<Instance>> {
        tracing::info!("Creating {} {} instance(s)", count, role);
        let instances = self
            .cloud
            .create_instances(self.resource_id, count, &role_labels(role))
            .await?;
        Ok(instances)
    }

    pub fn nodes<'b>(&'b self, instances: &'b [Instance]) -> Vec<Node<'b>> {
        instances
            .iter()
            .map(|instance| Node::new(self.cloud, self.resource_id, instance))
            .collect()
    }
}
