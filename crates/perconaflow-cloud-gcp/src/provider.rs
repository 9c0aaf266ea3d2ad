//! GCP provider implementation

use crate::compute::ComputeClient;
use crate::instances::{self, InstanceTemplate};
use crate::network::GceNetwork;
use crate::teardown::{GceDeleter, GceTagIndex};
use async_trait::async_trait;
use perconaflow_cloud::{
    CloudError, CloudProvider, ConfigStore, Credentials, Instance, Labels, PollConfig,
    ResourceId, Result, SSH_USER, Teardown, reconcile_key_pair, reconcile_network,
    remote_executor, resource_labels, wait_until_reachable,
};
use perconaflow_config::{InfraParams, ProviderSettings};
use perconaflow_remote::FileEditor;
use tokio_util::sync::CancellationToken;

const DEFAULT_DISK_TYPE: &str = "pd-balanced";

#[derive(Debug, Clone)]
pub struct GcpSettings {
    pub project: String,
    pub zone: String,
    pub ignore_errors_on_destroy: bool,
}

impl GcpSettings {
    pub fn from_provider(settings: &ProviderSettings) -> Result<Self> {
        let project = settings
            .project
            .clone()
            .ok_or_else(|| CloudError::InvalidConfig("GCP provider requires a project".into()))?;
        let zone = settings
            .zone
            .clone()
            .ok_or_else(|| CloudError::InvalidConfig("GCP provider requires a zone".into()))?;
        Ok(Self {
            project,
            zone,
            ignore_errors_on_destroy: settings.ignore_errors_on_destroy,
        })
    }
}

#[derive(Debug, Clone)]
struct ResourceConfig {
    params: InfraParams,
    public_key: Option<String>,
    subnetwork: Option<String>,
}

impl ResourceConfig {
    fn template(&self, compute: &ComputeClient) -> Result<InstanceTemplate> {
        let (Some(public_key), Some(subnetwork)) = (&self.public_key, &self.subnetwork) else {
            return Err(CloudError::InvalidConfig(
                "infrastructure must be created before instances".into(),
            ));
        };
        let machine_type = self
            .params
            .instance_type
            .clone()
            .ok_or_else(|| CloudError::InvalidConfig("instance type is required".into()))?;

        Ok(InstanceTemplate {
            machine_type,
            disk_type: self
                .params
                .volume_type
                .clone()
                .unwrap_or_else(|| DEFAULT_DISK_TYPE.to_string()),
            disk_size_gb: self.params.volume_size,
            disk_iops: self.params.volume_iops,
            subnetwork: compute
                .resource_link(&compute.regional(&format!("subnetworks/{}", subnetwork))),
            ssh_user: SSH_USER.to_string(),
            ssh_public_key: public_key.trim().to_string(),
        })
    }
}

/// Google Cloud (Compute Engine) provider
pub struct GcpProvider {
    settings: GcpSettings,
    cancel: CancellationToken,
    compute: ComputeClient,
    configs: ConfigStore<ResourceConfig>,
}

impl GcpProvider {
    pub fn new(settings: GcpSettings, cancel: CancellationToken) -> Self {
        let compute = ComputeClient::new(&settings.project, &settings.zone);
        Self {
            settings,
            cancel,
            compute,
            configs: ConfigStore::new(),
        }
    }

    fn operation_poll(&self) -> PollConfig {
        PollConfig::operation(self.cancel.clone())
    }

    fn key_path(&self, resource_id: &ResourceId) -> Result<std::path::PathBuf> {
        Ok(self.configs.get(resource_id)?.params.private_key_path())
    }
}

#[async_trait]
impl CloudProvider for GcpProvider {
    fn name(&self) -> &str {
        "gcp"
    }

    async fn configure(&self, resource_id: &ResourceId, params: &InfraParams) -> Result<()> {
        if params.key_pair_name.is_empty() {
            return Err(CloudError::InvalidConfig(
                "cannot create key pair with empty name".into(),
            ));
        }
        self.configs.insert(
            resource_id,
            ResourceConfig {
                params: params.clone(),
                public_key: None,
                subnetwork: None,
            },
        );
        tracing::debug!(
            "Configured {} in {}/{}",
            resource_id,
            self.compute.project(),
            self.compute.zone()
        );
        Ok(())
    }

    async fn create_infrastructure(&self, resource_id: &ResourceId) -> Result<()> {
        let config = self.configs.get(resource_id)?;
        let network = GceNetwork {
            compute: &self.compute,
            poll: self.operation_poll(),
        };

        let public_key = reconcile_key_pair(
            &network,
            resource_id,
            &config.params.key_pair_name,
            &config.params.private_key_path(),
        )
        .await?;
        let ids = reconcile_network(&network, resource_id, &config.params).await?;

        self.configs.update(resource_id, |c| {
            c.public_key = Some(public_key);
            c.subnetwork = Some(ids.subnet_id);
        })
    }

    async fn create_instances(
        &self,
        resource_id: &ResourceId,
        count: usize,
        labels: &Labels,
    ) -> Result<Vec<Instance>> {
        let config = self.configs.get(resource_id)?;
        let template = config.template(&self.compute)?;
        let labels = resource_labels(resource_id, labels);
        let pattern = instances::name_pattern(resource_id, &labels);

        tracing::info!("Creating {} instance(s) {}", count, pattern);
        let body = instances::bulk_insert_body(&template, count, &pattern, &labels);
        instances::launch(&self.compute, &body, &self.operation_poll()).await?;

        let launched = instances::wait_running(
            &self.compute,
            &labels,
            count,
            &PollConfig::instance_status(self.cancel.clone()),
        )
        .await?;
        let executor = remote_executor(&config.params.private_key_path())?;
        wait_until_reachable(&executor, &launched, &PollConfig::ssh_ready(self.cancel.clone()))
            .await?;

        self.list_instances(resource_id, &labels).await
    }

    async fn list_instances(
        &self,
        resource_id: &ResourceId,
        labels: &Labels,
    ) -> Result<Vec<Instance>> {
        let labels = resource_labels(resource_id, labels);
        let found = instances::list_matching(&self.compute, &labels).await?;
        Ok(found.iter().map(instances::to_instance).collect())
    }

    async fn delete_infrastructure(&self, resource_id: &ResourceId) -> Result<()> {
        let index = GceTagIndex {
            compute: &self.compute,
        };
        let deleter = GceDeleter {
            compute: &self.compute,
            poll: self.operation_poll(),
        };

        let report = Teardown::new(&index, &deleter)
            .ignore_errors(self.settings.ignore_errors_on_destroy)
            .run(resource_id)
            .await?;
        if !report.is_success() {
            tracing::warn!(
                "{} resource(s) of {} could not be deleted",
                report.failed.len(),
                resource_id
            );
        }
        tracing::info!(
            "Deleted {} resource(s) of {} in {}ms",
            report.deleted.len(),
            resource_id,
            report.duration_ms
        );
        self.configs.remove(resource_id);
        Ok(())
    }

    async fn run_command(
        &self,
        resource_id: &ResourceId,
        instance: &Instance,
        command: &str,
    ) -> Result<String> {
        remote_executor(&self.key_path(resource_id)?)?
            .run_command(&instance.public_ip, command)
            .await
            .map_err(|e| CloudError::remote(&instance.public_ip, e))
    }

    async fn send_file(
        &self,
        resource_id: &ResourceId,
        instance: &Instance,
        contents: &[u8],
        remote_path: &str,
    ) -> Result<()> {
        remote_executor(&self.key_path(resource_id)?)?
            .send_file(&instance.public_ip, contents, remote_path)
            .await
            .map_err(|e| CloudError::remote(&instance.public_ip, e))
    }

    async fn edit_file(
        &self,
        resource_id: &ResourceId,
        instance: &Instance,
        remote_path: &str,
        editor: FileEditor,
    ) -> Result<()> {
        remote_executor(&self.key_path(resource_id)?)?
            .edit_file(&instance.public_ip, remote_path, editor)
            .await
            .map_err(|e| CloudError::remote(&instance.public_ip, e))
    }

    /// RDS discovery is AWS only
    async fn credentials(&self) -> Result<Credentials> {
        Err(CloudError::InvalidConfig(
            "GCP provider does not expose access keys".into(),
        ))
    }
}
