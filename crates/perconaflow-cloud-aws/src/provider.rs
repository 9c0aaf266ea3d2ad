//! AWS provider implementation

use crate::images::image_for_region;
use crate::instances::{self, LaunchSpec, count_as_i32};
use crate::network::Ec2Network;
use crate::teardown::{Ec2Deleter, Ec2TagIndex};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::config::Region;
use perconaflow_cloud::{
    CloudError, CloudProvider, ConfigStore, Credentials, Instance, Labels, PollConfig,
    ResourceId, Result, Teardown, reconcile_key_pair, reconcile_network, remote_executor,
    resource_labels, wait_until_reachable,
};
use perconaflow_config::{InfraParams, ProviderSettings};
use perconaflow_remote::FileEditor;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

const DEFAULT_VOLUME_TYPE: &str = "gp2";

/// Account-level settings, fixed for the provider's lifetime
#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: String,
    pub zone: Option<String>,
    pub profile: Option<String>,
    pub ignore_errors_on_destroy: bool,
}

impl AwsSettings {
    pub fn from_provider(settings: &ProviderSettings) -> Result<Self> {
        let region = settings
            .region
            .clone()
            .ok_or_else(|| CloudError::InvalidConfig("AWS provider requires a region".into()))?;
        Ok(Self {
            region,
            zone: settings.zone.clone(),
            profile: settings.profile.clone(),
            ignore_errors_on_destroy: settings.ignore_errors_on_destroy,
        })
    }
}

/// Per-ResourceID provisioning parameters
#[derive(Debug, Clone)]
struct ResourceConfig {
    params: InfraParams,
    image_id: String,
    security_group_id: Option<String>,
    subnet_id: Option<String>,
}

impl ResourceConfig {
    fn launch_spec(&self) -> Result<LaunchSpec> {
        let (Some(security_group_id), Some(subnet_id)) =
            (self.security_group_id.clone(), self.subnet_id.clone())
        else {
            return Err(CloudError::InvalidConfig(
                "infrastructure must be created before instances".into(),
            ));
        };
        let instance_type = self
            .params
            .instance_type
            .clone()
            .ok_or_else(|| CloudError::InvalidConfig("instance type is required".into()))?;
        let to_i32 = |name: &str, v: u32| {
            i32::try_from(v).map_err(|_| CloudError::InvalidConfig(format!("{} {} is too large", name, v)))
        };

        Ok(LaunchSpec {
            image_id: self.image_id.clone(),
            instance_type,
            key_name: self.params.key_pair_name.clone(),
            security_group_id,
            subnet_id,
            volume_type: self
                .params
                .volume_type
                .clone()
                .unwrap_or_else(|| DEFAULT_VOLUME_TYPE.to_string()),
            volume_size: to_i32("volume size", self.params.volume_size)?,
            volume_iops: self.params.volume_iops.map(|v| to_i32("volume iops", v)).transpose()?,
            volume_throughput: self
                .params
                .volume_throughput
                .map(|v| to_i32("volume throughput", v))
                .transpose()?,
        })
    }
}

/// AWS (EC2) provider
pub struct AwsProvider {
    settings: AwsSettings,
    cancel: CancellationToken,
    session: OnceCell<(SdkConfig, Client)>,
    configs: ConfigStore<ResourceConfig>,
}

impl AwsProvider {
    pub fn new(settings: AwsSettings, cancel: CancellationToken) -> Self {
        Self {
            settings,
            cancel,
            session: OnceCell::new(),
            configs: ConfigStore::new(),
        }
    }

    async fn session(&self) -> &(SdkConfig, Client) {
        self.session
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.settings.region.clone()));
                if let Some(profile) = &self.settings.profile {
                    loader = loader.profile_name(profile);
                }
                let config = loader.load().await;
                let client = Client::new(&config);
                tracing::debug!("AWS session opened in {}", self.settings.region);
                (config, client)
            })
            .await
    }

    async fn client(&self) -> &Client {
        &self.session().await.1
    }

    fn key_path(&self, resource_id: &ResourceId) -> Result<std::path::PathBuf> {
        Ok(self.configs.get(resource_id)?.params.private_key_path())
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    async fn configure(&self, resource_id: &ResourceId, params: &InfraParams) -> Result<()> {
        if params.key_pair_name.is_empty() {
            return Err(CloudError::InvalidConfig(
                "cannot create key pair with empty name".into(),
            ));
        }
        let image_id = image_for_region(&self.settings.region).ok_or_else(|| {
            CloudError::InvalidConfig(format!("no AMI known for region {}", self.settings.region))
        })?;

        self.session().await;
        self.configs.insert(
            resource_id,
            ResourceConfig {
                params: params.clone(),
                image_id: image_id.to_string(),
                security_group_id: None,
                subnet_id: None,
            },
        );
        tracing::debug!("Configured {} with image {}", resource_id, image_id);
        Ok(())
    }

    async fn create_infrastructure(&self, resource_id: &ResourceId) -> Result<()> {
        let config = self.configs.get(resource_id)?;
        let network = Ec2Network {
            client: self.client().await,
            zone: self.settings.zone.as_deref(),
        };

        reconcile_key_pair(
            &network,
            resource_id,
            &config.params.key_pair_name,
            &config.params.private_key_path(),
        )
        .await?;
        let ids = reconcile_network(&network, resource_id, &config.params).await?;

        self.configs.update(resource_id, |c| {
            c.security_group_id = Some(ids.security_group_id);
            c.subnet_id = Some(ids.subnet_id);
        })
    }

    async fn create_instances(
        &self,
        resource_id: &ResourceId,
        count: usize,
        labels: &Labels,
    ) -> Result<Vec<Instance>> {
        let config = self.configs.get(resource_id)?;
        let spec = config.launch_spec()?;
        let labels = resource_labels(resource_id, labels);
        let client = self.client().await;

        let ids = instances::launch(client, &spec, count_as_i32(count)?, &labels).await?;
        instances::wait_status_ok(client, &ids, &PollConfig::instance_status(self.cancel.clone()))
            .await?;

        let launched = instances::list(client, &labels).await?;
        let executor = remote_executor(&config.params.private_key_path())?;
        wait_until_reachable(&executor, &launched, &PollConfig::ssh_ready(self.cancel.clone()))
            .await?;

        instances::list(client, &labels).await
    }

    async fn list_instances(
        &self,
        resource_id: &ResourceId,
        labels: &Labels,
    ) -> Result<Vec<Instance>> {
        instances::list(self.client().await, &resource_labels(resource_id, labels)).await
    }

    async fn delete_infrastructure(&self, resource_id: &ResourceId) -> Result<()> {
        let client = self.client().await;
        let index = Ec2TagIndex { client };
        let deleter = Ec2Deleter {
            client,
            cancel: self.cancel.clone(),
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

    async fn credentials(&self) -> Result<Credentials> {
        let (config, _) = self.session().await;
        let provider = config.credentials_provider().ok_or_else(|| {
            CloudError::AuthenticationFailed("no AWS credentials provider configured".into())
        })?;
        let credentials = provider
            .provide_credentials()
            .await
            .map_err(|e| CloudError::AuthenticationFailed(e.to_string()))?;
        Ok(Credentials {
            access_key: credentials.access_key_id().to_string(),
            secret_key: credentials.secret_access_key().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perconaflow_config::CloudKind;

    fn record(params: InfraParams) -> ResourceConfig {
        ResourceConfig {
            params,
            image_id: "ami-04505e74c0741db8d".to_string(),
            security_group_id: Some("sg-1".to_string()),
            subnet_id: Some("subnet-1".to_string()),
        }
    }

    #[test]
    fn test_settings_require_region() {
        let settings = ProviderSettings::new(CloudKind::Aws);
        assert!(AwsSettings::from_provider(&settings).is_err());

        let mut settings = ProviderSettings::new(CloudKind::Aws);
        settings.region = Some("us-east-1".to_string());
        settings.ignore_errors_on_destroy = true;
        let aws = AwsSettings::from_provider(&settings).unwrap();
        assert_eq!(aws.region, "us-east-1");
        assert!(aws.ignore_errors_on_destroy);
    }

    #[test]
    fn test_launch_spec_defaults() {
        let mut params = InfraParams::for_destroy("percona", "/tmp");
        params.instance_type = Some("t3.micro".to_string());
        params.volume_iops = Some(3000);

        let spec = record(params).launch_spec().unwrap();
        assert_eq!(spec.volume_type, "gp2");
        assert_eq!(spec.volume_iops, Some(3000));
        assert_eq!(spec.volume_throughput, None);
        assert_eq!(spec.key_name, "percona");
    }

    #[test]
    fn test_launch_spec_requires_network() {
        let mut params = InfraParams::for_destroy("percona", "/tmp");
        params.instance_type = Some("t3.micro".to_string());
        let mut config = record(params);
        config.subnet_id = None;

        assert!(matches!(config.launch_spec(), Err(CloudError::InvalidConfig(_))));
    }

    #[test]
    fn test_launch_spec_requires_instance_type() {
        let config = record(InfraParams::for_destroy("percona", "/tmp"));
        assert!(config.launch_spec().is_err());
    }
}
