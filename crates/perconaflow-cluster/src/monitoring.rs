//! PMM server provisioning and RDS registration

use crate::deploy::Deployment;
use crate::error::{ClusterError, Result};
use crate::outputs::NodeOutput;
use crate::pmm::normalize_pmm_address;
use crate::pmm_api::{PmmClient, RdsInstance};
use crate::rds_user;
use crate::scripts;
use crate::sql::USER_PMM;
use perconaflow_cloud::Credentials;
use perconaflow_cloud::{CloudProvider, Labels, ResourceId};
use perconaflow_config::RdsParams;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringOutputs {
    pub instances: Vec<NodeOutput>,
    /// Web UI of the new server
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RdsOutputs {
    pub rds_id: String,
}

/// One instance running the PMM server container. With RDS credentials,
/// every RDS instance the server discovers is registered as well.
pub async fn create_server(deploy: &Deployment<'_>, rds: &RdsParams) -> Result<MonitoringOutputs> {
    tracing::info!("Creating PMM server");
    let instances = deploy
        .cloud
        .create_instances(deploy.resource_id, 1, &Labels::new())
        .await?;
    let nodes = deploy.nodes(&instances);
    let Some(node) = nodes.first() else {
        return Err(ClusterError::InvalidConfig(
            "no instance was created for the PMM server".to_string(),
        ));
    };

    node.run("init", &scripts::init()).await?;
    node.run("install pmm server", &scripts::install_pmm_server())
        .await?;
    tracing::info!("PMM server running on {}", node.name());

    if rds.credentials().is_some() {
        let address = normalize_pmm_address(&format!("https://{}", node.name()))?;
        let client = PmmClient::new(&address)?;
        client.wait_ready(&deploy.api_poll).await?;
        register_discovered(&client, deploy.cloud, deploy.resource_id, rds).await?;
    }

    Ok(MonitoringOutputs {
        instances: instances
            .iter()
            .map(|instance| NodeOutput::new(instance, false))
            .collect(),
        url: format!("https://{}", node.name()),
    })
}

/// Register every discovered RDS instance; a failing one is skipped
async fn register_discovered(
    client: &PmmClient,
    cloud: &dyn CloudProvider,
    resource_id: &ResourceId,
    rds: &RdsParams,
) -> Result<()> {
    let credentials = cloud.credentials().await?;
    for instance in client.rds_discover(&credentials).await? {
        if let Err(e) = register_instance(client, resource_id, &instance, &credentials, rds).await {
            tracing::error!("Failed to add RDS instance {} to PMM: {}", instance.instance_id, e);
        }
    }
    Ok(())
}

/// Create the `pmm` user with the master credentials, then add the instance
/// to PMM as that user
async fn register_instance(
    client: &PmmClient,
    resource_id: &ResourceId,
    instance: &RdsInstance,
    credentials: &Credentials,
    rds: &RdsParams,
) -> Result<()> {
    let (username, password) = rds.credentials().ok_or_else(|| {
        ClusterError::InvalidConfig("rds-username and rds-password are required".to_string())
    })?;
    rds_user::create_pmm_user(instance, username, password, &rds.pmm_user_password).await?;
    client
        .add_rds_instance(resource_id, instance, credentials, USER_PMM, &rds.pmm_user_password)
        .await
}

/// Register the RDS instance named by `rds.rds_id` on an existing server
pub async fn register_rds(
    cloud: &dyn CloudProvider,
    resource_id: &ResourceId,
    pmm_address: &str,
    rds: &RdsParams,
) -> Result<RdsOutputs> {
    let rds_id = rds
        .rds_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ClusterError::InvalidConfig("rds-id is required".to_string()))?;
    if rds.credentials().is_none() {
        return Err(ClusterError::InvalidConfig(
            "rds-username and rds-password are required".to_string(),
        ));
    }

    let client = PmmClient::new(&normalize_pmm_address(pmm_address)?)?;
    let credentials = cloud.credentials().await?;
    let instance = client
        .rds_discover(&credentials)
        .await?
        .into_iter()
        .find(|i| i.instance_id == rds_id)
        .ok_or_else(|| ClusterError::RdsNotFound(rds_id.to_string()))?;

    register_instance(&client, resource_id, &instance, &credentials, rds).await?;
    Ok(RdsOutputs {
        rds_id: rds_id.to_string(),
    })
}

/// Remove every PMM service registered under `resource_id`
pub async fn deregister_rds(resource_id: &ResourceId, pmm_address: &str) -> Result<()> {
    let client = PmmClient::new(&normalize_pmm_address(pmm_address)?)?;
    let removed = client.delete_services_by_resource_id(resource_id).await?;
    tracing::info!("Removed {} PMM service(s) of {}", removed, resource_id);
    Ok(())
}
