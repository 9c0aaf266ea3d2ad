//! Cluster Resource Facade
//!
//! The one entry point callers use: create a product under a fresh
//! ResourceID, or destroy everything a ResourceID owns.

use crate::deploy::Deployment;
use crate::error::{ClusterError, Result};
use crate::monitoring::{self, MonitoringOutputs, RdsOutputs};
use crate::ps::{self, PerconaServerOutputs};
use crate::pxc::{self, XtraDbClusterOutputs};
use crate::telemetry::{self, Report};
use chrono::Utc;
use perconaflow_cloud::{CloudProvider, PollConfig, ResourceId};
use perconaflow_config::{ClusterConfig, InfraParams, Product};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProductOutputs {
    PerconaServer(PerconaServerOutputs),
    XtraDbCluster(XtraDbClusterOutputs),
    Monitoring(MonitoringOutputs),
    MonitoringRds(RdsOutputs),
}

/// Result of a successful create
#[derive(Debug, Clone, Serialize)]
pub struct CreateOutput {
    pub resource_id: ResourceId,
    pub product: String,
    pub cloud: String,
    pub outputs: ProductOutputs,
    pub duration_ms: u64,
}

pub struct ClusterFacade {
    cloud: Arc<dyn CloudProvider>,
    cancel: CancellationToken,
    api_poll: Option<PollConfig>,
    telemetry: Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterFacade {
    pub fn new(cloud: Arc<dyn CloudProvider>, cancel: CancellationToken) -> Self {
        Self {
            cloud,
            cancel,
            api_poll: None,
            telemetry: Mutex::new(Vec::new()),
        }
    }

    /// Override how long HTTP API readiness waits may take
    pub fn with_api_poll(mut self, poll: PollConfig) -> Self {
        self.api_poll = Some(poll);
        self
    }

    pub fn cloud(&self) -> &dyn CloudProvider {
        self.cloud.as_ref()
    }

    /// Provision `config.product` under a new ResourceID.
    ///
    /// A failed create is not rolled back. The error is
    /// [`ClusterError::Create`] carrying the ResourceID to destroy.
    pub async fn create(&self, config: &ClusterConfig) -> Result<CreateOutput> {
        let started = Instant::now();
        let resource_id = ResourceId::generate();
        tracing::info!(
            "Creating {} {} on {}",
            config.product,
            resource_id,
            self.cloud.name()
        );

        let outputs = match self.create_product(&resource_id, config).await {
            Ok(outputs) => outputs,
            Err(e) => {
                tracing::error!("Create of {} failed: {}", resource_id, e);
                return Err(ClusterError::Create {
                    resource_id,
                    source: Box::new(e),
                });
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!("Created {} in {}ms", resource_id, duration_ms);

        if !config.provider.disable_telemetry {
            let report = Report::new(
                &resource_id,
                config.product.as_str(),
                &config.telemetry_values(),
                Utc::now(),
            );
            if let Ok(mut handles) = self.telemetry.lock() {
                handles.push(telemetry::spawn(report));
            }
        }

        Ok(CreateOutput {
            resource_id,
            product: config.product.to_string(),
            cloud: self.cloud.name().to_string(),
            outputs,
            duration_ms,
        })
    }

    /// Delete everything `resource_id` owns. Safe to repeat.
    pub async fn destroy(&self, config: &ClusterConfig, resource_id: &ResourceId) -> Result<()> {
        tracing::info!(
            "Destroying {} {} on {}",
            config.product,
            resource_id,
            self.cloud.name()
        );
        match config.product {
            Product::MonitoringRds => {
                monitoring::deregister_rds(resource_id, pmm_address(config)?).await?;
            }
            _ => {
                let params = InfraParams::for_destroy(
                    config.infra.key_pair_name.clone(),
                    config.infra.key_pair_dir.clone(),
                );
                self.cloud.configure(resource_id, &params).await?;
                self.cloud.delete_infrastructure(resource_id).await?;
            }
        }
        tracing::info!("Destroyed {}", resource_id);
        Ok(())
    }

    /// Wait up to `timeout` for pending telemetry reports
    pub async fn flush_telemetry(&self, timeout: Duration) {
        let handles = match self.telemetry.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => return,
        };
        if handles.is_empty() {
            return;
        }
        let all = futures_util::future::join_all(handles);
        if tokio::time::timeout(timeout, all).await.is_err() {
            tracing::debug!("Telemetry still pending after {:?}", timeout);
        }
    }

    async fn create_product(
        &self,
        resource_id: &ResourceId,
        config: &ClusterConfig,
    ) -> Result<ProductOutputs> {
        let outputs = match config.product {
            Product::PerconaServer => {
                let deploy = self.provision(resource_id, config).await?;
                ProductOutputs::PerconaServer(ps::create(&deploy).await?)
            }
            Product::XtraDbCluster => {
                let deploy = self.provision(resource_id, config).await?;
                ProductOutputs::XtraDbCluster(pxc::create(&deploy).await?)
            }
            Product::Monitoring => {
                let deploy = self.provision(resource_id, config).await?;
                ProductOutputs::Monitoring(monitoring::create_server(&deploy, &config.rds).await?)
            }
            Product::MonitoringRds => {
                let address = pmm_address(config)?;
                ProductOutputs::MonitoringRds(
                    monitoring::register_rds(self.cloud(), resource_id, address, &config.rds)
                        .await?,
                )
            }
        };
        Ok(outputs)
    }

    /// Configure the cloud, reconcile the network and build the run context
    async fn provision<'a>(
        &'a self,
        resource_id: &'a ResourceId,
        config: &'a ClusterConfig,
    ) -> Result<Deployment<'a>> {
        let mut deploy = Deployment::new(
            self.cloud(),
            resource_id,
            &config.cluster,
            self.cancel.clone(),
        )?;
        if let Some(poll) = &self.api_poll {
            deploy = deploy.with_api_poll(poll.clone());
        }

        self.cloud.configure(resource_id, &config.infra).await?;
        self.cloud.create_infrastructure(resource_id).await?;
        Ok(deploy)
    }
}

fn pmm_address(config: &ClusterConfig) -> Result<&str> {
    config
        .cluster
        .pmm_address
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ClusterError::InvalidConfig("pmm-address is required".to_string()))
}
