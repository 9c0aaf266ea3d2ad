//! PMM server HTTP API client
//!
//! Covers RDS discovery and registration plus the inventory calls used to
//! remove everything registered under one ResourceID.

use crate::error::{ClusterError, Result};
use perconaflow_cloud::{CloudError, Credentials, PollConfig, RESOURCE_ID_LABEL, ResourceId, poll_until};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const ENGINE_RDS_MYSQL: &str = "DISCOVER_RDS_MYSQL";
pub const ENGINE_RDS_POSTGRESQL: &str = "DISCOVER_RDS_POSTGRESQL";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Instance returned by `RDS/Discover`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RdsInstance {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub az: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub node_model: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: i64,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub engine_version: String,
}

#[derive(Debug, Serialize)]
struct DiscoverRdsRequest<'a> {
    aws_access_key: &'a str,
    aws_secret_key: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct DiscoverRdsResponse {
    #[serde(default)]
    rds_instances: Vec<RdsInstance>,
}

#[derive(Debug, Serialize)]
pub struct AddRdsRequest {
    pub region: String,
    pub az: String,
    pub instance_id: String,
    pub node_model: String,
    pub address: String,
    pub port: i64,
    pub engine: String,
    pub service_name: String,
    pub username: String,
    pub password: String,
    pub aws_access_key: String,
    pub aws_secret_key: String,
    pub custom_labels: BTreeMap<String, String>,
    pub rds_exporter: bool,
    pub qan_mysql_perfschema: bool,
    pub qan_postgresql_pgstatements: bool,
    pub tablestats_group_table_limit: i32,
    pub metrics_mode: i32,
}

impl AddRdsRequest {
    /// Registration of `instance`, labelled with the ResourceID for cleanup
    pub fn new(
        resource_id: &ResourceId,
        instance: &RdsInstance,
        credentials: &Credentials,
        username: &str,
        password: &str,
    ) -> Self {
        Self {
            region: instance.region.clone(),
            az: instance.az.clone(),
            instance_id: instance.instance_id.clone(),
            node_model: instance.node_model.clone(),
            address: instance.address.clone(),
            port: instance.port,
            engine: instance.engine.clone(),
            service_name: instance.instance_id.clone(),
            username: username.to_string(),
            password: password.to_string(),
            aws_access_key: credentials.access_key.clone(),
            aws_secret_key: credentials.secret_key.clone(),
            custom_labels: BTreeMap::from([(
                RESOURCE_ID_LABEL.to_string(),
                resource_id.to_string(),
            )]),
            rds_exporter: true,
            qan_mysql_perfschema: true,
            qan_postgresql_pgstatements: true,
            tablestats_group_table_limit: -1,
            metrics_mode: 1,
        }
    }
}

/// One inventory entry, whatever its category
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub custom_labels: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServicesList {
    #[serde(default)]
    pub mysql: Vec<Service>,
    #[serde(default)]
    pub mongodb: Vec<Service>,
    #[serde(default)]
    pub postgresql: Vec<Service>,
    #[serde(default)]
    pub proxysql: Vec<Service>,
    #[serde(default)]
    pub haproxy: Vec<Service>,
    #[serde(default)]
    pub external: Vec<Service>,
}

impl ServicesList {
    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.mysql
            .iter()
            .chain(&self.mongodb)
            .chain(&self.postgresql)
            .chain(&self.proxysql)
            .chain(&self.haproxy)
            .chain(&self.external)
    }

    /// Ids of the services labelled with `resource_id`
    pub fn ids_for(&self, resource_id: &ResourceId) -> Vec<String> {
        self.iter()
            .filter(|s| {
                s.custom_labels.get(RESOURCE_ID_LABEL).map(String::as_str)
                    == Some(resource_id.as_str())
            })
            .map(|s| s.service_id.clone())
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct ServicesRemoveRequest<'a> {
    service_id: &'a str,
    force: bool,
}

/// PMM server API client
pub struct PmmClient {
    client: reqwest::Client,
    base_url: Url,
    username: String,
    password: Option<String>,
}

impl PmmClient {
    /// `endpoint` is a normalized PMM address; its userinfo becomes basic auth
    pub fn new(endpoint: &Url) -> Result<Self> {
        let mut base_url = endpoint.clone();
        let username = base_url.username().to_string();
        let password = base_url.password().map(str::to_string);
        // Both setters only fail on cannot-be-a-base URLs
        let _ = base_url.set_username("");
        let _ = base_url.set_password(None);
        base_url.set_path("");

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            // PMM servers ship a self-signed certificate
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            base_url,
            username,
            password,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned + Default>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.base_url.join(path).map_err(|e| ClusterError::PmmApi {
            operation: path.to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, self.password.as_deref())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClusterError::PmmApi {
                operation: path.to_string(),
                message: format!("{}: {}", status, text),
            });
        }
        if text.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn rds_discover(&self, credentials: &Credentials) -> Result<Vec<RdsInstance>> {
        let response: DiscoverRdsResponse = self
            .post(
                "v1/management/RDS/Discover",
                &DiscoverRdsRequest {
                    aws_access_key: &credentials.access_key,
                    aws_secret_key: &credentials.secret_key,
                },
            )
            .await?;
        tracing::info!("PMM discovered {} RDS instance(s)", response.rds_instances.len());
        Ok(response.rds_instances)
    }

    pub async fn rds_add(&self, request: &AddRdsRequest) -> Result<()> {
        let _: serde_json::Value = self.post("v1/management/RDS/Add", request).await?;
        Ok(())
    }

    pub async fn services_list(&self) -> Result<ServicesList> {
        self.post("v1/inventory/Services/List", &serde_json::json!({}))
            .await
    }

    pub async fn services_remove(&self, service_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "v1/inventory/Services/Remove",
                &ServicesRemoveRequest {
                    service_id,
                    force: true,
                },
            )
            .await?;
        Ok(())
    }

    /// Register `instance` under `resource_id`. Only MySQL and PostgreSQL
    /// engines are supported.
    pub async fn add_rds_instance(
        &self,
        resource_id: &ResourceId,
        instance: &RdsInstance,
        credentials: &Credentials,
        username: &str,
        password: &str,
    ) -> Result<()> {
        if instance.engine != ENGINE_RDS_MYSQL && instance.engine != ENGINE_RDS_POSTGRESQL {
            return Err(ClusterError::PmmApi {
                operation: "RDS/Add".to_string(),
                message: format!("engine {} is not supported", instance.engine),
            });
        }
        let request = AddRdsRequest::new(resource_id, instance, credentials, username, password);
        self.rds_add(&request).await?;
        tracing::info!("RDS instance {} added to PMM", instance.instance_id);
        Ok(())
    }

    /// Remove every service whose custom label carries `resource_id`
    pub async fn delete_services_by_resource_id(&self, resource_id: &ResourceId) -> Result<usize> {
        let ids = self.services_list().await?.ids_for(resource_id);
        for id in &ids {
            tracing::info!("Removing PMM service {}", id);
            self.services_remove(id).await?;
        }
        Ok(ids.len())
    }

    /// Wait until the server answers `v1/readyz`
    pub async fn wait_ready(&self, poll: &PollConfig) -> Result<()> {
        let url = self.base_url.join("v1/readyz").map_err(|e| ClusterError::PmmApi {
            operation: "readyz".to_string(),
            message: e.to_string(),
        })?;
        let url = &url;
        let client = &self.client;
        poll_until(poll, "PMM server API", move || async move {
            match client.get(url.clone()).send().await {
                Ok(response) if response.status().is_success() => Ok(Some(())),
                Ok(response) => {
                    tracing::debug!("PMM server not ready yet: {}", response.status());
                    Ok(None)
                }
                Err(e) => {
                    tracing::debug!("PMM server not reachable yet: {}", e);
                    Ok::<_, CloudError>(None)
                }
            }
        })
        .await?;
        Ok(())
    }
}
