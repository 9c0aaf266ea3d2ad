//! Compute Engine v1 REST client

use crate::error::{GcpError, Result};
use crate::gcloud::TokenSource;
use perconaflow_cloud::{CloudError, PollConfig, poll_until};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

const COMPUTE_API_BASE: &str = "https://compute.googleapis.com/compute/v1";

/// Long-running operation handle
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    pub status: String,
    pub zone: Option<String>,
    pub region: Option<String>,
    pub error: Option<OperationErrors>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationErrors {
    #[serde(default)]
    pub errors: Vec<OperationErrorItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationErrorItem {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl Operation {
    pub fn is_done(&self) -> bool {
        self.status == "DONE"
    }

    fn error_message(&self) -> Option<String> {
        let errors = &self.error.as_ref()?.errors;
        if errors.is_empty() {
            return None;
        }
        Some(
            errors
                .iter()
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.code.as_deref().unwrap_or("UNKNOWN"),
                        e.message.as_deref().unwrap_or_default()
                    )
                })
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeInstance {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(rename = "networkIP")]
    pub network_ip: Option<String>,
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(rename = "natIP")]
    pub nat_ip: Option<String>,
}

impl ComputeInstance {
    pub fn private_ip(&self) -> Option<&str> {
        self.network_interfaces.first()?.network_ip.as_deref()
    }

    pub fn public_ip(&self) -> Option<&str> {
        self.network_interfaces
            .first()?
            .access_configs
            .first()?
            .nat_ip
            .as_deref()
    }
}

/// Network, subnetwork or firewall
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedResource {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub self_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct ComputeClient {
    http: reqwest::Client,
    tokens: TokenSource,
    project: String,
    zone: String,
    region: String,
}

impl ComputeClient {
    pub fn new(project: impl Into<String>, zone: impl Into<String>) -> Self {
        let zone = zone.into();
        let region = region_of(&zone).to_string();
        Self {
            http: reqwest::Client::new(),
            tokens: TokenSource::new(),
            project: project.into(),
            zone,
            region,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// `global/<collection>`
    pub fn global(&self, collection: &str) -> String {
        format!("global/{}", collection)
    }

    /// `regions/<region>/<collection>`
    pub fn regional(&self, collection: &str) -> String {
        format!("regions/{}/{}", self.region, collection)
    }

    /// `zones/<zone>/<collection>`
    pub fn zonal(&self, collection: &str) -> String {
        format!("zones/{}/{}", self.zone, collection)
    }

    /// Fully qualified resource path as used in references between objects
    pub fn resource_link(&self, path: &str) -> String {
        format!("projects/{}/{}", self.project, path)
    }

    async fn request(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/{}", COMPUTE_API_BASE, self.resource_link(path));
        let token = self.tokens.token().await?;

        tracing::debug!("{} {}", method, url);
        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|b| b.error.message)
            .unwrap_or(text);
        Err(GcpError::Api {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    /// `Ok(None)` on 404
    pub async fn get<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<Option<T>> {
        match self.request(operation, Method::GET, path, &[], None).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Every page of a collection, optionally filtered
    pub async fn list<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        filter: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = Vec::new();
            if let Some(filter) = filter {
                query.push(("filter", filter));
            }
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let page: ListResponse<T> = self
                .request(operation, Method::GET, path, &query, None)
                .await?
                .json()
                .await?;
            items.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(items),
            }
        }
    }

    pub async fn insert(&self, operation: &str, path: &str, body: &Value) -> Result<Operation> {
        Ok(self
            .request(operation, Method::POST, path, &[], Some(body))
            .await?
            .json()
            .await?)
    }

    /// `Ok(None)` when the resource is already gone
    pub async fn delete(&self, operation: &str, path: &str) -> Result<Option<Operation>> {
        match self.request(operation, Method::DELETE, path, &[], None).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Poll a long-running operation until it is DONE, surfacing its errors
    pub async fn wait(&self, operation: &str, op: &Operation, poll: &PollConfig) -> Result<()> {
        let path = match (&op.zone, &op.region) {
            (Some(_), _) => self.zonal(&format!("operations/{}", op.name)),
            (None, Some(_)) => self.regional(&format!("operations/{}", op.name)),
            (None, None) => self.global(&format!("operations/{}", op.name)),
        };

        let path = path.as_str();
        let done: Operation = poll_until(poll, operation, move || async move {
            let current: Option<Operation> = self
                .get("get operation", path)
                .await
                .map_err(CloudError::from)?;
            match current {
                Some(current) if current.is_done() => Ok(Some(current)),
                Some(_) => Ok(None),
                None => Err(CloudError::ResourceNotFound(format!("operation {}", op.name))),
            }
        })
        .await?;

        match done.error_message() {
            Some(message) => Err(GcpError::Operation {
                operation: operation.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }
}

/// `us-central1-a` -> `us-central1`
pub fn region_of(zone: &str) -> &str {
    zone.rsplit_once('-').map_or(zone, |(region, _)| region)
}

pub fn is_conflict(err: &GcpError) -> bool {
    matches!(err, GcpError::Api { status, .. } if *status == StatusCode::CONFLICT.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_of() {
        assert_eq!(region_of("us-central1-a"), "us-central1");
        assert_eq!(region_of("europe-west4-b"), "europe-west4");
    }

    #[test]
    fn test_paths() {
        let client = ComputeClient::new("my-project", "us-central1-a");
        assert_eq!(client.zonal("instances"), "zones/us-central1-a/instances");
        assert_eq!(client.regional("subnetworks"), "regions/us-central1/subnetworks");
        assert_eq!(
            client.resource_link(&client.global("networks/percona")),
            "projects/my-project/global/networks/percona"
        );
    }

    #[test]
    fn test_instance_addresses() {
        let instance: ComputeInstance = serde_json::from_value(serde_json::json!({
            "name": "instance-abc-0001",
            "status": "RUNNING",
            "networkInterfaces": [{
                "networkIP": "10.0.1.2",
                "accessConfigs": [{ "name": "External NAT", "natIP": "34.1.2.3" }]
            }],
            "labels": { "percona-cluster-stack-id": "abc" }
        }))
        .unwrap();

        assert_eq!(instance.private_ip(), Some("10.0.1.2"));
        assert_eq!(instance.public_ip(), Some("34.1.2.3"));
    }

    #[test]
    fn test_operation_errors() {
        let op: Operation = serde_json::from_value(serde_json::json!({
            "name": "operation-1",
            "status": "DONE",
            "error": { "errors": [{ "code": "QUOTA_EXCEEDED", "message": "CPUS" }] }
        }))
        .unwrap();

        assert!(op.is_done());
        assert_eq!(op.error_message().as_deref(), Some("QUOTA_EXCEEDED: CPUS"));
    }
}
