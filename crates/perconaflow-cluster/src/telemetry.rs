//! Usage beacon sent after a successful create

use crate::error::{ClusterError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use perconaflow_cloud::ResourceId;
use serde::Serialize;
use std::time::Duration;

pub const TELEMETRY_ENDPOINT: &str = "https://check.percona.com/v1/telemetry/Report";
const PRODUCT: &str = "perconaflow";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryMetrics {
    pub id: String,
    pub time: String,
    #[serde(rename = "pmmServerTelemetryId")]
    pub telemetry_id: String,
    #[serde(rename = "pmmServerVersion")]
    pub server_version: String,
    #[serde(rename = "upDuration")]
    pub up_duration: String,
    #[serde(rename = "distributionMethod")]
    pub distribution_method: String,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metrics: TelemetryMetrics,
}

impl Report {
    /// `values` must hold only non-sensitive settings
    pub fn new(
        resource_id: &ResourceId,
        resource: &str,
        values: &[(&str, String)],
        now: DateTime<Utc>,
    ) -> Self {
        let mut metrics = vec![
            Metric {
                key: "product".to_string(),
                value: PRODUCT.to_string(),
            },
            Metric {
                key: "resource".to_string(),
                value: resource.to_string(),
            },
        ];
        metrics.extend(values.iter().map(|(key, value)| Metric {
            key: key.to_string(),
            value: value.clone(),
        }));

        Self {
            metrics: TelemetryMetrics {
                id: resource_id.to_string(),
                time: now.to_rfc3339_opts(SecondsFormat::Nanos, true),
                telemetry_id: resource_id.to_string(),
                server_version: env!("CARGO_PKG_VERSION").to_string(),
                up_duration: "0s".to_string(),
                distribution_method: "CLI".to_string(),
                metrics,
            },
        }
    }
}

pub async fn send(report: &Report) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let response = client.post(TELEMETRY_ENDPOINT).json(report).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClusterError::Telemetry(format!("{}: {}", status, body)));
    }
    Ok(())
}

/// Send `report` on a detached task; failures are only logged
pub fn spawn(report: Report) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match send(&report).await {
            Ok(()) => tracing::debug!("Telemetry sent"),
            Err(e) => tracing::warn!("Failed to send telemetry: {}", e),
        }
    })
}
