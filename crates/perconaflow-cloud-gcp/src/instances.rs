//! Bulk instance creation and label-filtered listing

use crate::compute::{ComputeClient, ComputeInstance};
use crate::error::Result;
use perconaflow_cloud::{INSTANCE_ROLE_LABEL, Instance, Labels, PollConfig, ResourceId, poll_until};
use serde_json::{Value, json};

pub(crate) const SOURCE_IMAGE: &str =
    "projects/ubuntu-os-cloud/global/images/ubuntu-minimal-2004-focal-v20220713";
const RUNNING: &str = "RUNNING";

/// Per-instance properties of one bulk insert
#[derive(Debug, Clone)]
pub(crate) struct InstanceTemplate {
    pub machine_type: String,
    pub disk_type: String,
    pub disk_size_gb: u32,
    pub disk_iops: Option<u32>,
    /// Fully qualified subnetwork link
    pub subnetwork: String,
    pub ssh_user: String,
    pub ssh_public_key: String,
}

/// `labels.k = "v" AND ...`
pub(crate) fn label_filter(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("labels.{} = \"{}\"", k, v))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Name pattern unique per ResourceID and role, so both fleets of one
/// cluster can be bulk inserted side by side
pub(crate) fn name_pattern(resource_id: &ResourceId, labels: &Labels) -> String {
    match labels.get(INSTANCE_ROLE_LABEL) {
        Some(role) => format!("instance-{}-{}-####", resource_id, role),
        None => format!("instance-{}-####", resource_id),
    }
}

pub(crate) fn bulk_insert_body(
    template: &InstanceTemplate,
    count: usize,
    name_pattern: &str,
    labels: &Labels,
) -> Value {
    let mut initialize = json!({
        "sourceImage": SOURCE_IMAGE,
        "diskType": template.disk_type,
        "diskSizeGb": template.disk_size_gb.to_string(),
    });
    if let Some(iops) = template.disk_iops {
        initialize["provisionedIops"] = json!(iops.to_string());
    }

    json!({
        "count": count.to_string(),
        "namePattern": name_pattern,
        "instanceProperties": {
            "machineType": template.machine_type,
            "labels": labels,
            "metadata": {
                "items": [{
                    "key": "ssh-keys",
                    "value": format!("{}:{}", template.ssh_user, template.ssh_public_key),
                }],
            },
            "disks": [{
                "boot": true,
                "autoDelete": true,
                "type": "PERSISTENT",
                "initializeParams": initialize,
            }],
            "networkInterfaces": [{
                "subnetwork": template.subnetwork,
                "stackType": "IPV4_ONLY",
                "accessConfigs": [{
                    "name": "External NAT",
                    "type": "ONE_TO_ONE_NAT",
                    "networkTier": "PREMIUM",
                }],
            }],
        },
    })
}

pub(crate) async fn launch(compute: &ComputeClient, body: &Value, poll: &PollConfig) -> Result<()> {
    let op = compute
        .insert("bulk insert instances", &compute.zonal("instances/bulkInsert"), body)
        .await?;
    compute.wait("bulk insert instances", &op, poll).await
}

pub(crate) async fn list_matching(
    compute: &ComputeClient,
    labels: &Labels,
) -> Result<Vec<ComputeInstance>> {
    compute
        .list(
            "list instances",
            &compute.zonal("instances"),
            Some(&label_filter(labels)),
        )
        .await
}

pub(crate) fn to_instance(instance: &ComputeInstance) -> Instance {
    Instance::new(
        instance.public_ip().unwrap_or_default(),
        instance.private_ip().unwrap_or_default(),
    )
}

/// Block until at least `count` matching instances are RUNNING with addresses
pub(crate) async fn wait_running(
    compute: &ComputeClient,
    labels: &Labels,
    count: usize,
    poll: &PollConfig,
) -> perconaflow_cloud::Result<Vec<Instance>> {
    poll_until(poll, "instances running", move || async move {
        let found = list_matching(compute, labels).await?;
        let running = found
            .iter()
            .filter(|i| i.status == RUNNING && i.public_ip().is_some())
            .count();
        tracing::debug!("{}/{} instance(s) running", running, count);
        if running >= count && running == found.len() {
            Ok(Some(found.iter().map(to_instance).collect()))
        } else {
            Ok(None)
        }
    })
    .await
}
