//! Instance launch, health wait and tag-filtered listing

use crate::error::api_error;
use crate::tags::{label_filters, tag_specification};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{
    BlockDeviceMapping, EbsBlockDevice, Filter, InstanceNetworkInterfaceSpecification,
    InstanceStateName, InstanceType, ResourceType, SummaryStatus, VolumeType,
};
use perconaflow_cloud::{CloudError, Instance, Labels, PollConfig, Result, poll_until};

const ROOT_DEVICE: &str = "/dev/sda1";

/// Everything RunInstances needs for one batch
#[derive(Debug, Clone)]
pub(crate) struct LaunchSpec {
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub security_group_id: String,
    pub subnet_id: String,
    pub volume_type: String,
    pub volume_size: i32,
    pub volume_iops: Option<i32>,
    pub volume_throughput: Option<i32>,
}

/// Launch `count` instances in one call and return their ids
pub(crate) async fn launch(
    client: &Client,
    spec: &LaunchSpec,
    count: i32,
    labels: &Labels,
) -> Result<Vec<String>> {
    let network = InstanceNetworkInterfaceSpecification::builder()
        .associate_public_ip_address(true)
        .device_index(0)
        .groups(&spec.security_group_id)
        .subnet_id(&spec.subnet_id)
        .build();
    let volume = BlockDeviceMapping::builder()
        .device_name(ROOT_DEVICE)
        .ebs(
            EbsBlockDevice::builder()
                .volume_type(VolumeType::from(spec.volume_type.as_str()))
                .volume_size(spec.volume_size)
                .set_iops(spec.volume_iops)
                .set_throughput(spec.volume_throughput)
                .build(),
        )
        .build();

    let output = client
        .run_instances()
        .image_id(&spec.image_id)
        .instance_type(InstanceType::from(spec.instance_type.as_str()))
        .min_count(count)
        .max_count(count)
        .key_name(&spec.key_name)
        .network_interfaces(network)
        .block_device_mappings(volume)
        .tag_specifications(tag_specification(ResourceType::Instance, labels, None))
        .send()
        .await
        .map_err(|e| api_error("RunInstances", e))?;

    let ids: Vec<String> = output
        .instances()
        .iter()
        .filter_map(|i| i.instance_id())
        .map(str::to_string)
        .collect();
    tracing::info!("Launched {} instance(s): {}", ids.len(), ids.join(", "));
    Ok(ids)
}

/// Block until every instance passes its status checks
pub(crate) async fn wait_status_ok(client: &Client, ids: &[String], poll: &PollConfig) -> Result<()> {
    poll_until(poll, "instance status checks", move || async move {
        let output = client
            .describe_instance_status()
            .set_instance_ids(Some(ids.to_vec()))
            .include_all_instances(true)
            .send()
            .await
            .map_err(|e| api_error("DescribeInstanceStatus", e))?;

        let ok = output
            .instance_statuses()
            .iter()
            .filter(|s| {
                s.instance_status().and_then(|st| st.status()) == Some(&SummaryStatus::Ok)
            })
            .count();
        tracing::debug!("{}/{} instance(s) passed status checks", ok, ids.len());
        Ok((ok == ids.len()).then_some(()))
    })
    .await
}

/// Block until every instance reports `terminated`
pub(crate) async fn wait_terminated(client: &Client, ids: &[String], poll: &PollConfig) -> Result<()> {
    poll_until(poll, "instance termination", move || async move {
        let output = client
            .describe_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| api_error("DescribeInstances", e))?;

        let all_terminated = output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .all(|i| {
                i.state().and_then(|s| s.name()) == Some(&InstanceStateName::Terminated)
            });
        Ok(all_terminated.then_some(()))
    })
    .await
}

/// Live instances matching every label
pub(crate) async fn list(client: &Client, labels: &Labels) -> Result<Vec<Instance>> {
    let mut filters = label_filters(labels);
    filters.push(
        Filter::builder()
            .name("instance-state-name")
            .values("pending")
            .values("running")
            .build(),
    );

    let mut pages = client
        .describe_instances()
        .set_filters(Some(filters))
        .into_paginator()
        .send();

    let mut instances = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|e| api_error("DescribeInstances", e))?;
        for instance in page.reservations().iter().flat_map(|r| r.instances()) {
            instances.push(Instance::new(
                instance.public_ip_address().unwrap_or_default(),
                instance.private_ip_address().unwrap_or_default(),
            ));
        }
    }
    Ok(instances)
}

pub(crate) fn count_as_i32(count: usize) -> Result<i32> {
    i32::try_from(count)
        .ok()
        .filter(|c| *c > 0)
        .ok_or_else(|| CloudError::InvalidConfig(format!("invalid instance count {}", count)))
}
