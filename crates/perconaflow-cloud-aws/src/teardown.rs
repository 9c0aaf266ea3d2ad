//! EC2 tag index and dependency-ordered deleter

use crate::error::{api_error, is_dependency_violation, tolerate_not_found};
use crate::instances::wait_terminated;
use crate::network::{ALL_ADDRESSES_CIDR_BLOCK, allow_all};
use crate::tags::{filter, resource_kind};
use async_trait::async_trait;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::error::ProvideErrorMetadata;
use perconaflow_cloud::{
    PollConfig, ResourceDeleter, ResourceKind, Result, TagIndex, TaggedResource, poll_until,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// EC2 DescribeTags as the tag index
pub(crate) struct Ec2TagIndex<'a> {
    pub client: &'a Client,
}

#[async_trait]
impl TagIndex for Ec2TagIndex<'_> {
    async fn find_tagged(&self, key: &str, value: &str) -> Result<Vec<TaggedResource>> {
        let mut pages = self
            .client
            .describe_tags()
            .filters(filter("key", key))
            .filters(filter("value", value))
            .into_paginator()
            .send();

        let mut found = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| api_error("DescribeTags", e))?;
            for tag in page.tags() {
                let (Some(resource_type), Some(id)) = (tag.resource_type(), tag.resource_id())
                else {
                    continue;
                };
                match resource_kind(resource_type) {
                    Some(kind) => found.push(TaggedResource::new(kind, id)),
                    None => tracing::warn!("Skipping tagged {} {}", resource_type.as_str(), id),
                }
            }
        }
        Ok(found)
    }
}

pub(crate) struct Ec2Deleter<'a> {
    pub client: &'a Client,
    pub cancel: CancellationToken,
}

impl Ec2Deleter<'_> {
    /// Retry a delete while EC2 still sees dependents (ENIs released after
    /// termination, rules being revoked)
    async fn retry_dependents<F, Fut, T, E>(&self, operation: &str, mut call: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        E: std::error::Error + ProvideErrorMetadata,
    {
        let poll = PollConfig::new(Duration::from_secs(10), Duration::from_secs(5 * 60))
            .with_cancel(self.cancel.clone());
        poll_until(&poll, operation, || {
            let attempt = call();
            async move {
                match attempt.await {
                    Err(e) if e.code().is_some_and(is_dependency_violation) => {
                        tracing::debug!("{}: dependency violation, retrying", operation);
                        Ok(None)
                    }
                    result => tolerate_not_found(operation, result).map(|_| Some(())),
                }
            }
        })
        .await
    }

    async fn delete_instances(&self, ids: &[String]) -> Result<()> {
        let terminated = tolerate_not_found(
            "TerminateInstances",
            self.client
                .terminate_instances()
                .set_instance_ids(Some(ids.to_vec()))
                .send()
                .await,
        )?;
        if terminated.is_some() {
            let poll = PollConfig::instance_status(self.cancel.clone());
            wait_terminated(self.client, ids, &poll).await?;
        }
        Ok(())
    }

    async fn delete_route_table(&self, id: &str) -> Result<()> {
        let Some(output) = tolerate_not_found(
            "DescribeRouteTables",
            self.client.describe_route_tables().route_table_ids(id).send().await,
        )?
        else {
            return Ok(());
        };

        let associations = output
            .route_tables()
            .iter()
            .flat_map(|t| t.associations())
            .filter(|a| !a.main().unwrap_or(false))
            .filter_map(|a| a.route_table_association_id());
        for association_id in associations {
            tolerate_not_found(
                "DisassociateRouteTable",
                self.client
                    .disassociate_route_table()
                    .association_id(association_id)
                    .send()
                    .await,
            )?;
        }

        self.retry_dependents("DeleteRouteTable", || {
            self.client.delete_route_table().route_table_id(id).send()
        })
        .await
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        tolerate_not_found(
            "RevokeSecurityGroupIngress",
            self.client
                .revoke_security_group_ingress()
                .group_id(id)
                .ip_permissions(allow_all(Some(ALL_ADDRESSES_CIDR_BLOCK)))
                .send()
                .await,
        )?;
        tolerate_not_found(
            "RevokeSecurityGroupEgress",
            self.client
                .revoke_security_group_egress()
                .group_id(id)
                .ip_permissions(allow_all(Some(ALL_ADDRESSES_CIDR_BLOCK)))
                .send()
                .await,
        )?;

        self.retry_dependents("DeleteSecurityGroup", || {
            self.client.delete_security_group().group_id(id).send()
        })
        .await
    }

    async fn delete_gateway(&self, id: &str) -> Result<()> {
        let Some(output) = tolerate_not_found(
            "DescribeInternetGateways",
            self.client
                .describe_internet_gateways()
                .internet_gateway_ids(id)
                .send()
                .await,
        )?
        else {
            return Ok(());
        };

        let vpc_ids = output
            .internet_gateways()
            .iter()
            .flat_map(|g| g.attachments())
            .filter_map(|a| a.vpc_id());
        for vpc_id in vpc_ids {
            self.retry_dependents("DetachInternetGateway", || {
                self.client
                    .detach_internet_gateway()
                    .internet_gateway_id(id)
                    .vpc_id(vpc_id)
                    .send()
            })
            .await?;
        }

        self.retry_dependents("DeleteInternetGateway", || {
            self.client.delete_internet_gateway().internet_gateway_id(id).send()
        })
        .await
    }

    async fn delete_vpc(&self, id: &str) -> Result<()> {
        let Some(output) = tolerate_not_found(
            "DescribeVpcs",
            self.client.describe_vpcs().vpc_ids(id).send().await,
        )?
        else {
            return Ok(());
        };
        if output.vpcs().iter().any(|v| v.is_default().unwrap_or(false)) {
            tracing::info!("Keeping default VPC {}", id);
            return Ok(());
        }

        self.retry_dependents("DeleteVpc", || self.client.delete_vpc().vpc_id(id).send())
            .await
    }
}

#[async_trait]
impl ResourceDeleter for Ec2Deleter<'_> {
    async fn delete(&self, kind: ResourceKind, ids: &[String]) -> Result<()> {
        if kind == ResourceKind::Instance {
            return self.delete_instances(ids).await;
        }
        for id in ids {
            self.delete_one(kind, id).await?;
        }
        Ok(())
    }
}

impl Ec2Deleter<'_> {
    async fn delete_one(&self, kind: ResourceKind, id: &str) -> Result<()> {
        match kind {
            ResourceKind::Instance => self.delete_instances(&[id.to_string()]).await,
            ResourceKind::RouteTable => self.delete_route_table(id).await,
            ResourceKind::Subnet => {
                self.retry_dependents("DeleteSubnet", || {
                    self.client.delete_subnet().subnet_id(id).send()
                })
                .await
            }
            ResourceKind::SecurityGroup => self.delete_security_group(id).await,
            ResourceKind::InternetGateway => self.delete_gateway(id).await,
            ResourceKind::Vpc => self.delete_vpc(id).await,
            ResourceKind::KeyPair => tolerate_not_found(
                "DeleteKeyPair",
                self.client.delete_key_pair().key_pair_id(id).send().await,
            )
            .map(|_| ()),
        }
    }
}
