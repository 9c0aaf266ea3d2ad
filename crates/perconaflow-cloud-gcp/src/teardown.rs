//! Compute Engine tag index and deleter
//!
//! Instances are found by label; networks, subnetworks and firewalls by the
//! `key=value` description written when they were created.

use crate::compute::{ComputeClient, ComputeInstance, NamedResource, Operation};
use crate::error::Result as GcpResult;
use crate::network::{IMPLICIT_GATEWAY, IMPLICIT_ROUTE_TABLE};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use perconaflow_cloud::{
    PollConfig, ResourceDeleter, ResourceKind, Result, TagIndex, TaggedResource,
};

pub(crate) struct GceTagIndex<'a> {
    pub compute: &'a ComputeClient,
}

impl GceTagIndex<'_> {
    async fn described(&self, operation: &str, path: &str, tag: &str) -> GcpResult<Vec<String>> {
        let filter = format!("description = \"{}\"", tag);
        let found: Vec<NamedResource> = self.compute.list(operation, path, Some(&filter)).await?;
        Ok(found.into_iter().map(|r| r.name).collect())
    }
}

#[async_trait]
impl TagIndex for GceTagIndex<'_> {
    async fn find_tagged(&self, key: &str, value: &str) -> Result<Vec<TaggedResource>> {
        let compute = self.compute;
        let tag = format!("{}={}", key, value);
        let mut found = Vec::new();

        let instances: Vec<ComputeInstance> = compute
            .list(
                "list instances",
                &compute.zonal("instances"),
                Some(&format!("labels.{} = \"{}\"", key, value)),
            )
            .await?;
        found.extend(
            instances
                .into_iter()
                .map(|i| TaggedResource::new(ResourceKind::Instance, i.name)),
        );

        let described = [
            (ResourceKind::SecurityGroup, "list firewalls", compute.global("firewalls")),
            (ResourceKind::Subnet, "list subnetworks", compute.regional("subnetworks")),
            (ResourceKind::Vpc, "list networks", compute.global("networks")),
        ];
        for (kind, operation, path) in described {
            for name in self.described(operation, &path, &tag).await? {
                found.push(TaggedResource::new(kind, name));
            }
        }
        Ok(found)
    }
}

pub(crate) struct GceDeleter<'a> {
    pub compute: &'a ComputeClient,
    pub poll: PollConfig,
}

impl GceDeleter<'_> {
    async fn issue(&self, operation: &str, path: &str) -> GcpResult<Option<Operation>> {
        let op = self.compute.delete(operation, path).await?;
        if op.is_none() {
            tracing::debug!("{} already gone", path);
        }
        Ok(op)
    }

    async fn delete_and_wait(&self, operation: &str, path: &str) -> GcpResult<()> {
        match self.issue(operation, path).await? {
            Some(op) => self.compute.wait(operation, &op, &self.poll).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ResourceDeleter for GceDeleter<'_> {
    async fn delete(&self, kind: ResourceKind, ids: &[String]) -> Result<()> {
        let compute = self.compute;
        match kind {
            // Issue every delete first, then wait on the operations together
            ResourceKind::Instance => {
                let mut pending = Vec::new();
                for name in ids {
                    let path = compute.zonal(&format!("instances/{}", name));
                    if let Some(op) = self.issue("delete instance", &path).await? {
                        pending.push(op);
                    }
                }
                try_join_all(
                    pending
                        .iter()
                        .map(|op| compute.wait("delete instance", op, &self.poll)),
                )
                .await?;
            }
            ResourceKind::SecurityGroup => {
                for name in ids {
                    let path = compute.global(&format!("firewalls/{}", name));
                    self.delete_and_wait("delete firewall", &path).await?;
                }
            }
            ResourceKind::Subnet => {
                for name in ids {
                    let path = compute.regional(&format!("subnetworks/{}", name));
                    self.delete_and_wait("delete subnetwork", &path).await?;
                }
            }
            ResourceKind::Vpc => {
                for name in ids {
                    let path = compute.global(&format!("networks/{}", name));
                    self.delete_and_wait("delete network", &path).await?;
                }
            }
            ResourceKind::InternetGateway | ResourceKind::RouteTable | ResourceKind::KeyPair => {
                tracing::debug!(
                    "Nothing to delete for {} {:?} ({} / {} are implicit)",
                    kind,
                    ids,
                    IMPLICIT_GATEWAY,
                    IMPLICIT_ROUTE_TABLE
                );
            }
        }
        Ok(())
    }
}
