//! Compute Engine implementation of the network get-or-create operations
//!
//! Networks, subnetworks and firewalls carry no labels, so the ResourceID is
//! written into their description. The internet gateway and route table are
//! implicit in a GCP network (default internet route) and only reported back.

use crate::compute::{ComputeClient, NamedResource, is_conflict};
use async_trait::async_trait;
use perconaflow_cloud::{Labels, NetworkApi, PollConfig, Result, VpcLookup};
use serde_json::json;

pub(crate) const SUBNET_CIDR_BLOCK: &str = "10.0.1.0/24";
pub(crate) const ALL_ADDRESSES_CIDR_BLOCK: &str = "0.0.0.0/0";
pub(crate) const IMPLICIT_GATEWAY: &str = "default-internet-gateway";
pub(crate) const IMPLICIT_ROUTE_TABLE: &str = "default-route";

/// `key=value` pairs of `tags`, space separated
pub(crate) fn description(tags: &Labels) -> String {
    tags.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) struct GceNetwork<'a> {
    pub compute: &'a ComputeClient,
    pub poll: PollConfig,
}

impl GceNetwork<'_> {
    async fn exists(&self, operation: &str, path: &str) -> Result<Option<String>> {
        let found: Option<NamedResource> = self.compute.get(operation, path).await?;
        Ok(found.map(|r| r.name))
    }

    /// Insert and wait; a 409 means a concurrent or earlier insert won
    async fn insert(
        &self,
        operation: &str,
        collection: &str,
        name: &str,
        body: serde_json::Value,
    ) -> Result<String> {
        match self.compute.insert(operation, collection, &body).await {
            Ok(op) => self.compute.wait(operation, &op, &self.poll).await?,
            Err(e) if is_conflict(&e) => {
                tracing::debug!("{} {} already exists", operation, name);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(name.to_string())
    }
}

#[async_trait]
impl NetworkApi for GceNetwork<'_> {
    /// Keys travel in instance metadata; nothing is registered in the project
    async fn find_key_pair(&self, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn import_key_pair(&self, name: &str, _public_key: &str, _tags: &Labels) -> Result<String> {
        Ok(name.to_string())
    }

    async fn find_vpc(&self, lookup: &VpcLookup) -> Result<Option<String>> {
        let name = match lookup {
            VpcLookup::Id(name) | VpcLookup::Name(name) => name,
        };
        self.exists("get network", &self.compute.global(&format!("networks/{}", name)))
            .await
    }

    async fn create_vpc(&self, name: &str, tags: &Labels) -> Result<String> {
        let body = json!({
            "name": name,
            "description": description(tags),
            "autoCreateSubnetworks": false,
        });
        self.insert("insert network", &self.compute.global("networks"), name, body)
            .await
    }

    async fn find_gateway(&self, _name: &str) -> Result<Option<String>> {
        Ok(Some(IMPLICIT_GATEWAY.to_string()))
    }

    async fn create_gateway(&self, _name: &str, _vpc_id: &str, _tags: &Labels) -> Result<String> {
        Ok(IMPLICIT_GATEWAY.to_string())
    }

    async fn find_security_group(&self, _vpc_id: &str, name: &str) -> Result<Option<String>> {
        self.exists("get firewall", &self.compute.global(&format!("firewalls/{}", name)))
            .await
    }

    async fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        tags: &Labels,
    ) -> Result<String> {
        let network = self
            .compute
            .resource_link(&self.compute.global(&format!("networks/{}", vpc_id)));
        let body = json!({
            "name": name,
            "description": description(tags),
            "network": network,
            "direction": "INGRESS",
            "sourceRanges": [ALL_ADDRESSES_CIDR_BLOCK],
            "allowed": [{ "IPProtocol": "all" }],
        });
        self.insert("insert firewall", &self.compute.global("firewalls"), name, body)
            .await
    }

    async fn find_subnet(&self, _vpc_id: &str, name: &str) -> Result<Option<String>> {
        self.exists(
            "get subnetwork",
            &self.compute.regional(&format!("subnetworks/{}", name)),
        )
        .await
    }

    async fn create_subnet(&self, vpc_id: &str, name: &str, tags: &Labels) -> Result<String> {
        let network = self
            .compute
            .resource_link(&self.compute.global(&format!("networks/{}", vpc_id)));
        let body = json!({
            "name": name,
            "description": description(tags),
            "network": network,
            "ipCidrRange": SUBNET_CIDR_BLOCK,
        });
        self.insert(
            "insert subnetwork",
            &self.compute.regional("subnetworks"),
            name,
            body,
        )
        .await
    }

    async fn find_route_table(&self, _vpc_id: &str, _name: &str) -> Result<Option<String>> {
        Ok(Some(IMPLICIT_ROUTE_TABLE.to_string()))
    }

    async fn create_route_table(
        &self,
        _vpc_id: &str,
        _gateway_id: &str,
        _subnet_id: &str,
        _name: &str,
        _tags: &Labels,
    ) -> Result<String> {
        Ok(IMPLICIT_ROUTE_TABLE.to_string())
    }
}
