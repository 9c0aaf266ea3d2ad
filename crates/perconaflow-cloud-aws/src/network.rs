//! EC2 implementation of the network get-or-create operations

use crate::error::{api_error, tolerate_not_found};
use crate::tags::{filter, name_filter, tag_specification};
use async_trait::async_trait;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::primitives::Blob;
use aws_sdk_ec2::types::{AttributeBooleanValue, IpPermission, IpRange, ResourceType};
use perconaflow_cloud::{CloudError, Labels, NetworkApi, Result, VpcLookup};

pub(crate) const VPC_CIDR_BLOCK: &str = "10.0.0.0/16";
pub(crate) const SUBNET_CIDR_BLOCK: &str = "10.0.1.0/24";
pub(crate) const ALL_ADDRESSES_CIDR_BLOCK: &str = "0.0.0.0/0";
const SECURITY_GROUP_DESCRIPTION: &str = "Percona cluster security group";

/// Every protocol, every port, optionally limited to a CIDR block
pub(crate) fn allow_all(cidr: Option<&str>) -> IpPermission {
    IpPermission::builder()
        .ip_protocol("-1")
        .from_port(-1)
        .to_port(-1)
        .set_ip_ranges(cidr.map(|c| vec![IpRange::builder().cidr_ip(c).build()]))
        .build()
}

fn created(operation: &str, id: Option<&str>) -> Result<String> {
    id.map(str::to_string)
        .ok_or_else(|| CloudError::api(operation, "response carried no id"))
}

pub(crate) struct Ec2Network<'a> {
    pub client: &'a Client,
    pub zone: Option<&'a str>,
}

#[async_trait]
impl NetworkApi for Ec2Network<'_> {
    async fn find_key_pair(&self, name: &str) -> Result<Option<String>> {
        let output = tolerate_not_found(
            "DescribeKeyPairs",
            self.client
                .describe_key_pairs()
                .key_names(name)
                .include_public_key(true)
                .send()
                .await,
        )?;
        Ok(output.and_then(|o| {
            o.key_pairs()
                .first()
                .and_then(|k| k.public_key())
                .map(str::to_string)
        }))
    }

    async fn import_key_pair(&self, name: &str, public_key: &str, tags: &Labels) -> Result<String> {
        let output = self
            .client
            .import_key_pair()
            .key_name(name)
            .public_key_material(Blob::new(public_key.as_bytes()))
            .tag_specifications(tag_specification(ResourceType::KeyPair, tags, None))
            .send()
            .await
            .map_err(|e| api_error("ImportKeyPair", e))?;
        created("ImportKeyPair", output.key_pair_id())
    }

    async fn find_vpc(&self, lookup: &VpcLookup) -> Result<Option<String>> {
        let request = match lookup {
            VpcLookup::Id(id) => self.client.describe_vpcs().vpc_ids(id),
            VpcLookup::Name(name) => self.client.describe_vpcs().filters(name_filter(name)),
        };
        let output = tolerate_not_found("DescribeVpcs", request.send().await)?;
        Ok(output.and_then(|o| {
            o.vpcs()
                .first()
                .and_then(|v| v.vpc_id())
                .map(str::to_string)
        }))
    }

    async fn create_vpc(&self, name: &str, tags: &Labels) -> Result<String> {
        let output = self
            .client
            .create_vpc()
            .cidr_block(VPC_CIDR_BLOCK)
            .tag_specifications(tag_specification(ResourceType::Vpc, tags, Some(name)))
            .send()
            .await
            .map_err(|e| api_error("CreateVpc", e))?;
        let vpc_id = created("CreateVpc", output.vpc().and_then(|v| v.vpc_id()))?;

        self.client
            .modify_vpc_attribute()
            .vpc_id(&vpc_id)
            .enable_dns_hostnames(AttributeBooleanValue::builder().value(true).build())
            .send()
            .await
            .map_err(|e| api_error("ModifyVpcAttribute", e))?;

        Ok(vpc_id)
    }

    async fn find_gateway(&self, name: &str) -> Result<Option<String>> {
        let output = self
            .client
            .describe_internet_gateways()
            .filters(name_filter(name))
            .send()
            .await
            .map_err(|e| api_error("DescribeInternetGateways", e))?;
        Ok(output
            .internet_gateways()
            .first()
            .and_then(|g| g.internet_gateway_id())
            .map(str::to_string))
    }

    async fn create_gateway(&self, name: &str, vpc_id: &str, tags: &Labels) -> Result<String> {
        let output = self
            .client
            .create_internet_gateway()
            .tag_specifications(tag_specification(
                ResourceType::InternetGateway,
                tags,
                Some(name),
            ))
            .send()
            .await
            .map_err(|e| api_error("CreateInternetGateway", e))?;
        let gateway_id = created(
            "CreateInternetGateway",
            output.internet_gateway().and_then(|g| g.internet_gateway_id()),
        )?;

        self.client
            .attach_internet_gateway()
            .internet_gateway_id(&gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| api_error("AttachInternetGateway", e))?;

        Ok(gateway_id)
    }

    async fn find_security_group(&self, vpc_id: &str, name: &str) -> Result<Option<String>> {
        let output = self
            .client
            .describe_security_groups()
            .filters(filter("vpc-id", vpc_id))
            .filters(filter("group-name", name))
            .send()
            .await
            .map_err(|e| api_error("DescribeSecurityGroups", e))?;
        Ok(output
            .security_groups()
            .first()
            .and_then(|g| g.group_id())
            .map(str::to_string))
    }

    async fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        tags: &Labels,
    ) -> Result<String> {
        let output = self
            .client
            .create_security_group()
            .group_name(name)
            .description(SECURITY_GROUP_DESCRIPTION)
            .vpc_id(vpc_id)
            .tag_specifications(tag_specification(
                ResourceType::SecurityGroup,
                tags,
                Some(name),
            ))
            .send()
            .await
            .map_err(|e| api_error("CreateSecurityGroup", e))?;
        let group_id = created("CreateSecurityGroup", output.group_id())?;

        // Allow-all in both directions. New groups already carry the default
        // egress rule, so a duplicate is expected there.
        let ingress = self
            .client
            .authorize_security_group_ingress()
            .group_id(&group_id)
            .ip_permissions(allow_all(Some(ALL_ADDRESSES_CIDR_BLOCK)))
            .send()
            .await;
        tolerate_duplicate("AuthorizeSecurityGroupIngress", ingress)?;

        let egress = self
            .client
            .authorize_security_group_egress()
            .group_id(&group_id)
            .ip_permissions(allow_all(Some(ALL_ADDRESSES_CIDR_BLOCK)))
            .send()
            .await;
        tolerate_duplicate("AuthorizeSecurityGroupEgress", egress)?;

        Ok(group_id)
    }

    async fn find_subnet(&self, vpc_id: &str, name: &str) -> Result<Option<String>> {
        let output = self
            .client
            .describe_subnets()
            .filters(filter("vpc-id", vpc_id))
            .filters(name_filter(name))
            .send()
            .await
            .map_err(|e| api_error("DescribeSubnets", e))?;
        Ok(output
            .subnets()
            .first()
            .and_then(|s| s.subnet_id())
            .map(str::to_string))
    }

    async fn create_subnet(&self, vpc_id: &str, name: &str, tags: &Labels) -> Result<String> {
        let output = self
            .client
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(SUBNET_CIDR_BLOCK)
            .set_availability_zone(self.zone.map(str::to_string))
            .tag_specifications(tag_specification(ResourceType::Subnet, tags, Some(name)))
            .send()
            .await
            .map_err(|e| api_error("CreateSubnet", e))?;
        created("CreateSubnet", output.subnet().and_then(|s| s.subnet_id()))
    }

    async fn find_route_table(&self, vpc_id: &str, name: &str) -> Result<Option<String>> {
        let output = self
            .client
            .describe_route_tables()
            .filters(filter("vpc-id", vpc_id))
            .filters(name_filter(name))
            .send()
            .await
            .map_err(|e| api_error("DescribeRouteTables", e))?;
        Ok(output
            .route_tables()
            .first()
            .and_then(|r| r.route_table_id())
            .map(str::to_string))
    }

    async fn create_route_table(
        &self,
        vpc_id: &str,
        gateway_id: &str,
        subnet_id: &str,
        name: &str,
        tags: &Labels,
    ) -> Result<String> {
        let output = self
            .client
            .create_route_table()
            .vpc_id(vpc_id)
            .tag_specifications(tag_specification(ResourceType::RouteTable, tags, Some(name)))
            .send()
            .await
            .map_err(|e| api_error("CreateRouteTable", e))?;
        let route_table_id = created(
            "CreateRouteTable",
            output.route_table().and_then(|r| r.route_table_id()),
        )?;

        self.client
            .create_route()
            .route_table_id(&route_table_id)
            .destination_cidr_block(ALL_ADDRESSES_CIDR_BLOCK)
            .gateway_id(gateway_id)
            .send()
            .await
            .map_err(|e| api_error("CreateRoute", e))?;

        self.client
            .associate_route_table()
            .route_table_id(&route_table_id)
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| api_error("AssociateRouteTable", e))?;

        Ok(route_table_id)
    }
}

fn tolerate_duplicate<T, E>(operation: &str, result: std::result::Result<T, E>) -> Result<()>
where
    E: std::error::Error + ProvideErrorMetadata,
{
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.code() == Some("InvalidPermission.Duplicate") => Ok(()),
        Err(e) => Err(api_error(operation, e)),
    }
}
