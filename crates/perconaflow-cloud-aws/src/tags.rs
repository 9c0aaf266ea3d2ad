//! Labels as EC2 tags and filters

use aws_sdk_ec2::types::{Filter, ResourceType, Tag, TagSpecification};
use perconaflow_cloud::{Labels, ResourceKind};

pub(crate) const NAME_TAG: &str = "Name";

pub(crate) fn tags(labels: &Labels, name: Option<&str>) -> Vec<Tag> {
    labels
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(name.map(|n| (NAME_TAG, n)))
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

pub(crate) fn tag_specification(
    resource_type: ResourceType,
    labels: &Labels,
    name: Option<&str>,
) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(resource_type)
        .set_tags(Some(tags(labels, name)))
        .build()
}

pub(crate) fn filter(name: &str, value: &str) -> Filter {
    Filter::builder().name(name).values(value).build()
}

/// One `tag:<key>` filter per label; EC2 ANDs them
pub(crate) fn label_filters(labels: &Labels) -> Vec<Filter> {
    labels
        .iter()
        .map(|(k, v)| filter(&format!("tag:{}", k), v))
        .collect()
}

pub(crate) fn name_filter(name: &str) -> Filter {
    filter(&format!("tag:{}", NAME_TAG), name)
}

/// Kinds the teardown knows how to delete
pub(crate) fn resource_kind(resource_type: &ResourceType) -> Option<ResourceKind> {
    match resource_type {
        ResourceType::Instance => Some(ResourceKind::Instance),
        ResourceType::RouteTable => Some(ResourceKind::RouteTable),
        ResourceType::Subnet => Some(ResourceKind::Subnet),
        ResourceType::SecurityGroup => Some(ResourceKind::SecurityGroup),
        ResourceType::InternetGateway => Some(ResourceKind::InternetGateway),
        ResourceType::Vpc => Some(ResourceKind::Vpc),
        ResourceType::KeyPair => Some(ResourceKind::KeyPair),
        _ => None,
    }
}
