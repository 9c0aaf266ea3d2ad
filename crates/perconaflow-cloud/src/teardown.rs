//! Tag-driven, dependency-ordered teardown
//!
//! The cloud's tag index is the only record of what belongs to a cluster.
//! Discovered objects are bucketed by kind and deleted in [`ResourceKind`]
//! order, which is the reverse of how they depend on each other.

use crate::error::{CloudError, Result};
use crate::resource::{RESOURCE_ID_LABEL, ResourceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// Kinds of cloud object a cluster owns.
///
/// Declaration order is deletion order: instances vacate the subnet and
/// security group first, gateways detach before the VPC goes, the key pair is
/// last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Instance,
    RouteTable,
    Subnet,
    SecurityGroup,
    InternetGateway,
    Vpc,
    KeyPair,
}

impl ResourceKind {
    /// Order [`DeletionPlan::steps`] walks the buckets in
    pub const DELETION_ORDER: [ResourceKind; 7] = [
        ResourceKind::Instance,
        ResourceKind::RouteTable,
        ResourceKind::Subnet,
        ResourceKind::SecurityGroup,
        ResourceKind::InternetGateway,
        ResourceKind::Vpc,
        ResourceKind::KeyPair,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "instance",
            ResourceKind::RouteTable => "route table",
            ResourceKind::Subnet => "subnet",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::InternetGateway => "internet gateway",
            ResourceKind::Vpc => "VPC",
            ResourceKind::KeyPair => "key pair",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One object found in the tag index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedResource {
    pub kind: ResourceKind,
    pub id: String,
}

impl TaggedResource {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Query side of a cloud's tagging index
#[async_trait]
pub trait TagIndex: Send + Sync {
    /// Every object whose tag `key` equals `value`
    async fn find_tagged(&self, key: &str, value: &str) -> Result<Vec<TaggedResource>>;
}

/// Deletes objects of one kind.
///
/// Implementations treat an already-deleted object as success so that a second
/// teardown after a partial one converges.
#[async_trait]
pub trait ResourceDeleter: Send + Sync {
    async fn delete(&self, kind: ResourceKind, ids: &[String]) -> Result<()>;
}

/// Discovered objects bucketed by kind
#[derive(Debug, Clone, Default)]
pub struct DeletionPlan {
    buckets: BTreeMap<ResourceKind, Vec<String>>,
}

impl DeletionPlan {
    pub fn new(resources: impl IntoIterator<Item = TaggedResource>) -> Self {
        let mut buckets: BTreeMap<ResourceKind, Vec<String>> = BTreeMap::new();
        for resource in resources {
            let ids = buckets.entry(resource.kind).or_default();
            if !ids.contains(&resource.id) {
                ids.push(resource.id);
            }
        }
        Self { buckets }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Non-empty buckets in [`ResourceKind::DELETION_ORDER`]
    pub fn steps(&self) -> impl Iterator<Item = (ResourceKind, &[String])> {
        ResourceKind::DELETION_ORDER.into_iter().filter_map(|kind| {
            self.buckets
                .get(&kind)
                .filter(|ids| !ids.is_empty())
                .map(|ids| (kind, ids.as_slice()))
        })
    }

    /// Flattened deletion order
    pub fn order(&self) -> Vec<TaggedResource> {
        self.steps()
            .flat_map(|(kind, ids)| ids.iter().map(move |id| TaggedResource::new(kind, id.clone())))
            .collect()
    }
}

/// Outcome of one teardown run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    pub deleted: Vec<TaggedResource>,
    pub failed: Vec<FailedDeletion>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedDeletion {
    pub resource: TaggedResource,
    pub error: String,
}

impl TeardownReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deletion Orchestrator
pub struct Teardown<'a> {
    index: &'a dyn TagIndex,
    deleter: &'a dyn ResourceDeleter,
    ignore_errors: bool,
}

impl<'a> Teardown<'a> {
    pub fn new(index: &'a dyn TagIndex, deleter: &'a dyn ResourceDeleter) -> Self {
        Self {
            index,
            deleter,
            ignore_errors: false,
        }
    }

    /// Log failures and keep going instead of stopping at the first one
    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    pub async fn plan(&self, resource_id: &ResourceId) -> Result<DeletionPlan> {
        let found = self
            .index
            .find_tagged(RESOURCE_ID_LABEL, resource_id.as_str())
            .await?;
        Ok(DeletionPlan::new(found))
    }

    pub async fn run(&self, resource_id: &ResourceId) -> Result<TeardownReport> {
        let start = Instant::now();
        let plan = self.plan(resource_id).await?;

        if plan.is_empty() {
            tracing::info!("No resources tagged with {}", resource_id);
        } else {
            tracing::info!("Deleting {} resource(s) tagged with {}", plan.len(), resource_id);
        }

        let mut report = TeardownReport::default();
        for (kind, ids) in plan.steps() {
            // Instances go in one call so termination waits overlap
            let batches: Vec<&[String]> = if kind == ResourceKind::Instance {
                vec![ids]
            } else {
                ids.chunks(1).collect()
            };

            for batch in batches {
                tracing::info!("Deleting {} {}", kind, batch.join(", "));
                match self.deleter.delete(kind, batch).await {
                    Ok(()) => report
                        .deleted
                        .extend(batch.iter().map(|id| TaggedResource::new(kind, id.clone()))),
                    Err(e) if self.ignore_errors => {
                        tracing::warn!("Failed to delete {} {}: {}", kind, batch.join(", "), e);
                        report.failed.extend(batch.iter().map(|id| FailedDeletion {
                            resource: TaggedResource::new(kind, id.clone()),
                            error: e.to_string(),
                        }));
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }
}

/// Map a "not found" error to success for idempotent deletes
pub fn ignore_not_found(result: Result<()>, is_not_found: impl FnOnce(&CloudError) -> bool) -> Result<()> {
    match result {
        Err(e) if is_not_found(&e) => {
            tracing::debug!("Already gone: {}", e);
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Tag index and deleter over one in-memory object set
    #[derive(Default)]
    struct MemoryCloud {
        objects: Mutex<Vec<(TaggedResource, String)>>,
        calls: Mutex<Vec<(ResourceKind, Vec<String>)>>,
        failing: Option<ResourceKind>,
    }

    impl MemoryCloud {
        fn with(resources: &[(ResourceKind, &str)], owner: &str) -> Self {
            let cloud = Self::default();
            cloud.objects.lock().unwrap().extend(
                resources
                    .iter()
                    .map(|(kind, id)| (TaggedResource::new(*kind, *id), owner.to_string())),
            );
            cloud
        }
    }

    #[async_trait]
    impl TagIndex for MemoryCloud {
        async fn find_tagged(&self, key: &str, value: &str) -> Result<Vec<TaggedResource>> {
            assert_eq!(key, RESOURCE_ID_LABEL);
            Ok(self
                .objects
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, owner)| owner == value)
                .map(|(r, _)| r.clone())
                .collect())
        }
    }

    #[async_trait]
    impl ResourceDeleter for MemoryCloud {
        async fn delete(&self, kind: ResourceKind, ids: &[String]) -> Result<()> {
            self.calls.lock().unwrap().push((kind, ids.to_vec()));
            if self.failing == Some(kind) {
                return Err(CloudError::api("delete", "DependencyViolation"));
            }
            self.objects
                .lock()
                .unwrap()
                .retain(|(r, _)| !(r.kind == kind && ids.contains(&r.id)));
            Ok(())
        }
    }

    fn cluster_fixture() -> Vec<(ResourceKind, &'static str)> {
        // Deliberately scrambled discovery order
        vec![
            (ResourceKind::Vpc, "vpc-1"),
            (ResourceKind::SecurityGroup, "sg-1"),
            (ResourceKind::Instance, "i-1"),
            (ResourceKind::Subnet, "subnet-1"),
            (ResourceKind::InternetGateway, "igw-1"),
            (ResourceKind::RouteTable, "rtb-1"),
            (ResourceKind::Instance, "i-2"),
        ]
    }

    fn position(order: &[TaggedResource], id: &str) -> usize {
        order.iter().position(|r| r.id == id).unwrap()
    }

    #[test]
    fn test_deletion_order() {
        let plan = DeletionPlan::new(
            cluster_fixture()
                .into_iter()
                .map(|(kind, id)| TaggedResource::new(kind, id)),
        );
        let order = plan.order();

        assert_eq!(order.len(), 7);
        for instance in ["i-1", "i-2"] {
            assert!(position(&order, instance) < position(&order, "subnet-1"));
            assert!(position(&order, instance) < position(&order, "sg-1"));
        }
        assert!(position(&order, "subnet-1") < position(&order, "vpc-1"));
        assert!(position(&order, "sg-1") < position(&order, "vpc-1"));
        assert!(position(&order, "igw-1") < position(&order, "vpc-1"));
        assert!(position(&order, "rtb-1") < position(&order, "subnet-1"));
    }

    #[test]
    fn test_deletion_order_covers_every_kind_once() {
        let mut sorted = ResourceKind::DELETION_ORDER.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ResourceKind::DELETION_ORDER.len());
        assert_eq!(sorted, ResourceKind::DELETION_ORDER.to_vec());
    }

    #[test]
    fn test_steps_follow_deletion_order() {
        let plan = DeletionPlan::new(vec![
            TaggedResource::new(ResourceKind::KeyPair, "key-1"),
            TaggedResource::new(ResourceKind::Vpc, "vpc-1"),
            TaggedResource::new(ResourceKind::SecurityGroup, "sg-1"),
            TaggedResource::new(ResourceKind::Instance, "i-1"),
        ]);
        let kinds: Vec<ResourceKind> = plan.steps().map(|(kind, _)| kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Instance,
                ResourceKind::SecurityGroup,
                ResourceKind::Vpc,
                ResourceKind::KeyPair,
            ]
        );
    }

    #[test]
    fn test_plan_deduplicates() {
        let plan = DeletionPlan::new(vec![
            TaggedResource::new(ResourceKind::Vpc, "vpc-1"),
            TaggedResource::new(ResourceKind::Vpc, "vpc-1"),
        ]);
        assert_eq!(plan.len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_deletes_everything_once() {
        let cloud = MemoryCloud::with(&cluster_fixture(), "abc");
        cloud
            .objects
            .lock()
            .unwrap()
            .push((TaggedResource::new(ResourceKind::Vpc, "vpc-other"), "xyz".to_string()));
        let id = ResourceId::new("abc");

        let report = Teardown::new(&cloud, &cloud).run(&id).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.deleted.len(), 7);

        let calls = cloud.calls.lock().unwrap().clone();
        assert_eq!(calls[0], (ResourceKind::Instance, vec!["i-1".to_string(), "i-2".to_string()]));
        assert_eq!(calls.last().unwrap().0, ResourceKind::Vpc);
        assert_eq!(cloud.objects.lock().unwrap().len(), 1);

        // Second pass finds nothing left
        let again = Teardown::new(&cloud, &cloud).run(&id).await.unwrap();
        assert!(again.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_fail_fast() {
        let mut cloud = MemoryCloud::with(&cluster_fixture(), "abc");
        cloud.failing = Some(ResourceKind::Subnet);

        let result = Teardown::new(&cloud, &cloud).run(&ResourceId::new("abc")).await;
        assert!(matches!(result, Err(CloudError::Api { .. })));

        let calls = cloud.calls.lock().unwrap();
        assert_eq!(calls.last().unwrap().0, ResourceKind::Subnet);
        assert!(!calls.iter().any(|(kind, _)| *kind == ResourceKind::Vpc));
    }

    #[tokio::test]
    async fn test_teardown_ignore_errors() {
        let mut cloud = MemoryCloud::with(&cluster_fixture(), "abc");
        cloud.failing = Some(ResourceKind::SecurityGroup);

        let report = Teardown::new(&cloud, &cloud)
            .ignore_errors(true)
            .run(&ResourceId::new("abc"))
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].resource.id, "sg-1");
        assert_eq!(report.deleted.len(), 6);
    }

    #[test]
    fn test_ignore_not_found() {
        let gone = Err(CloudError::ResourceNotFound("vpc-1".to_string()));
        assert!(ignore_not_found(gone, |e| matches!(e, CloudError::ResourceNotFound(_))).is_ok());

        let busy = Err(CloudError::api("DeleteVpc", "DependencyViolation"));
        assert!(ignore_not_found(busy, |e| matches!(e, CloudError::ResourceNotFound(_))).is_err());
    }
}
