//! Get-or-create reconciliation of cluster networking
//!
//! Adapters expose their cloud's lookups and creates through [`NetworkApi`];
//! [`reconcile_network`] walks them in dependency order so a second run after
//! an interruption discovers and reuses what the first one created.

use crate::error::{CloudError, Result};
use crate::resource::{Labels, ResourceId, resource_labels};
use crate::teardown::ResourceKind;
use async_trait::async_trait;
use perconaflow_config::InfraParams;
use perconaflow_remote::{ensure_key_pair, load_private_key, public_key_openssh, same_public_key};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;

/// How the VPC is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VpcLookup {
    /// Must already exist
    Id(String),
    /// `Name` tag, created when missing
    Name(String),
}

/// Names derived from the VPC for the objects that live inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkNames {
    pub vpc: String,
    pub subnet: String,
    pub gateway: String,
    pub security_group: String,
    pub route_table: String,
}

impl NetworkNames {
    pub fn for_vpc(vpc: &str) -> Self {
        Self {
            vpc: vpc.to_string(),
            subnet: format!("{}-sub", vpc),
            gateway: format!("{}-igw", vpc),
            security_group: format!("{}-sg", vpc),
            route_table: format!("{}-rtb", vpc),
        }
    }
}

/// VPC lookup and derived names for a cluster.
///
/// An explicit VPC id wins over a VPC name; with neither, the VPC is named
/// after the ResourceID.
pub fn network_layout(resource_id: &ResourceId, params: &InfraParams) -> (VpcLookup, NetworkNames) {
    match (&params.vpc_id, &params.vpc_name) {
        (Some(id), _) => (VpcLookup::Id(id.clone()), NetworkNames::for_vpc(id)),
        (None, Some(name)) => (VpcLookup::Name(name.clone()), NetworkNames::for_vpc(name)),
        (None, None) => {
            let name = resource_id.to_string();
            (VpcLookup::Name(name.clone()), NetworkNames::for_vpc(&name))
        }
    }
}

/// Identifiers of the reconciled network objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIds {
    pub vpc_id: String,
    pub gateway_id: String,
    pub security_group_id: String,
    pub subnet_id: String,
    pub route_table_id: String,
}

/// Lookups and creates for one cloud's network objects.
///
/// `find_*` return `Ok(None)` for a missing object. `create_*` attach `tags`
/// (always containing the ResourceID) plus a `Name` tag where the cloud has one.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// Public key registered under `name`, in OpenSSH form
    async fn find_key_pair(&self, name: &str) -> Result<Option<String>>;
    async fn import_key_pair(&self, name: &str, public_key: &str, tags: &Labels) -> Result<String>;

    async fn find_vpc(&self, lookup: &VpcLookup) -> Result<Option<String>>;
    async fn create_vpc(&self, name: &str, tags: &Labels) -> Result<String>;

    async fn find_gateway(&self, name: &str) -> Result<Option<String>>;
    async fn create_gateway(&self, name: &str, vpc_id: &str, tags: &Labels) -> Result<String>;

    async fn find_security_group(&self, vpc_id: &str, name: &str) -> Result<Option<String>>;
    async fn create_security_group(&self, vpc_id: &str, name: &str, tags: &Labels)
    -> Result<String>;

    async fn find_subnet(&self, vpc_id: &str, name: &str) -> Result<Option<String>>;
    async fn create_subnet(&self, vpc_id: &str, name: &str, tags: &Labels) -> Result<String>;

    async fn find_route_table(&self, vpc_id: &str, name: &str) -> Result<Option<String>>;
    async fn create_route_table(
        &self,
        vpc_id: &str,
        gateway_id: &str,
        subnet_id: &str,
        name: &str,
        tags: &Labels,
    ) -> Result<String>;
}

async fn get_or_create(
    kind: ResourceKind,
    name: &str,
    found: Option<String>,
    create: impl Future<Output = Result<String>>,
) -> Result<String> {
    match found {
        Some(id) => {
            tracing::info!("Using existing {} {} ({})", kind, name, id);
            Ok(id)
        }
        None => {
            let id = create.await?;
            tracing::info!("Created {} {} ({})", kind, name, id);
            Ok(id)
        }
    }
}

/// Make sure the key pair `name` exists both locally at `key_path` and in the
/// cloud, returning its OpenSSH public key.
///
/// A key already registered in the cloud is never replaced: the local private
/// key must exist and derive the same public key.
pub async fn reconcile_key_pair<A: NetworkApi + ?Sized>(
    api: &A,
    resource_id: &ResourceId,
    name: &str,
    key_path: &Path,
) -> Result<String> {
    let mismatch = || CloudError::KeyPairMismatch {
        name: name.to_string(),
        path: key_path.to_path_buf(),
    };

    if let Some(remote) = api.find_key_pair(name).await? {
        if !key_path.exists() {
            return Err(mismatch());
        }
        let key = load_private_key(key_path).map_err(|e| CloudError::remote("localhost", e))?;
        let local = public_key_openssh(&key).map_err(|e| CloudError::remote("localhost", e))?;
        if !same_public_key(&local, &remote) {
            return Err(mismatch());
        }
        tracing::info!("Using existing key pair {}", name);
        return Ok(local);
    }

    let public_key = ensure_key_pair(key_path, name)
        .await
        .map_err(|e| CloudError::remote("localhost", e))?;
    let tags = resource_labels(resource_id, &Labels::new());
    let id = api.import_key_pair(name, &public_key, &tags).await?;
    tracing::info!("Imported key pair {} ({})", name, id);
    Ok(public_key)
}

/// Get-or-create VPC, internet gateway, security group, subnet and route table
pub async fn reconcile_network<A: NetworkApi + ?Sized>(
    api: &A,
    resource_id: &ResourceId,
    params: &InfraParams,
) -> Result<NetworkIds> {
    let (lookup, names) = network_layout(resource_id, params);
    let tags = resource_labels(resource_id, &Labels::new());

    let found = api.find_vpc(&lookup).await?;
    let vpc_id = match (&lookup, found) {
        (VpcLookup::Id(id), None) => {
            return Err(CloudError::ResourceNotFound(format!("VPC {}", id)));
        }
        (_, found) => {
            get_or_create(
                ResourceKind::Vpc,
                &names.vpc,
                found,
                api.create_vpc(&names.vpc, &tags),
            )
            .await?
        }
    };

    let gateway_id = get_or_create(
        ResourceKind::InternetGateway,
        &names.gateway,
        api.find_gateway(&names.gateway).await?,
        api.create_gateway(&names.gateway, &vpc_id, &tags),
    )
    .await?;

    let security_group_id = get_or_create(
        ResourceKind::SecurityGroup,
        &names.security_group,
        api.find_security_group(&vpc_id, &names.security_group).await?,
        api.create_security_group(&vpc_id, &names.security_group, &tags),
    )
    .await?;

    let subnet_id = get_or_create(
        ResourceKind::Subnet,
        &names.subnet,
        api.find_subnet(&vpc_id, &names.subnet).await?,
        api.create_subnet(&vpc_id, &names.subnet, &tags),
    )
    .await?;

    let route_table_id = get_or_create(
        ResourceKind::RouteTable,
        &names.route_table,
        api.find_route_table(&vpc_id, &names.route_table).await?,
        api.create_route_table(&vpc_id, &gateway_id, &subnet_id, &names.route_table, &tags),
    )
    .await?;

    Ok(NetworkIds {
        vpc_id,
        gateway_id,
        security_group_id,
        subnet_id,
        route_table_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::RESOURCE_ID_LABEL;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Object {
        kind: ResourceKind,
        id: String,
        name: String,
        vpc_id: Option<String>,
        tags: Labels,
    }

    /// In-memory network keyed by name
    #[derive(Default)]
    struct MemoryNetwork {
        objects: Mutex<Vec<Object>>,
        creates: Mutex<u32>,
        key_material: Mutex<Option<String>>,
    }

    impl MemoryNetwork {
        fn find(&self, kind: ResourceKind, name: &str, vpc_id: Option<&str>) -> Option<String> {
            self.objects
                .lock()
                .unwrap()
                .iter()
                .find(|o| {
                    o.kind == kind
                        && o.name == name
                        && (vpc_id.is_none() || o.vpc_id.as_deref() == vpc_id)
                })
                .map(|o| o.id.clone())
        }

        fn create(&self, kind: ResourceKind, name: &str, vpc_id: Option<&str>, tags: &Labels) -> String {
            let mut objects = self.objects.lock().unwrap();
            let id = format!("{:?}-{}", kind, objects.len()).to_lowercase();
            objects.push(Object {
                kind,
                id: id.clone(),
                name: name.to_string(),
                vpc_id: vpc_id.map(str::to_string),
                tags: tags.clone(),
            });
            *self.creates.lock().unwrap() += 1;
            id
        }
    }

    #[async_trait]
    impl NetworkApi for MemoryNetwork {
        async fn find_key_pair(&self, _name: &str) -> Result<Option<String>> {
            Ok(self.key_material.lock().unwrap().clone())
        }

        async fn import_key_pair(&self, name: &str, public_key: &str, tags: &Labels) -> Result<String> {
            *self.key_material.lock().unwrap() = Some(public_key.to_string());
            Ok(self.create(ResourceKind::KeyPair, name, None, tags))
        }

        async fn find_vpc(&self, lookup: &VpcLookup) -> Result<Option<String>> {
            Ok(match lookup {
                VpcLookup::Name(name) => self.find(ResourceKind::Vpc, name, None),
                VpcLookup::Id(id) => self
                    .objects
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|o| o.kind == ResourceKind::Vpc && &o.id == id)
                    .map(|o| o.id.clone()),
            })
        }

        async fn create_vpc(&self, name: &str, tags: &Labels) -> Result<String> {
            Ok(self.create(ResourceKind::Vpc, name, None, tags))
        }

        async fn find_gateway(&self, name: &str) -> Result<Option<String>> {
            Ok(self.find(ResourceKind::InternetGateway, name, None))
        }

        async fn create_gateway(&self, name: &str, vpc_id: &str, tags: &Labels) -> Result<String> {
            Ok(self.create(ResourceKind::InternetGateway, name, Some(vpc_id), tags))
        }

        async fn find_security_group(&self, vpc_id: &str, name: &str) -> Result<Option<String>> {
            Ok(self.find(ResourceKind::SecurityGroup, name, Some(vpc_id)))
        }

        async fn create_security_group(&self, vpc_id: &str, name: &str, tags: &Labels) -> Result<String> {
            Ok(self.create(ResourceKind::SecurityGroup, name, Some(vpc_id), tags))
        }

        async fn find_subnet(&self, vpc_id: &str, name: &str) -> Result<Option<String>> {
            Ok(self.find(ResourceKind::Subnet, name, Some(vpc_id)))
        }

        async fn create_subnet(&self, vpc_id: &str, name: &str, tags: &Labels) -> Result<String> {
            Ok(self.create(ResourceKind::Subnet, name, Some(vpc_id), tags))
        }

        async fn find_route_table(&self, vpc_id: &str, name: &str) -> Result<Option<String>> {
            Ok(self.find(ResourceKind::RouteTable, name, Some(vpc_id)))
        }

        async fn create_route_table(
            &self,
            vpc_id: &str,
            _gateway_id: &str,
            _subnet_id: &str,
            name: &str,
            tags: &Labels,
        ) -> Result<String> {
            Ok(self.create(ResourceKind::RouteTable, name, Some(vpc_id), tags))
        }
    }

    fn params(vpc_name: Option<&str>) -> InfraParams {
        let mut params = InfraParams::for_destroy("percona", ".");
        params.vpc_name = vpc_name.map(str::to_string);
        params
    }

    #[test]
    fn test_network_names() {
        let names = NetworkNames::for_vpc("percona-vpc");
        assert_eq!(names.subnet, "percona-vpc-sub");
        assert_eq!(names.gateway, "percona-vpc-igw");
        assert_eq!(names.security_group, "percona-vpc-sg");
        assert_eq!(names.route_table, "percona-vpc-rtb");
    }

    #[test]
    fn test_network_layout_defaults_to_resource_id() {
        let id = ResourceId::new("abcdefghij");
        let (lookup, names) = network_layout(&id, &params(None));
        assert_eq!(lookup, VpcLookup::Name("abcdefghij".to_string()));
        assert_eq!(names.subnet, "abcdefghij-sub");

        let mut with_id = params(Some("ignored"));
        with_id.vpc_id = Some("vpc-0123".to_string());
        let (lookup, names) = network_layout(&id, &with_id);
        assert_eq!(lookup, VpcLookup::Id("vpc-0123".to_string()));
        assert_eq!(names.security_group, "vpc-0123-sg");
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let api = MemoryNetwork::default();
        let id = ResourceId::new("abc");

        let first = reconcile_network(&api, &id, &params(Some("percona-vpc"))).await.unwrap();
        assert_eq!(*api.creates.lock().unwrap(), 5);

        let second = reconcile_network(&api, &id, &params(Some("percona-vpc"))).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(*api.creates.lock().unwrap(), 5);
        assert_eq!(api.objects.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_every_created_object_is_tagged() {
        let api = MemoryNetwork::default();
        let id = ResourceId::new("abc");

        reconcile_network(&api, &id, &params(None)).await.unwrap();

        for object in api.objects.lock().unwrap().iter() {
            assert_eq!(
                object.tags.get(RESOURCE_ID_LABEL).map(String::as_str),
                Some("abc"),
                "{:?} {} is untagged",
                object.kind,
                object.name
            );
        }
    }

    #[tokio::test]
    async fn test_explicit_vpc_id_must_exist() {
        let api = MemoryNetwork::default();
        let mut params = params(None);
        params.vpc_id = Some("vpc-missing".to_string());

        let result = reconcile_network(&api, &ResourceId::new("abc"), &params).await;
        assert!(matches!(result, Err(CloudError::ResourceNotFound(_))));
        assert_eq!(*api.creates.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remote_key_without_local_file_is_mismatch() {
        let api = MemoryNetwork::default();
        *api.key_material.lock().unwrap() = Some("ssh-ed25519 AAAAremote".to_string());
        let dir = tempfile::tempdir().unwrap();

        let result = reconcile_key_pair(
            &api,
            &ResourceId::new("abc"),
            "percona",
            &dir.path().join("percona.pem"),
        )
        .await;

        assert!(matches!(result, Err(CloudError::KeyPairMismatch { .. })));
    }
}
