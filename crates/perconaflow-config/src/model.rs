//! Typed cluster configuration
//!
//! Built once from the KDL document and handed to the rest of the workspace.
//! Nothing downstream looks options up by name.

use crate::error::{ConfigError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_VOLUME_SIZE: u32 = 20;
pub const DEFAULT_CLUSTER_SIZE: usize = 3;
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_GALERA_PORT: u16 = 4567;
pub const DEFAULT_PASSWORD: &str = "password";
pub const DEFAULT_REPLICA_PASSWORD: &str = "replicaPassword";
pub const MIN_ORCHESTRATOR_SIZE: usize = 3;

/// Target cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudKind {
    Aws,
    Gcp,
}

impl CloudKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudKind::Aws => "aws",
            CloudKind::Gcp => "gcp",
        }
    }
}

impl FromStr for CloudKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aws" => Ok(CloudKind::Aws),
            "gcp" => Ok(CloudKind::Gcp),
            other => Err(ConfigError::invalid_value(
                "provider",
                format!("unsupported cloud `{}` (expected aws or gcp)", other),
            )),
        }
    }
}

impl fmt::Display for CloudKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product to provision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    /// Percona Server with async or group replication
    PerconaServer,
    /// Percona XtraDB Cluster (Galera)
    XtraDbCluster,
    /// PMM monitoring server
    Monitoring,
    /// An existing RDS instance registered on an existing PMM server
    MonitoringRds,
}

impl Product {
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::PerconaServer => "ps",
            Product::XtraDbCluster => "pxc",
            Product::Monitoring => "pmm",
            Product::MonitoringRds => "pmm-rds",
        }
    }

    /// Whether the product launches instances of its own
    pub fn needs_infrastructure(&self) -> bool {
        !matches!(self, Product::MonitoringRds)
    }
}

impl FromStr for Product {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ps" => Ok(Product::PerconaServer),
            "pxc" => Ok(Product::XtraDbCluster),
            "pmm" => Ok(Product::Monitoring),
            "pmm-rds" | "pmm_rds" => Ok(Product::MonitoringRds),
            other => Err(ConfigError::invalid_value(
                "cluster",
                format!("unsupported product `{}` (expected ps, pxc, pmm or pmm-rds)", other),
            )),
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replication mode for Percona Server clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicationType {
    #[default]
    Async,
    GroupReplication,
}

impl ReplicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationType::Async => "async",
            ReplicationType::GroupReplication => "group-replication",
        }
    }
}

impl FromStr for ReplicationType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "async" => Ok(ReplicationType::Async),
            "group-replication" | "group_replication" | "gr" => {
                Ok(ReplicationType::GroupReplication)
            }
            other => Err(ConfigError::invalid_value(
                "replication-type",
                format!("unknown replication type `{}`", other),
            )),
        }
    }
}

/// `provider` block
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub cloud: CloudKind,
    pub region: Option<String>,
    pub zone: Option<String>,
    /// GCP project
    pub project: Option<String>,
    /// AWS named profile
    pub profile: Option<String>,
    pub ignore_errors_on_destroy: bool,
    pub disable_telemetry: bool,
}

impl ProviderSettings {
    pub fn new(cloud: CloudKind) -> Self {
        Self {
            cloud,
            region: None,
            zone: None,
            project: None,
            profile: None,
            ignore_errors_on_destroy: false,
            disable_telemetry: false,
        }
    }
}

/// Parameters consumed by the cloud adapters
#[derive(Debug, Clone, Default)]
pub struct InfraParams {
    pub key_pair_name: String,
    pub key_pair_dir: PathBuf,
    pub instance_type: Option<String>,
    pub volume_type: Option<String>,
    pub volume_size: u32,
    pub volume_iops: Option<u32>,
    pub volume_throughput: Option<u32>,
    pub vpc_name: Option<String>,
    pub vpc_id: Option<String>,
}

impl InfraParams {
    /// Minimal parameter set for delete-only flows
    pub fn for_destroy(key_pair_name: impl Into<String>, key_pair_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_pair_name: key_pair_name.into(),
            key_pair_dir: key_pair_dir.into(),
            volume_size: DEFAULT_VOLUME_SIZE,
            ..Default::default()
        }
    }

    /// `{key_pair_dir}/{key_pair_name}.pem`
    pub fn private_key_path(&self) -> PathBuf {
        self.key_pair_dir.join(format!("{}.pem", self.key_pair_name))
    }
}

/// Database tier parameters
#[derive(Debug, Clone)]
pub struct ClusterParams {
    pub size: usize,
    pub version: Option<String>,
    pub password: String,
    pub replica_password: String,
    pub replication_type: ReplicationType,
    pub myrocks_install: bool,
    pub config_file_path: Option<PathBuf>,
    pub port: u16,
    pub galera_port: u16,
    pub pmm_address: Option<String>,
    pub pmm_password: String,
    pub orchestrator_size: usize,
    pub orchestrator_password: String,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            size: DEFAULT_CLUSTER_SIZE,
            version: None,
            password: DEFAULT_PASSWORD.to_string(),
            replica_password: DEFAULT_REPLICA_PASSWORD.to_string(),
            replication_type: ReplicationType::Async,
            myrocks_install: false,
            config_file_path: None,
            port: DEFAULT_MYSQL_PORT,
            galera_port: DEFAULT_GALERA_PORT,
            pmm_address: None,
            pmm_password: DEFAULT_PASSWORD.to_string(),
            orchestrator_size: 0,
            orchestrator_password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

/// RDS monitoring parameters
#[derive(Debug, Clone)]
pub struct RdsParams {
    pub rds_id: Option<String>,
    /// Master credentials, used only to create the `pmm` user
    pub username: Option<String>,
    pub password: Option<String>,
    /// Password of the `pmm` user PMM monitors with
    pub pmm_user_password: String,
}

impl Default for RdsParams {
    fn default() -> Self {
        Self {
            rds_id: None,
            username: None,
            password: None,
            pmm_user_password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl RdsParams {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }
}

/// Whole cluster file
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub provider: ProviderSettings,
    pub product: Product,
    pub infra: InfraParams,
    pub cluster: ClusterParams,
    pub rds: RdsParams,
}

impl ClusterConfig {
    /// Checks cross-field rules. Called by the parser after every field is set.
    pub fn validate(&self) -> Result<()> {
        if self.infra.key_pair_name.trim().is_empty() && self.product.needs_infrastructure() {
            return Err(ConfigError::invalid_value("key-pair-name", "must not be empty"));
        }

        if self.product.needs_infrastructure()
            && self.infra.instance_type.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::invalid_value("instance-type", "must not be empty"));
        }

        if self.provider.cloud == CloudKind::Gcp {
            if self.provider.project.is_none() {
                return Err(ConfigError::invalid_value("project", "required for gcp"));
            }
            if self.provider.zone.is_none() {
                return Err(ConfigError::invalid_value("zone", "required for gcp"));
            }
        }

        if let Some(version) = &self.cluster.version {
            if !is_valid_version(version) {
                return Err(ConfigError::invalid_value(
                    "version",
                    format!(
                        "invalid version `{}`, use semantic versioning (MAJOR.MINOR.PATCH)",
                        version
                    ),
                ));
            }
        }

        if matches!(self.product, Product::PerconaServer | Product::XtraDbCluster)
            && self.cluster.size == 0
        {
            return Err(ConfigError::invalid_value("cluster-size", "must be at least 1"));
        }

        let orchestrators = self.cluster.orchestrator_size;
        if orchestrators > 0 && orchestrators < MIN_ORCHESTRATOR_SIZE {
            return Err(ConfigError::invalid_value(
                "orchestrator-size",
                format!("should be {} or more", MIN_ORCHESTRATOR_SIZE),
            ));
        }
        if orchestrators > 0 && self.product != Product::PerconaServer {
            return Err(ConfigError::InvalidConfig(
                "orchestrator tier is only available for ps clusters".to_string(),
            ));
        }

        if self.product == Product::MonitoringRds {
            if self.provider.cloud != CloudKind::Aws {
                return Err(ConfigError::InvalidConfig(
                    "pmm-rds requires the aws provider".to_string(),
                ));
            }
            if self.cluster.pmm_address.is_none() {
                return Err(ConfigError::invalid_value("pmm-address", "required for pmm-rds"));
            }
            if self.rds.rds_id.is_none() {
                return Err(ConfigError::invalid_value("rds-id", "required for pmm-rds"));
            }
            if self.rds.credentials().is_none() {
                return Err(ConfigError::invalid_value(
                    "rds-username",
                    "rds-username and rds-password are required for pmm-rds",
                ));
            }
        }

        Ok(())
    }

    /// Declared values that are safe to report. Passwords, addresses that may
    /// embed credentials and RDS credentials are never included.
    pub fn telemetry_values(&self) -> Vec<(&'static str, String)> {
        let mut values = vec![
            ("cloud", self.provider.cloud.to_string()),
            ("cluster", self.product.to_string()),
        ];
        if let Some(region) = &self.provider.region {
            values.push(("region", region.clone()));
        }
        if let Some(instance_type) = &self.infra.instance_type {
            values.push(("instance_type", instance_type.clone()));
        }
        if let Some(volume_type) = &self.infra.volume_type {
            values.push(("volume_type", volume_type.clone()));
        }
        values.push(("volume_size", self.infra.volume_size.to_string()));
        if let Some(iops) = self.infra.volume_iops {
            values.push(("volume_iops", iops.to_string()));
        }
        if self.product != Product::Monitoring && self.product != Product::MonitoringRds {
            values.push(("cluster_size", self.cluster.size.to_string()));
            values.push(("port", self.cluster.port.to_string()));
            if let Some(version) = &self.cluster.version {
                values.push(("version", version.clone()));
            }
        }
        if self.product == Product::PerconaServer {
            values.push((
                "replication_type",
                self.cluster.replication_type.as_str().to_string(),
            ));
            values.push(("myrocks_install", self.cluster.myrocks_install.to_string()));
            values.push((
                "orchestrator_size",
                self.cluster.orchestrator_size.to_string(),
            ));
        }
        if self.product == Product::XtraDbCluster {
            values.push(("galera_port", self.cluster.galera_port.to_string()));
        }
        values
    }
}

/// `MAJOR[.MINOR[.PATCH]][-BUILD]`
pub fn is_valid_version(version: &str) -> bool {
    let (numbers, build) = match version.split_once('-') {
        Some((numbers, build)) => (numbers, Some(build)),
        None => (version, None),
    };
    if build.is_some_and(str::is_empty) {
        return false;
    }
    let parts: Vec<&str> = numbers.split('.').collect();
    (1..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}
