//! KDL parsing for cluster files

use crate::error::{ConfigError, Result};
use crate::model::{
    ClusterConfig, ClusterParams, CloudKind, InfraParams, Product, ProviderSettings, RdsParams,
    DEFAULT_VOLUME_SIZE,
};
use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};

/// Parse and validate a cluster file
pub fn parse_cluster_file(path: &Path) -> Result<ClusterConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_cluster_str(&content)
}

/// Parse and validate a cluster document
pub fn parse_cluster_str(content: &str) -> Result<ClusterConfig> {
    let doc: KdlDocument = content.parse()?;

    let mut provider = None;
    let mut cluster = None;

    for node in doc.nodes() {
        match node.name().value() {
            "provider" => provider = Some(parse_provider(node)?),
            "cluster" => cluster = Some(node),
            other => {
                tracing::warn!("Ignoring unknown top-level node: {}", other);
            }
        }
    }

    let provider = provider.ok_or(ConfigError::MissingNode("provider"))?;
    let cluster = cluster.ok_or(ConfigError::MissingNode("cluster"))?;
    let config = parse_cluster(cluster, provider)?;
    config.validate()?;
    Ok(config)
}

/// Parse only the `provider` block. Used by destroy, which needs nothing else.
pub fn parse_provider_str(content: &str) -> Result<ProviderSettings> {
    let doc: KdlDocument = content.parse()?;
    let node = doc
        .nodes()
        .iter()
        .find(|n| n.name().value() == "provider")
        .ok_or(ConfigError::MissingNode("provider"))?;
    parse_provider(node)
}

fn parse_provider(node: &KdlNode) -> Result<ProviderSettings> {
    let cloud: CloudKind = first_string(node)
        .ok_or_else(|| ConfigError::InvalidConfig("provider requires a name".to_string()))?
        .parse()?;

    let mut settings = ProviderSettings::new(cloud);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "region" => settings.region = first_string(child).map(str::to_string),
                "zone" => settings.zone = first_string(child).map(str::to_string),
                "project" => settings.project = first_string(child).map(str::to_string),
                "profile" => settings.profile = first_string(child).map(str::to_string),
                "ignore-errors-on-destroy" | "ignore_errors_on_destroy" => {
                    settings.ignore_errors_on_destroy = bool_value(child)?;
                }
                "disable-telemetry" | "disable_telemetry" => {
                    settings.disable_telemetry = bool_value(child)?;
                }
                other => {
                    tracing::warn!("Ignoring unknown provider setting: {}", other);
                }
            }
        }
    }

    Ok(settings)
}

fn parse_cluster(node: &KdlNode, provider: ProviderSettings) -> Result<ClusterConfig> {
    let product: Product = first_string(node)
        .ok_or_else(|| ConfigError::InvalidConfig("cluster requires a product name".to_string()))?
        .parse()?;

    let mut infra = InfraParams {
        key_pair_dir: PathBuf::from("."),
        volume_size: DEFAULT_VOLUME_SIZE,
        ..Default::default()
    };
    let mut cluster = ClusterParams::default();
    let mut rds = RdsParams::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value();
            match key {
                "key-pair-name" => infra.key_pair_name = string_value(child)?,
                "path-to-key-pair-storage" => infra.key_pair_dir = PathBuf::from(string_value(child)?),
                "instance-type" => infra.instance_type = Some(string_value(child)?),
                "volume-type" => infra.volume_type = Some(string_value(child)?),
                "volume-size" => infra.volume_size = integer_value(child)?,
                "volume-iops" => infra.volume_iops = Some(integer_value(child)?),
                "volume-throughput" => infra.volume_throughput = Some(integer_value(child)?),
                "vpc-name" => infra.vpc_name = Some(string_value(child)?),
                "vpc-id" => infra.vpc_id = Some(string_value(child)?),
                "cluster-size" => cluster.size = integer_value(child)?,
                "version" => cluster.version = Some(string_value(child)?),
                "password" => cluster.password = string_value(child)?,
                "replica-password" => cluster.replica_password = string_value(child)?,
                "replication-type" => cluster.replication_type = string_value(child)?.parse()?,
                "myrocks-install" => cluster.myrocks_install = bool_value(child)?,
                "config-file-path" => {
                    cluster.config_file_path = Some(PathBuf::from(string_value(child)?));
                }
                "port" => cluster.port = integer_value(child)?,
                "galera-port" => cluster.galera_port = integer_value(child)?,
                "pmm-address" => cluster.pmm_address = Some(string_value(child)?),
                "pmm-password" => cluster.pmm_password = string_value(child)?,
                "orchestrator-size" => cluster.orchestrator_size = integer_value(child)?,
                "orchestrator-password" => cluster.orchestrator_password = string_value(child)?,
                "rds-id" => rds.rds_id = Some(string_value(child)?),
                "rds-username" => rds.username = Some(string_value(child)?),
                "rds-password" => rds.password = Some(string_value(child)?),
                "rds-pmm-user-password" => rds.pmm_user_password = string_value(child)?,
                other => {
                    tracing::warn!("Ignoring unknown cluster setting: {}", other);
                }
            }
        }
    }

    Ok(ClusterConfig {
        provider,
        product,
        infra,
        cluster,
        rds,
    })
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}

fn string_value(node: &KdlNode) -> Result<String> {
    first_string(node)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::invalid_value(node.name().value(), "expected a string"))
}

fn bool_value(node: &KdlNode) -> Result<bool> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_bool())
        .ok_or_else(|| ConfigError::invalid_value(node.name().value(), "expected #true or #false"))
}

fn integer_value<T: TryFrom<i128>>(node: &KdlNode) -> Result<T> {
    let raw = node
        .entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::invalid_value(node.name().value(), "expected an integer"))?;
    T::try_from(raw)
        .map_err(|_| ConfigError::invalid_value(node.name().value(), format!("{} is out of range", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReplicationType;

    const PS_CLUSTER: &str = r#"
provider "aws" {
    region "us-east-1"
    ignore-errors-on-destroy #true
}

cluster "ps" {
    key-pair-name "percona"
    path-to-key-pair-storage "/tmp/keys"
    instance-type "t3.micro"
    volume-size 40
    volume-iops 3000
    vpc-name "percona-vpc"
    cluster-size 3
    version "8.0"
    replication-type "group-replication"
    orchestrator-size 3
    myrocks-install #true
}
"#;

    #[test]
    fn test_parse_ps_cluster() {
        let config = parse_cluster_str(PS_CLUSTER).unwrap();

        assert_eq!(config.provider.cloud, CloudKind::Aws);
        assert_eq!(config.provider.region.as_deref(), Some("us-east-1"));
        assert!(config.provider.ignore_errors_on_destroy);
        assert!(!config.provider.disable_telemetry);

        assert_eq!(config.product, Product::PerconaServer);
        assert_eq!(config.infra.key_pair_name, "percona");
        assert_eq!(config.infra.private_key_path(), PathBuf::from("/tmp/keys/percona.pem"));
        assert_eq!(config.infra.volume_size, 40);
        assert_eq!(config.infra.volume_iops, Some(3000));
        assert_eq!(config.infra.vpc_name.as_deref(), Some("percona-vpc"));

        assert_eq!(config.cluster.size, 3);
        assert_eq!(config.cluster.version.as_deref(), Some("8.0"));
        assert_eq!(config.cluster.replication_type, ReplicationType::GroupReplication);
        assert_eq!(config.cluster.orchestrator_size, 3);
        assert!(config.cluster.myrocks_install);
    }

    #[test]
    fn test_defaults() {
        let config = parse_cluster_str(
            r#"
provider "aws"
cluster "pxc" {
    key-pair-name "percona"
    instance-type "t3.micro"
}
"#,
        )
        .unwrap();

        assert_eq!(config.product, Product::XtraDbCluster);
        assert_eq!(config.infra.key_pair_dir, PathBuf::from("."));
        assert_eq!(config.infra.volume_size, 20);
        assert_eq!(config.cluster.size, 3);
        assert_eq!(config.cluster.port, 3306);
        assert_eq!(config.cluster.galera_port, 4567);
        assert_eq!(config.cluster.password, "password");
        assert_eq!(config.cluster.replica_password, "replicaPassword");
        assert_eq!(config.cluster.replication_type, ReplicationType::Async);
    }

    #[test]
    fn test_invalid_version_rejected() {
        let result = parse_cluster_str(
            r#"
provider "aws"
cluster "ps" {
    key-pair-name "percona"
    instance-type "t3.micro"
    version "eight"
}
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "version"
        ));
    }

    #[test]
    fn test_missing_cluster_node() {
        let result = parse_cluster_str(r#"provider "aws""#);
        assert!(matches!(result, Err(ConfigError::MissingNode("cluster"))));
    }

    #[test]
    fn test_unknown_provider() {
        let result = parse_provider_str(r#"provider "azure""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_value_type() {
        let result = parse_cluster_str(
            r#"
provider "aws"
cluster "ps" {
    key-pair-name "percona"
    instance-type "t3.micro"
    cluster-size "three"
}
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "cluster-size"
        ));
    }

    #[test]
    fn test_pmm_rds_requires_credentials() {
        let result = parse_cluster_str(
            r#"
provider "aws" { region "us-east-1"; }
cluster "pmm-rds" {
    pmm-address "http://10.0.0.1"
    rds-id "database-1"
}
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_pmm_rds_user_password() {
        let source = |extra: &str| {
            format!(
                r#"
provider "aws" {{ region "us-east-1"; }}
cluster "pmm-rds" {{
    pmm-address "http://10.0.0.1"
    rds-id "database-1"
    rds-username "admin"
    rds-password "secret"
    {}
}}
"#,
                extra
            )
        };

        let config = parse_cluster_str(&source("")).unwrap();
        assert_eq!(config.rds.pmm_user_password, "password");
        assert_eq!(config.rds.credentials(), Some(("admin", "secret")));

        let config = parse_cluster_str(&source(r#"rds-pmm-user-password "monitor""#)).unwrap();
        assert_eq!(config.rds.pmm_user_password, "monitor");
    }

    #[test]
    fn test_parse_gcp_provider() {
        let settings = parse_provider_str(
            r#"
provider "gcp" {
    region "us-central1"
    zone "us-central1-a"
    project "percona-dev"
    disable-telemetry #true
}
"#,
        )
        .unwrap();

        assert_eq!(settings.cloud, CloudKind::Gcp);
        assert_eq!(settings.zone.as_deref(), Some("us-central1-a"));
        assert_eq!(settings.project.as_deref(), Some("percona-dev"));
        assert!(settings.disable_telemetry);
    }
}
