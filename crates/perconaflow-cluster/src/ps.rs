//! Percona Server clusters: async or group replication, with optional
//! MyRocks, PMM agents and an orchestrator tier.

use crate::deploy::Deployment;
use crate::error::{ClusterError, Result};
use crate::ini::fields;
use crate::node::Node;
use crate::orchestrator;
use crate::outputs::{NodeOutput, OrchestratorOutput};
use crate::pmm;
use crate::scripts::{self, Distribution, RESTART_MYSQL};
use crate::sql;
use crate::topology::{self, Bootstrap};
use crate::version::resolve_version;
use futures_util::future::try_join_all;
use perconaflow_cloud::{Instance, ROLE_MYSQL, ROLE_ORCHESTRATOR};
use perconaflow_config::ReplicationType;
use serde::Serialize;

/// Instances of a Percona Server cluster
#[derive(Debug, Clone, Serialize)]
pub struct PerconaServerOutputs {
    pub instances: Vec<NodeOutput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orchestrator_instances: Vec<OrchestratorOutput>,
}

/// Provision both tiers concurrently, then wire orchestrator discovery
pub async fn create(deploy: &Deployment<'_>) -> Result<PerconaServerOutputs> {
    let params = deploy.params;

    let database_tier = async {
        let instances = deploy.launch(params.size, ROLE_MYSQL).await?;
        setup_database_tier(deploy, &instances).await?;
        Ok::<_, ClusterError>(instances)
    };
    let orchestrator_tier = async {
        if params.orchestrator_size == 0 {
            return Ok(Vec::new());
        }
        let instances = deploy
            .launch(params.orchestrator_size, ROLE_ORCHESTRATOR)
            .await?;
        orchestrator::setup_tier(deploy, &instances).await?;
        Ok::<_, ClusterError>(instances)
    };
    let (databases, tier) = tokio::try_join!(database_tier, orchestrator_tier)?;

    if !tier.is_empty() {
        orchestrator::register(deploy, &tier, &databases).await?;
    }

    let group_replication = params.replication_type == ReplicationType::GroupReplication;
    Ok(PerconaServerOutputs {
        instances: databases
            .iter()
            .enumerate()
            .map(|(i, instance)| NodeOutput::new(instance, !group_replication && i > 0))
            .collect(),
        orchestrator_instances: tier.iter().map(OrchestratorOutput::new).collect(),
    })
}

/// Install every node concurrently, bootstrap replication in order, then
/// register the PMM agents.
async fn setup_database_tier(deploy: &Deployment<'_>, instances: &[Instance]) -> Result<()> {
    let params = deploy.params;
    let nodes = deploy.nodes(instances);

    tracing::info!("Installing Percona Server on {} node(s)", nodes.len());
    try_join_all(nodes.iter().map(|node| install_node(deploy, node))).await?;

    let bootstrap = Bootstrap {
        root_password: &params.password,
        replica_password: &params.replica_password,
        port: params.port,
    };
    match params.replication_type {
        ReplicationType::Async => topology::bootstrap_async(&nodes, &bootstrap).await?,
        ReplicationType::GroupReplication => {
            let group_name = uuid::Uuid::new_v4().to_string();
            topology::bootstrap_group(&nodes, &bootstrap, &group_name).await?
        }
    }
    tracing::info!("Replication bootstrapped ({})", params.replication_type.as_str());

    if deploy.pmm_url.is_some() {
        try_join_all(
            nodes
                .iter()
                .map(|node| pmm::register_agent(node, &params.pmm_password, params.port)),
        )
        .await?;
    }
    Ok(())
}

async fn install_node(deploy: &Deployment<'_>, node: &Node<'_>) -> Result<()> {
    let params = deploy.params;
    let password = params.password.as_str();

    node.run("init", &scripts::init()).await?;
    node.run(
        "configure repository",
        &scripts::configure_repository(Distribution::PerconaServer, password),
    )
    .await?;

    let version = resolve_version(node, Distribution::PerconaServer, params.version.as_deref()).await?;
    tracing::info!("Installing Percona Server {} on {}", version, node.name());
    node.run(
        "install percona server",
        &scripts::install_percona_server(&version),
    )
    .await?;

    node.sql("rename root", password, &sql::rename_root()).await?;
    node.edit_mysqld(fields([("port", params.port)])).await?;
    node.run("restart mysql", RESTART_MYSQL).await?;

    for udf in sql::udf_functions() {
        node.sql("create udf", password, &udf).await?;
    }

    if let Some(path) = &params.config_file_path {
        node.upload_custom_config(path).await?;
    }

    if params.myrocks_install {
        tracing::info!("Installing MyRocks on {}", node.name());
        node.run("install myrocks", &scripts::install_myrocks(&version, password))
            .await?;
        node.edit_mysqld(fields([("default-storage-engine", "rocksdb")]))
            .await?;
    }

    if let Some(url) = &deploy.pmm_url {
        pmm::install_agent(node, url, password, &params.pmm_password).await?;
    }

    if params.orchestrator_size > 0 {
        orchestrator::prepare_database_node(
            node,
            password,
            &params.orchestrator_password,
            params.replication_type == ReplicationType::GroupReplication,
        )
        .await?;
    }

    tracing::info!("{} installed", node.name());
    Ok(())
}
