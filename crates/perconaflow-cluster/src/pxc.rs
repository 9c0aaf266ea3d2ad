//! Percona XtraDB Cluster (Galera)

use crate::deploy::Deployment;
use crate::error::Result;
use crate::node::Node;
use crate::outputs::NodeOutput;
use crate::scripts::{self, Distribution};
use crate::sql;
use crate::topology::{self, galera_config};
use crate::version::resolve_version;
use futures_util::future::try_join_all;
use perconaflow_cloud::{Instance, ROLE_MYSQL};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct XtraDbClusterOutputs {
    pub instances: Vec<NodeOutput>,
}

/// Install every node with the full peer list, then start them in order
pub async fn create(deploy: &Deployment<'_>) -> Result<XtraDbClusterOutputs> {
    let instances = deploy.launch(deploy.params.size, ROLE_MYSQL).await?;
    let nodes = deploy.nodes(&instances);

    tracing::info!("Configuring {} XtraDB Cluster node(s)", nodes.len());
    try_join_all(nodes.iter().map(|node| install_node(deploy, node, &instances))).await?;

    tracing::info!("Starting XtraDB Cluster");
    topology::bootstrap_galera(&nodes).await?;

    if let Some(first) = nodes.first() {
        first
            .sql("rename root", &deploy.params.password, &sql::rename_root())
            .await?;
    }

    Ok(XtraDbClusterOutputs {
        instances: instances
            .iter()
            .map(|instance| NodeOutput::new(instance, false))
            .collect(),
    })
}

async fn install_node(deploy: &Deployment<'_>, node: &Node<'_>, members: &[Instance]) -> Result<()> {
    let params = deploy.params;

    node.run("init", &scripts::init()).await?;
    node.run(
        "configure repository",
        &scripts::configure_repository(Distribution::XtraDbCluster, &params.password),
    )
    .await?;

    let version = resolve_version(node, Distribution::XtraDbCluster, params.version.as_deref()).await?;
    tracing::info!("Installing XtraDB Cluster {} on {}", version, node.name());
    node.run(
        "install xtradb cluster",
        &scripts::install_xtradb_cluster(&version),
    )
    .await?;
    // Installation leaves a standalone server running
    node.run("stop mysql", scripts::stop_mysql(false)).await?;

    node.edit_mysqld(galera_config(
        node.instance(),
        members,
        params.port,
        params.galera_port,
    ))
    .await?;

    if let Some(path) = &params.config_file_path {
        node.upload_custom_config(path).await?;
    }
    Ok(())
}
