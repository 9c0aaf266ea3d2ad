//! Orchestrator tier: a raft group of orchestrator servers that discovers
//! and manages the database topology.

use crate::deploy::Deployment;
use crate::error::{ClusterError, Result};
use crate::ini::client_credentials;
use crate::node::Node;
use crate::scripts::{self, RESTART_ORCHESTRATOR, START_ORCHESTRATOR};
use crate::sql::{self, USER_ORCHESTRATOR};
use futures_util::future::try_join_all;
use perconaflow_cloud::{CloudError, Instance, PollConfig, poll_until};
use serde::Serialize;
use std::time::Duration;

pub const ORCHESTRATOR_PORT: u16 = 3000;
pub const URL_PREFIX: &str = "/orchestrator";
pub const CONFIG_PATH: &str = "/etc/orchestrator.conf.json";
pub const CREDENTIALS_PATH: &str = "/etc/mysql/orchestrator-topology.cnf";
const RAFT_PORT: u16 = 10008;
const DATA_DIR: &str = "/var/lib/orchestrator";

/// `/etc/orchestrator.conf.json`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrchestratorConfig {
    pub debug: bool,
    pub listen_address: String,
    pub raft_enabled: bool,
    pub raft_nodes: Vec<String>,
    pub raft_data_dir: String,
    pub raft_bind: String,
    pub default_raft_port: u16,
    #[serde(rename = "URLPrefix")]
    pub url_prefix: String,
    #[serde(rename = "MySQLTopologyCredentialsConfigFile")]
    pub mysql_topology_credentials_config_file: String,
    pub instance_poll_seconds: u32,
    pub discover_by_show_slave_hosts: bool,
    #[serde(rename = "BackendDB")]
    pub backend_db: String,
    #[serde(rename = "SQLite3DataFile")]
    pub sqlite3_data_file: String,
    pub hostname_resolve_method: String,
    #[serde(rename = "MySQLHostnameResolveMethod")]
    pub mysql_hostname_resolve_method: String,
    pub instance_flush_interval_milliseconds: u32,
}

impl OrchestratorConfig {
    /// Config of `member`; every member of the tier is a raft peer
    pub fn for_member(member: &Instance, members: &[Instance]) -> Self {
        Self {
            debug: true,
            listen_address: format!(":{}", ORCHESTRATOR_PORT),
            raft_enabled: true,
            raft_nodes: members.iter().map(|m| m.private_ip.clone()).collect(),
            raft_data_dir: DATA_DIR.to_string(),
            raft_bind: member.private_ip.clone(),
            default_raft_port: RAFT_PORT,
            url_prefix: URL_PREFIX.to_string(),
            mysql_topology_credentials_config_file: CREDENTIALS_PATH.to_string(),
            instance_poll_seconds: 5,
            discover_by_show_slave_hosts: false,
            backend_db: "sqlite".to_string(),
            sqlite3_data_file: format!("{}/orchestrator.db", DATA_DIR),
            hostname_resolve_method: "none".to_string(),
            mysql_hostname_resolve_method: "@@hostname".to_string(),
            instance_flush_interval_milliseconds: 100,
        }
    }
}

/// Web UI address published to the caller
pub fn public_url(instance: &Instance) -> String {
    format!(
        "http://{}:{}{}",
        instance.public_ip, ORCHESTRATOR_PORT, URL_PREFIX
    )
}

/// API address as seen from inside the network
pub fn api_url(instance: &Instance) -> String {
    format!(
        "http://{}:{}{}/api",
        instance.private_ip, ORCHESTRATOR_PORT, URL_PREFIX
    )
}

async fn setup_member(node: &Node<'_>, members: &[Instance], password: &str) -> Result<()> {
    tracing::info!("Installing orchestrator on {}", node.name());
    node.run("init", &scripts::init()).await?;
    node.run("install orchestrator", &scripts::install_orchestrator())
        .await?;

    let config = OrchestratorConfig::for_member(node.instance(), members);
    node.send_file(&serde_json::to_vec_pretty(&config)?, CONFIG_PATH)
        .await?;
    node.send_file(
        client_credentials(USER_ORCHESTRATOR, password).as_bytes(),
        CREDENTIALS_PATH,
    )
    .await?;

    node.run("start orchestrator", START_ORCHESTRATOR).await?;
    Ok(())
}

/// Install and start every member of the tier concurrently
pub async fn setup_tier(deploy: &Deployment<'_>, instances: &[Instance]) -> Result<()> {
    let password = &deploy.params.orchestrator_password;
    try_join_all(
        deploy
            .nodes(instances)
            .iter()
            .map(|node| setup_member(node, instances, password)),
    )
    .await?;
    tracing::info!("Orchestrator tier of {} node(s) started", instances.len());
    Ok(())
}

/// Topology user plus `orchestrator-client` on a database node
pub async fn prepare_database_node(
    node: &Node<'_>,
    root_password: &str,
    orchestrator_password: &str,
    group_replication: bool,
) -> Result<()> {
    node.sql(
        "create orchestrator user",
        root_password,
        &sql::create_orchestrator_user(orchestrator_password, group_replication),
    )
    .await?;
    node.run(
        "install orchestrator client",
        &scripts::install_orchestrator_client(),
    )
    .await?;
    Ok(())
}

/// Poll `<url>/api/health` until it answers 2xx
pub async fn wait_for_api(instance: &Instance, poll: &PollConfig) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let url = format!("{}/api/health", public_url(instance));
    let (client, url) = (&client, &url);
    poll_until(poll, &format!("orchestrator API on {}", instance.public_ip), move || async move {
        match client.get(url).send().await {
            Ok(response) => Ok(response.status().is_success().then_some(())),
            Err(e) => {
                tracing::debug!("{} not reachable yet: {}", url, e);
                Ok::<_, CloudError>(None)
            }
        }
    })
    .await
    .map_err(ClusterError::from)
}

/// Restart the tier, then ask every database node to register itself.
/// Only restart failures are fatal; discovery is best effort.
pub async fn register(
    deploy: &Deployment<'_>,
    tier: &[Instance],
    databases: &[Instance],
) -> Result<()> {
    let tier_nodes = deploy.nodes(tier);
    for node in &tier_nodes {
        node.run("restart orchestrator", RESTART_ORCHESTRATOR).await?;
    }
    for instance in tier {
        if let Err(e) = wait_for_api(instance, &deploy.api_poll).await {
            tracing::warn!("Orchestrator API on {} not ready: {}", instance.public_ip, e);
        }
    }

    let api_urls: Vec<String> = tier.iter().map(api_url).collect();
    for node in deploy.nodes(databases) {
        let command = scripts::orchestrator_discover(&api_urls, node.private_ip(), deploy.params.port);
        match node.run("orchestrator discover", &command).await {
            Ok(_) => tracing::info!("{} registered with orchestrator", node.name()),
            Err(e) => tracing::warn!("Orchestrator discovery of {} failed: {}", node.name(), e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<Instance> {
        (1..=3)
            .map(|i| Instance::new(format!("54.0.0.{}", i), format!("10.0.1.{}", i)))
            .collect()
    }

    #[test]
    fn test_config_keys() {
        let members = members();
        let config = OrchestratorConfig::for_member(&members[1], &members);
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["ListenAddress"], ":3000");
        assert_eq!(json["RaftBind"], "10.0.1.2");
        assert_eq!(
            json["RaftNodes"],
            serde_json::json!(["10.0.1.1", "10.0.1.2", "10.0.1.3"])
        );
        assert_eq!(json["URLPrefix"], "/orchestrator");
        assert_eq!(json["BackendDB"], "sqlite");
        assert_eq!(json["SQLite3DataFile"], "/var/lib/orchestrator/orchestrator.db");
        assert_eq!(json["MySQLHostnameResolveMethod"], "@@hostname");
        assert_eq!(json["DefaultRaftPort"], 10008);
    }

    #[test]
    fn test_urls() {
        let instance = Instance::new("54.0.0.1", "10.0.1.1");
        assert_eq!(public_url(&instance), "http://54.0.0.1:3000/orchestrator");
        assert_eq!(api_url(&instance), "http://10.0.1.1:3000/orchestrator/api");
    }
}
