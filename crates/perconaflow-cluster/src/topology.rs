//! Replication topology: per-node server options and the ordered bootstrap
//! of async replication, group replication and Galera clusters.

use crate::error::Result;
use crate::ini::{IniFields, fields};
use crate::node::Node;
use crate::scripts::{self, RESTART_MYSQL};
use crate::sql::{self, SHOW_MASTER_STATUS, START_GROUP_REPLICATION, START_REPLICA};
use futures_util::future::try_join_all;
use perconaflow_cloud::Instance;

pub const GROUP_REPLICATION_PORT: u16 = 33061;
const BINLOG_PATH: &str = "/var/log/mysql/mysql-bin.log";
const RELAY_LOG_PATH: &str = "/var/log/mysql/mysql-relay-bin.log";

/// Credentials and ports shared by every bootstrap
#[derive(Debug, Clone)]
pub struct Bootstrap<'a> {
    pub root_password: &'a str,
    pub replica_password: &'a str,
    pub port: u16,
}

/// Async replication options. `index` is the node's position; 0 is the source.
pub fn async_config(index: usize, instance: &Instance) -> IniFields {
    let mut config = fields([
        ("log_bin", BINLOG_PATH.to_string()),
        ("server_id", (index + 1).to_string()),
        ("relay-log", RELAY_LOG_PATH.to_string()),
        ("gtid-mode", "ON".to_string()),
        ("enforce-gtid-consistency", "ON".to_string()),
    ]);
    if index == 0 {
        config.push((
            "bind-address".to_string(),
            format!("{},localhost", instance.private_ip),
        ));
    }
    config
}

/// Group replication options; seeds and allowlist cover every member
pub fn group_replication_config(
    index: usize,
    instance: &Instance,
    members: &[Instance],
    group_name: &str,
) -> IniFields {
    let seeds = members
        .iter()
        .map(|m| format!("{}:{}", m.private_ip, GROUP_REPLICATION_PORT))
        .collect::<Vec<_>>()
        .join(",");
    let allowlist = members
        .iter()
        .map(|m| m.private_ip.as_str())
        .collect::<Vec<_>>()
        .join(",");

    fields([
        (
            "disabled_storage_engines",
            "MyISAM,BLACKHOLE,FEDERATED,ARCHIVE,MEMORY".to_string(),
        ),
        ("server_id", (index + 1).to_string()),
        ("log_bin", BINLOG_PATH.to_string()),
        ("relay-log", RELAY_LOG_PATH.to_string()),
        ("gtid-mode", "ON".to_string()),
        ("enforce-gtid-consistency", "ON".to_string()),
        ("plugin_load_add", "group_replication.so".to_string()),
        ("group_replication_group_name", group_name.to_string()),
        ("group_replication_start_on_boot", "off".to_string()),
        (
            "group_replication_local_address",
            format!("{}:{}", instance.private_ip, GROUP_REPLICATION_PORT),
        ),
        ("group_replication_group_seeds", seeds),
        ("group_replication_ip_allowlist", allowlist),
        ("group_replication_bootstrap_group", "off".to_string()),
    ])
}

/// Galera options; every node lists every peer before it starts
pub fn galera_config(instance: &Instance, members: &[Instance], port: u16, galera_port: u16) -> IniFields {
    let cluster_address = members
        .iter()
        .map(|m| format!("{}:{}", m.private_ip, galera_port))
        .collect::<Vec<_>>()
        .join(",");

    fields([
        ("port", port.to_string()),
        ("wsrep_cluster_address", format!("gcomm://{}", cluster_address)),
        ("wsrep_node_name", instance.private_ip.clone()),
        (
            "wsrep_node_address",
            format!("{}:{}", instance.private_ip, galera_port),
        ),
        ("wsrep_provider_options", format!("base_port={}", galera_port)),
        ("pxc-encrypt-cluster-traffic", "OFF".to_string()),
    ])
}

/// Node 0 becomes the source; each replica is pointed at node 0's private
/// address with binlog coordinates read immediately before use.
pub async fn bootstrap_async(nodes: &[Node<'_>], params: &Bootstrap<'_>) -> Result<()> {
    let Some(source) = nodes.first() else {
        return Ok(());
    };

    source
        .sql(
            "create replica user",
            params.root_password,
            &sql::create_replica_user(params.replica_password, false),
        )
        .await?;

    for (index, node) in nodes.iter().enumerate() {
        if nodes.len() > 1 {
            node.edit_mysqld(async_config(index, node.instance())).await?;
        }
        node.run("restart mysql", RESTART_MYSQL).await?;

        if index == 0 {
            tracing::info!("Source {} restarted", node.name());
            continue;
        }

        let status = source
            .sql("show master status", params.root_password, SHOW_MASTER_STATUS)
            .await?;
        let binlog = sql::parse_master_status(&status)?;
        tracing::info!(
            "Replica {} follows {} at {}:{}",
            node.name(),
            source.private_ip(),
            binlog.file,
            binlog.position
        );

        let change = sql::change_replication_source(
            source.private_ip(),
            params.port,
            params.replica_password,
            &binlog,
        );
        node.sql("change replication source", params.root_password, &change)
            .await?;
        node.sql("start replica", params.root_password, START_REPLICA)
            .await?;
    }
    Ok(())
}

/// Every member is configured and restarted concurrently. Node 0 then
/// bootstraps the group with `bootstrap_group` ON only around its start,
/// and the others join one at a time.
pub async fn bootstrap_group(
    nodes: &[Node<'_>],
    params: &Bootstrap<'_>,
    group_name: &str,
) -> Result<()> {
    let members: Vec<Instance> = nodes.iter().map(|n| n.instance().clone()).collect();

    try_join_all(nodes.iter().enumerate().map(|(index, node)| {
        let config = group_replication_config(index, node.instance(), &members, group_name);
        async move {
            node.edit_mysqld(config).await?;
            node.run("restart mysql", RESTART_MYSQL).await?;
            node.sql(
                "create replica user",
                params.root_password,
                &sql::create_replica_user(params.replica_password, true),
            )
            .await?;
            node.sql(
                "change group replication source",
                params.root_password,
                &sql::change_group_replication_source(params.replica_password),
            )
            .await
        }
    }))
    .await?;

    let Some((first, rest)) = nodes.split_first() else {
        return Ok(());
    };

    tracing::info!("Bootstrapping group {} on {}", group_name, first.name());
    first
        .sql(
            "set bootstrap_group ON",
            params.root_password,
            &sql::set_bootstrap_group(true),
        )
        .await?;
    let started = first
        .sql("start group replication", params.root_password, START_GROUP_REPLICATION)
        .await;
    // Turned off again even when the start failed
    first
        .sql(
            "set bootstrap_group OFF",
            params.root_password,
            &sql::set_bootstrap_group(false),
        )
        .await?;
    started?;

    for node in rest {
        tracing::info!("{} joining group {}", node.name(), group_name);
        node.sql("start group replication", params.root_password, START_GROUP_REPLICATION)
            .await?;
    }
    Ok(())
}

/// Node 0 starts with the bootstrap unit, the rest join through the gossip
/// list, then node 0 is restarted as a regular member.
pub async fn bootstrap_galera(nodes: &[Node<'_>]) -> Result<()> {
    for (index, node) in nodes.iter().enumerate() {
        let bootstrap = index == 0;
        tracing::info!(
            "Starting {}{}",
            node.name(),
            if bootstrap { " (bootstrap)" } else { "" }
        );
        node.run("start mysql", scripts::start_mysql(bootstrap))
            .await?;
    }

    if let [first, _, ..] = nodes {
        first
            .run("stop bootstrap mysql", scripts::stop_mysql(true))
            .await?;
        first.run("start mysql", scripts::start_mysql(false)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<Instance> {
        vec![
            Instance::new("54.0.0.1", "10.0.1.10"),
            Instance::new("54.0.0.2", "10.0.1.11"),
        ]
    }

    fn value<'a>(config: &'a IniFields, key: &str) -> Option<&'a str> {
        config
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_async_source_binds_private_address() {
        let members = members();
        let source = async_config(0, &members[0]);
        assert_eq!(value(&source, "server_id"), Some("1"));
        assert_eq!(value(&source, "bind-address"), Some("10.0.1.10,localhost"));

        let replica = async_config(1, &members[1]);
        assert_eq!(value(&replica, "server_id"), Some("2"));
        assert_eq!(value(&replica, "bind-address"), None);
    }

    #[test]
    fn test_group_replication_seeds() {
        let members = members();
        let config = group_replication_config(1, &members[1], &members, "uuid-1");
        assert_eq!(
            value(&config, "group_replication_group_seeds"),
            Some("10.0.1.10:33061,10.0.1.11:33061")
        );
        assert_eq!(
            value(&config, "group_replication_ip_allowlist"),
            Some("10.0.1.10,10.0.1.11")
        );
        assert_eq!(
            value(&config, "group_replication_local_address"),
            Some("10.0.1.11:33061")
        );
        assert_eq!(value(&config, "group_replication_bootstrap_group"), Some("off"));
    }

    #[test]
    fn test_galera_cluster_address() {
        let members = members();
        let config = galera_config(&members[0], &members, 3306, 4567);
        assert_eq!(
            value(&config, "wsrep_cluster_address"),
            Some("gcomm://10.0.1.10:4567,10.0.1.11:4567")
        );
        assert_eq!(value(&config, "wsrep_node_address"), Some("10.0.1.10:4567"));
        assert_eq!(value(&config, "wsrep_provider_options"), Some("base_port=4567"));
    }
}
