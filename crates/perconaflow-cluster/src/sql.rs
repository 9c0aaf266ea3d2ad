//! SQL statements and the `mysql` client invocation that runs them
//!
//! Statements execute on the node itself through the remote channel, so the
//! server never needs to accept root logins from outside.

use crate::error::{ClusterError, Result};
use perconaflow_remote::shell_quote;

pub const USER_ROOT: &str = "root";
pub const USER_REPLICA: &str = "replica_user";
pub const USER_PMM: &str = "pmm";
pub const USER_ORCHESTRATOR: &str = "orchestrator";

pub const SHOW_MASTER_STATUS: &str = "SHOW MASTER STATUS";
pub const START_REPLICA: &str = "START REPLICA";
pub const START_GROUP_REPLICATION: &str = "START GROUP_REPLICATION";

/// Binlog coordinates of the source, captured right before a replica uses them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogPosition {
    pub file: String,
    pub position: u64,
}

/// Single-quoted SQL string literal
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// `mysql` invocation running `sql` as root, batch mode without headers
pub fn mysql_command(root_password: &str, sql: &str) -> String {
    format!(
        "mysql -u{} -p{} -N -B -e {}",
        USER_ROOT,
        shell_quote(root_password),
        shell_quote(sql)
    )
}

/// Parse `SHOW MASTER STATUS` batch output (`File\tPosition\t...`)
pub fn parse_master_status(output: &str) -> Result<BinlogPosition> {
    let unexpected = || ClusterError::UnexpectedOutput {
        command: SHOW_MASTER_STATUS.to_string(),
        output: output.to_string(),
    };
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("mysql:"))
        .ok_or_else(unexpected)?;
    let mut columns = line.split('\t');
    let file = columns.next().filter(|f| !f.is_empty()).ok_or_else(unexpected)?;
    let position = columns
        .next()
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(unexpected)?;
    Ok(BinlogPosition {
        file: file.to_string(),
        position,
    })
}

pub fn udf_functions() -> Vec<String> {
    [
        ("fnv1a_64", "libfnv1a_udf.so"),
        ("fnv_64", "libfnv_udf.so"),
        ("murmur_hash", "libmurmur_udf.so"),
    ]
    .iter()
    .map(|(name, lib)| format!("CREATE FUNCTION {} RETURNS INTEGER SONAME {}", name, quote(lib)))
    .collect()
}

pub fn rename_root() -> String {
    "RENAME USER 'root'@'localhost' TO 'root'@'%'; FLUSH PRIVILEGES".to_string()
}

fn create_user(user: &str, host: &str, password: &str) -> String {
    format!(
        "CREATE USER IF NOT EXISTS {}@{} IDENTIFIED WITH mysql_native_password BY {}",
        quote(user),
        quote(host),
        quote(password)
    )
}

fn grant(privileges: &str, on: &str, user: &str, host: &str) -> String {
    format!("GRANT {} ON {} TO {}@{}", privileges, on, quote(user), quote(host))
}

/// Replication user. Group replication creates it outside the binlog on every
/// member and adds the recovery privileges.
pub fn create_replica_user(password: &str, group_replication: bool) -> String {
    let mut statements = Vec::new();
    if group_replication {
        statements.push("SET SQL_LOG_BIN=0".to_string());
    }
    statements.push(create_user(USER_REPLICA, "%", password));
    statements.push(grant("REPLICATION SLAVE", "*.*", USER_REPLICA, "%"));
    if group_replication {
        for privilege in ["CONNECTION_ADMIN", "BACKUP_ADMIN", "GROUP_REPLICATION_STREAM"] {
            statements.push(grant(privilege, "*.*", USER_REPLICA, "%"));
        }
        statements.push("SET SQL_LOG_BIN=1".to_string());
    }
    statements.join("; ")
}

pub fn change_replication_source(
    host: &str,
    port: u16,
    password: &str,
    binlog: &BinlogPosition,
) -> String {
    format!(
        "CHANGE REPLICATION SOURCE TO SOURCE_HOST={}, SOURCE_PORT={}, SOURCE_USER={}, \
         SOURCE_PASSWORD={}, SOURCE_LOG_FILE={}, SOURCE_LOG_POS={}",
        quote(host),
        port,
        quote(USER_REPLICA),
        quote(password),
        quote(&binlog.file),
        binlog.position
    )
}

pub fn change_group_replication_source(password: &str) -> String {
    format!(
        "CHANGE REPLICATION SOURCE TO SOURCE_USER={}, SOURCE_PASSWORD={} \
         FOR CHANNEL 'group_replication_recovery'",
        quote(USER_REPLICA),
        quote(password)
    )
}

pub fn set_bootstrap_group(on: bool) -> String {
    format!(
        "SET GLOBAL group_replication_bootstrap_group={}",
        if on { "ON" } else { "OFF" }
    )
}

pub fn create_pmm_user(password: &str) -> String {
    [
        create_user(USER_PMM, "localhost", password),
        format!(
            "ALTER USER {}@'localhost' WITH MAX_USER_CONNECTIONS 10",
            quote(USER_PMM)
        ),
        grant(
            "SELECT, PROCESS, REPLICATION CLIENT, RELOAD, BACKUP_ADMIN",
            "*.*",
            USER_PMM,
            "localhost",
        ),
    ]
    .join("; ")
}

pub fn create_orchestrator_user(password: &str, group_replication: bool) -> String {
    let mut statements = vec![
        create_user(USER_ORCHESTRATOR, "%", password),
        grant("SELECT", "meta.*", USER_ORCHESTRATOR, "%"),
        grant(
            "SUPER, PROCESS, REPLICATION SLAVE, REPLICATION CLIENT, RELOAD",
            "*.*",
            USER_ORCHESTRATOR,
            "%",
        ),
    ];
    if group_replication {
        statements.push(grant(
            "SELECT",
            "performance_schema.replication_group_members",
            USER_ORCHESTRATOR,
            "%",
        ));
    }
    statements.join("; ")
}
