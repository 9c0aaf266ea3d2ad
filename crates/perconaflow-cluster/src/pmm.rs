//! PMM agent wiring on database nodes

use crate::error::{ClusterError, Result};
use crate::ini::{IniFields, fields};
use crate::node::Node;
use crate::scripts;
use crate::sql::{self, USER_PMM};
use reqwest::Url;

const DEFAULT_PMM_USER: &str = "admin";
const DEFAULT_PMM_PASSWORD: &str = "admin";

/// Fill in what a bare PMM address leaves out: `https` when no scheme is
/// given, `admin:admin` when no credentials are.
pub fn normalize_pmm_address(address: &str) -> Result<Url> {
    let invalid = |message: String| ClusterError::InvalidPmmAddress {
        address: address.to_string(),
        message,
    };

    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty address".to_string()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    if url.username().is_empty() {
        url.set_username(DEFAULT_PMM_USER)
            .and_then(|()| url.set_password(Some(DEFAULT_PMM_PASSWORD)))
            .map_err(|()| invalid("cannot carry credentials".to_string()))?;
    }
    url.set_path("");
    Ok(url)
}

/// Slow log and statistics options the query analytics rely on
pub fn pmm_mysqld_fields() -> IniFields {
    fields([
        ("slow_query_log", "ON"),
        ("log_output", "FILE"),
        ("long_query_time", "0"),
        ("log_slow_admin_statements", "ON"),
        ("log_slow_slave_statements", "ON"),
        ("log_slow_rate_limit", "100"),
        ("log_slow_rate_type", "query"),
        ("slow_query_log_always_write_time", "1"),
        ("log_slow_verbosity", "full"),
        ("slow_query_log_use_global_control", "all"),
        ("performance_schema", "OFF"),
        ("userstat", "ON"),
    ])
}

/// Install and configure `pmm2-client`, create the monitoring user and turn
/// on the slow log. Takes effect on the next server restart.
pub async fn install_agent(
    node: &Node<'_>,
    server_url: &Url,
    root_password: &str,
    pmm_password: &str,
) -> Result<()> {
    tracing::info!("Installing PMM client on {}", node.name());
    node.run("install pmm client", &scripts::install_pmm_client(server_url.as_str()))
        .await?;
    node.sql("create pmm user", root_password, &sql::create_pmm_user(pmm_password))
        .await?;
    node.edit_mysqld(pmm_mysqld_fields()).await
}

/// Register the local server with PMM
pub async fn register_agent(node: &Node<'_>, pmm_password: &str, port: u16) -> Result<()> {
    tracing::info!("Adding {} to PMM", node.name());
    node.run(
        "add service to pmm",
        &scripts::add_service_to_pmm(USER_PMM, pmm_password, port),
    )
    .await?;
    Ok(())
}
