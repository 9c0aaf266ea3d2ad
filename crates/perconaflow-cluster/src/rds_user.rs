//! Least-privilege `pmm` user on an RDS instance
//!
//! PMM never sees the master credentials. They only open one connection that
//! creates the `pmm` user, and PMM registers the instance with that user.

use crate::error::{ClusterError, Result};
use crate::pmm_api::{ENGINE_RDS_MYSQL, ENGINE_RDS_POSTGRESQL, RdsInstance};
use crate::sql::{USER_PMM, quote};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};

const PMM_MAX_CONNECTIONS: u32 = 10;

/// MySQL statements creating the `pmm` user with monitoring grants only
pub fn mysql_statements(pmm_password: &str) -> Vec<String> {
    let user = format!("{}@'%'", quote(USER_PMM));
    vec![
        format!(
            "CREATE USER IF NOT EXISTS {} IDENTIFIED WITH mysql_native_password BY {}",
            user,
            quote(pmm_password)
        ),
        format!("GRANT SELECT, PROCESS, REPLICATION CLIENT ON *.* TO {}", user),
        format!("ALTER USER {} WITH MAX_USER_CONNECTIONS {}", user, PMM_MAX_CONNECTIONS),
        format!("GRANT SELECT, UPDATE, DELETE, DROP ON performance_schema.* TO {}", user),
    ]
}

/// PostgreSQL statements creating the `pmm` user in the `rds_superuser` role
pub fn postgres_statements(pmm_password: &str) -> Vec<String> {
    let user = pg_identifier(USER_PMM);
    vec![
        format!("CREATE USER {} WITH PASSWORD {}", user, pg_literal(pmm_password)),
        format!("GRANT rds_superuser TO {}", user),
        format!("ALTER USER {} CONNECTION LIMIT {}", user, PMM_MAX_CONNECTIONS),
    ]
}

fn pg_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn pg_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Connect with the master credentials and create the `pmm` user
pub async fn create_pmm_user(
    instance: &RdsInstance,
    username: &str,
    password: &str,
    pmm_password: &str,
) -> Result<()> {
    if instance.engine != ENGINE_RDS_MYSQL && instance.engine != ENGINE_RDS_POSTGRESQL {
        return Err(ClusterError::InvalidConfig(format!(
            "engine {} of RDS instance {} is not supported",
            instance.engine, instance.instance_id
        )));
    }
    let port = u16::try_from(instance.port).map_err(|_| {
        ClusterError::InvalidConfig(format!(
            "RDS instance {} reports invalid port {}",
            instance.instance_id, instance.port
        ))
    })?;

    tracing::info!("Creating {} user on RDS instance {}", USER_PMM, instance.instance_id);
    if instance.engine == ENGINE_RDS_MYSQL {
        let options = MySqlConnectOptions::new()
            .host(&instance.address)
            .port(port)
            .username(username)
            .password(password);
        let mut conn = MySqlConnection::connect_with(&options).await?;
        for statement in mysql_statements(pmm_password) {
            conn.execute(statement.as_str()).await?;
        }
        conn.close().await?;
    } else {
        let options = PgConnectOptions::new()
            .host(&instance.address)
            .port(port)
            .username(username)
            .password(password)
            .database("postgres");
        let mut conn = PgConnection::connect_with(&options).await?;
        for statement in postgres_statements(pmm_password) {
            conn.execute(statement.as_str()).await?;
        }
        conn.close().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_statements() {
        assert_eq!(
            mysql_statements("pw"),
            vec![
                "CREATE USER IF NOT EXISTS 'pmm'@'%' IDENTIFIED WITH mysql_native_password BY 'pw'",
                "GRANT SELECT, PROCESS, REPLICATION CLIENT ON *.* TO 'pmm'@'%'",
                "ALTER USER 'pmm'@'%' WITH MAX_USER_CONNECTIONS 10",
                "GRANT SELECT, UPDATE, DELETE, DROP ON performance_schema.* TO 'pmm'@'%'",
            ]
        );
    }

    #[test]
    fn test_postgres_statements() {
        assert_eq!(
            postgres_statements("pw"),
            vec![
                r#"CREATE USER "pmm" WITH PASSWORD 'pw'"#,
                r#"GRANT rds_superuser TO "pmm""#,
                r#"ALTER USER "pmm" CONNECTION LIMIT 10"#,
            ]
        );
    }

    #[test]
    fn test_passwords_are_escaped() {
        assert!(mysql_statements("it's")[0].ends_with(r"BY 'it\'s'"));
        assert!(postgres_statements("it's")[0].ends_with("PASSWORD 'it''s'"));
    }

    #[tokio::test]
    async fn test_unsupported_engine_fails_before_connecting() {
        let instance = RdsInstance {
            instance_id: "database-1".to_string(),
            engine: "DISCOVER_RDS_MARIADB".to_string(),
            address: "database-1.rds.amazonaws.com".to_string(),
            port: 3306,
            ..Default::default()
        };
        let err = create_pmm_user(&instance, "admin", "secret", "pw")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[tokio::test]
    async fn test_invalid_port_fails_before_connecting() {
        let instance = RdsInstance {
            instance_id: "database-1".to_string(),
            engine: ENGINE_RDS_MYSQL.to_string(),
            address: "database-1.rds.amazonaws.com".to_string(),
            port: 70000,
            ..Default::default()
        };
        let err = create_pmm_user(&instance, "admin", "secret", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::InvalidConfig(_)));
    }
}
