//! One cluster node as seen by the installers

use crate::error::{Result, StepContext};
use crate::ini::{IniFields, ini_editor};
use crate::scripts::{self, STAGING_DIR};
use crate::sql;
use perconaflow_cloud::{CloudProvider, Instance, ResourceId};
use std::path::Path;

/// Server option file rewritten by every generated edit
pub const DEFAULT_MYSQL_CONFIG_PATH: &str = "/etc/mysql/mysql.conf.d/mysqld.cnf";
/// User supplied option file, kept apart from the generated one
pub const CUSTOM_MYSQL_CONFIG_PATH: &str = "/etc/mysql/mysql.conf.d/custom.cnf";

#[derive(Clone, Copy)]
pub struct Node<'a> {
    cloud: &'a dyn CloudProvider,
    resource_id: &'a ResourceId,
    instance: &'a Instance,
}

impl<'a> Node<'a> {
    pub fn new(cloud: &'a dyn CloudProvider, resource_id: &'a ResourceId, instance: &'a Instance) -> Self {
        Self {
            cloud,
            resource_id,
            instance,
        }
    }

    pub fn instance(&self) -> &'a Instance {
        self.instance
    }

    /// Public address, used to name the node in logs and errors
    pub fn name(&self) -> &'a str {
        &self.instance.public_ip
    }

    pub fn private_ip(&self) -> &'a str {
        &self.instance.private_ip
    }

    pub async fn run(&self, step: &str, command: &str) -> Result<String> {
        self.cloud
            .run_command(self.resource_id, self.instance, command)
            .await
            .step(self.name(), step)
    }

    /// Run `statement` as root through the local `mysql` client
    pub async fn sql(&self, step: &str, root_password: &str, statement: &str) -> Result<String> {
        self.run(step, &sql::mysql_command(root_password, statement))
            .await
    }

    /// Upload to the staging directory, then move into place owned by root
    pub async fn send_file(&self, contents: &[u8], remote_path: &str) -> Result<()> {
        let step = format!("send {}", remote_path);
        let staged = staged_path(remote_path);
        self.cloud
            .send_file(self.resource_id, self.instance, contents, &staged)
            .await
            .step(self.name(), &step)?;
        self.run(&step, &scripts::install_file(&staged, remote_path))
            .await?;
        Ok(())
    }

    /// Copy out to the staging directory, edit there, move back.
    ///
    /// A failed edit leaves the original file untouched.
    pub async fn edit_ini(&self, remote_path: &str, section: &str, fields: IniFields) -> Result<()> {
        let step = format!("edit {}", remote_path);
        let staged = staged_path(remote_path);
        self.run(&step, &scripts::stage_file(remote_path, &staged))
            .await?;
        self.cloud
            .edit_file(
                self.resource_id,
                self.instance,
                &staged,
                ini_editor(section, fields),
            )
            .await
            .step(self.name(), &step)?;
        self.run(&step, &scripts::install_file(&staged, remote_path))
            .await?;
        Ok(())
    }

    /// Edit `[mysqld]` of the generated server option file
    pub async fn edit_mysqld(&self, fields: IniFields) -> Result<()> {
        self.edit_ini(DEFAULT_MYSQL_CONFIG_PATH, "mysqld", fields)
            .await
    }

    /// Upload a local option file as the custom server config
    pub async fn upload_custom_config(&self, local_path: &Path) -> Result<()> {
        let contents = tokio::fs::read(local_path)
            .await
            .step(self.name(), "read custom config")?;
        self.send_file(&contents, CUSTOM_MYSQL_CONFIG_PATH).await
    }
}

/// `/opt/percona/<file name>`
pub fn staged_path(remote_path: &str) -> String {
    let file_name = remote_path.rsplit('/').next().unwrap_or(remote_path);
    format!("{}/{}", STAGING_DIR, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_path() {
        assert_eq!(staged_path(DEFAULT_MYSQL_CONFIG_PATH), "/opt/percona/mysqld.cnf");
        assert_eq!(staged_path("custom.cnf"), "/opt/percona/custom.cnf");
    }
}
