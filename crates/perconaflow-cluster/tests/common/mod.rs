#![allow(dead_code)]

use async_trait::async_trait;
use perconaflow_cloud::{
    CloudError, CloudProvider, Credentials, Instance, Labels, ResourceId, resource_labels,
};
use perconaflow_config::InfraParams;
use perconaflow_remote::{FileEditor, RemoteError};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;

pub const MYSQLD_CNF: &str = "\
[mysqld]
pid-file = /var/run/mysqld/mysqld.pid
socket = /var/run/mysqld/mysqld.sock
datadir = /var/lib/mysql
log-error = /var/log/mysql/error.log
";

pub const VERSION_LISTING: &str = "\
Version: 8.1.0-1-1.focal
Version: 8.0.31-24-1.focal
Version: 8.0.30-23-1.focal
";

#[derive(Debug, Clone)]
pub struct Command {
    pub host: String,
    pub command: String,
}

#[derive(Default)]
struct State {
    commands: Vec<Command>,
    files: HashMap<(String, String), Vec<u8>>,
    /// Directories created with `mkdir -p`, per host
    dirs: HashSet<(String, String)>,
    instances: Vec<(Labels, Instance)>,
    binlog_position: u64,
    configured: Vec<ResourceId>,
    deleted: Vec<ResourceId>,
}

/// In-memory cloud. Records every remote command, simulates the file moves
/// of the staging directory and answers the queries the installers parse.
/// Uploads and edits fail unless a command created their directory first.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
    /// Commands containing this text exit non-zero
    pub fail_on: Option<String>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(text: &str) -> Self {
        Self {
            fail_on: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Commands run on `host`, in order
    pub fn commands_on(&self, host: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.host == host)
            .map(|c| c.command)
            .collect()
    }

    pub fn file(&self, host: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(host.to_string(), path.to_string()))
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn configured(&self) -> Vec<ResourceId> {
        self.state.lock().unwrap().configured.clone()
    }

    pub fn deleted(&self) -> Vec<ResourceId> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn respond(state: &mut State, host: &str, command: &str) -> String {
        for dir in created_dirs(command) {
            state.dirs.insert((host.to_string(), dir));
        }
        if command.contains("apt-cache show") {
            return VERSION_LISTING.to_string();
        }
        if command.contains("SHOW MASTER STATUS") {
            state.binlog_position += 100;
            return format!(
                "mysql: [Warning] Using a password on the command line interface can be insecure.\n\
                 mysql-bin.000001\t{}\t\t\t\n",
                state.binlog_position
            );
        }
        if let Some((verb, from, to)) = file_move(command) {
            let key = (host.to_string(), from);
            let contents = if verb == "mv" {
                state.files.remove(&key)
            } else {
                state.files.get(&key).cloned()
            }
            .unwrap_or_else(|| MYSQLD_CNF.as_bytes().to_vec());
            state.files.insert((host.to_string(), to), contents);
        }
        String::new()
    }
}

/// Arguments of every `mkdir -p` in a script
fn created_dirs(command: &str) -> Vec<String> {
    command
        .lines()
        .filter_map(|line| line.split_once("mkdir -p ").map(|(_, rest)| rest))
        .flat_map(|rest| rest.split_whitespace())
        .map(|dir| dir.trim_matches('\'').to_string())
        .collect()
}

/// `cat > path` fails when the parent directory is missing
fn check_parent_dir(state: &State, host: &str, path: &str) -> perconaflow_cloud::Result<()> {
    let parent = path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or_default();
    if state.dirs.contains(&(host.to_string(), parent.to_string())) {
        return Ok(());
    }
    Err(CloudError::remote(
        host.to_string(),
        RemoteError::CommandFailed {
            status: 1,
            output: format!("bash: {}: No such file or directory", path),
        },
    ))
}

/// `sudo cp 'a' 'b' && ...` or `sudo mv 'a' 'b' && ...`
fn file_move(command: &str) -> Option<(&'static str, String, String)> {
    let verb = if command.starts_with("sudo cp ") {
        "cp"
    } else if command.starts_with("sudo mv ") {
        "mv"
    } else {
        return None;
    };
    let quoted: Vec<&str> = command.split('\'').skip(1).step_by(2).collect();
    match quoted.as_slice() {
        [from, to, ..] => Some((verb, from.to_string(), to.to_string())),
        _ => None,
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    async fn configure(&self, resource_id: &ResourceId, _params: &InfraParams) -> perconaflow_cloud::Result<()> {
        self.state.lock().unwrap().configured.push(resource_id.clone());
        Ok(())
    }

    async fn create_infrastructure(&self, _resource_id: &ResourceId) -> perconaflow_cloud::Result<()> {
        Ok(())
    }

    async fn create_instances(
        &self,
        resource_id: &ResourceId,
        count: usize,
        labels: &Labels,
    ) -> perconaflow_cloud::Result<Vec<Instance>> {
        let mut state = self.state.lock().unwrap();
        let labels = resource_labels(resource_id, labels);
        let mut created = Vec::new();
        for _ in 0..count {
            let n = state.instances.len() + 1;
            let instance = Instance::new(format!("54.0.0.{}", n), format!("10.0.1.{}", n));
            state.instances.push((labels.clone(), instance.clone()));
            created.push(instance);
        }
        Ok(created)
    }

    async fn list_instances(
        &self,
        resource_id: &ResourceId,
        labels: &Labels,
    ) -> perconaflow_cloud::Result<Vec<Instance>> {
        let wanted = resource_labels(resource_id, labels);
        let state = self.state.lock().unwrap();
        Ok(state
            .instances
            .iter()
            .filter(|(have, _)| wanted.iter().all(|(k, v)| have.get(k) == Some(v)))
            .map(|(_, instance)| instance.clone())
            .collect())
    }

    async fn delete_infrastructure(&self, resource_id: &ResourceId) -> perconaflow_cloud::Result<()> {
        self.state.lock().unwrap().deleted.push(resource_id.clone());
        Ok(())
    }

    async fn run_command(
        &self,
        _resource_id: &ResourceId,
        instance: &Instance,
        command: &str,
    ) -> perconaflow_cloud::Result<String> {
        // Let concurrent installers interleave like real SSH calls do
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.commands.push(Command {
            host: instance.public_ip.clone(),
            command: command.to_string(),
        });
        if let Some(text) = &self.fail_on {
            if command.contains(text.as_str()) {
                return Err(CloudError::remote(
                    instance.public_ip.clone(),
                    RemoteError::CommandFailed {
                        status: 1,
                        output: format!("{} failed", text),
                    },
                ));
            }
        }
        Ok(Self::respond(&mut state, &instance.public_ip, command))
    }

    async fn send_file(
        &self,
        _resource_id: &ResourceId,
        instance: &Instance,
        contents: &[u8],
        remote_path: &str,
    ) -> perconaflow_cloud::Result<()> {
        let mut state = self.state.lock().unwrap();
        check_parent_dir(&state, &instance.public_ip, remote_path)?;
        state.files.insert(
            (instance.public_ip.clone(), remote_path.to_string()),
            contents.to_vec(),
        );
        Ok(())
    }

    async fn edit_file(
        &self,
        _resource_id: &ResourceId,
        instance: &Instance,
        remote_path: &str,
        editor: FileEditor,
    ) -> perconaflow_cloud::Result<()> {
        let mut state = self.state.lock().unwrap();
        check_parent_dir(&state, &instance.public_ip, remote_path)?;
        let key = (instance.public_ip.clone(), remote_path.to_string());
        let contents = state.files.get(&key).cloned().unwrap_or_default();
        let mut cursor = Cursor::new(contents);
        editor(&mut cursor).map_err(|e| {
            CloudError::remote(
                instance.public_ip.clone(),
                RemoteError::Edit {
                    path: remote_path.to_string(),
                    source: e,
                },
            )
        })?;
        state.files.insert(key, cursor.into_inner());
        Ok(())
    }

    async fn credentials(&self) -> perconaflow_cloud::Result<Credentials> {
        Ok(Credentials {
            access_key: "AKIAFAKE".to_string(),
            secret_key: "fake-secret".to_string(),
        })
    }
}
