//! SSH remote executor
//!
//! Every call opens its own authenticated session and closes it afterwards.
//! Host keys are accepted without verification. Files move over the SFTP
//! subsystem.

use crate::error::{RemoteError, Result};
use crate::keys::load_private_key;
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::{KeyPair, PublicKey};
use russh_sftp::client::SftpSession;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub const SSH_PORT: u16 = 22;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Transform applied to a remote file's contents. The cursor starts at
/// position 0 over the current contents; whatever the buffer holds when the
/// closure returns is written back.
pub type FileEditor = Box<dyn FnOnce(&mut Cursor<Vec<u8>>) -> std::io::Result<()> + Send>;

struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Output of one remote command
#[derive(Debug, Default)]
struct ExecOutput {
    combined: Vec<u8>,
    status: Option<u32>,
}

impl ExecOutput {
    fn combined_lossy(&self) -> String {
        String::from_utf8_lossy(&self.combined).to_string()
    }
}

/// Runs commands and moves files on remote hosts over SSH
pub struct RemoteExecutor {
    user: String,
    key: Arc<KeyPair>,
    config: Arc<client::Config>,
    port: u16,
}

impl RemoteExecutor {
    pub fn new(user: impl Into<String>, key: KeyPair) -> Self {
        Self {
            user: user.into(),
            key: Arc::new(key),
            config: Arc::new(client::Config::default()),
            port: SSH_PORT,
        }
    }

    /// Build an executor from a private key file
    pub fn from_key_file(user: impl Into<String>, path: &Path) -> Result<Self> {
        Ok(Self::new(user, load_private_key(path)?))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    async fn connect(&self, host: &str) -> Result<Handle<AcceptAnyHostKey>> {
        let connect = client::connect(self.config.clone(), (host, self.port), AcceptAnyHostKey);
        let mut session = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| RemoteError::ConnectTimeout {
                host: host.to_string(),
            })??;

        let authenticated = session
            .authenticate_publickey(self.user.as_str(), self.key.clone())
            .await?;
        if !authenticated {
            return Err(RemoteError::AuthenticationRejected {
                user: self.user.clone(),
                host: host.to_string(),
            });
        }
        Ok(session)
    }

    async fn exec(&self, host: &str, command: &str) -> Result<ExecOutput> {
        let session = self.connect(host).await?;
        let mut channel = session.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut output = ExecOutput::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } | ChannelMsg::ExtendedData { ref data, .. } => {
                    output.combined.extend_from_slice(data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    output.status = Some(exit_status);
                }
                _ => {}
            }
        }

        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            tracing::debug!("Disconnect from {} failed: {}", host, e);
        }

        Ok(output)
    }

    async fn open_sftp(&self, host: &str) -> Result<(Handle<AcceptAnyHostKey>, SftpSession)> {
        let session = self.connect(host).await?;
        let channel = session.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        Ok((session, sftp))
    }

    async fn close_sftp(host: &str, session: Handle<AcceptAnyHostKey>, sftp: SftpSession) {
        if let Err(e) = sftp.close().await {
            tracing::debug!("SFTP close on {} failed: {}", host, e);
        }
        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            tracing::debug!("Disconnect from {} failed: {}", host, e);
        }
    }

    fn check_status(output: ExecOutput) -> Result<ExecOutput> {
        match output.status {
            Some(0) => Ok(output),
            Some(status) => Err(RemoteError::CommandFailed {
                status,
                output: output.combined_lossy(),
            }),
            None => Err(RemoteError::NoExitStatus {
                output: output.combined_lossy(),
            }),
        }
    }

    /// Run `command` and return combined stdout and stderr
    pub async fn run_command(&self, host: &str, command: &str) -> Result<String> {
        tracing::debug!("[{}] $ {}", host, first_line(command));
        let output = Self::check_status(self.exec(host, command).await?)?;
        Ok(output.combined_lossy())
    }

    /// Write `contents` to `remote_path`, replacing any existing file
    pub async fn send_file(&self, host: &str, contents: &[u8], remote_path: &str) -> Result<()> {
        tracing::debug!("[{}] upload {} bytes to {}", host, contents.len(), remote_path);
        let (session, sftp) = self.open_sftp(host).await?;
        let written = write_remote(&sftp, remote_path, contents).await;
        Self::close_sftp(host, session, sftp).await;
        written
    }

    /// Read `remote_path`, apply `editor` and write the result back
    pub async fn edit_file(&self, host: &str, remote_path: &str, editor: FileEditor) -> Result<()> {
        tracing::debug!("[{}] edit {}", host, remote_path);
        let (session, sftp) = self.open_sftp(host).await?;
        let edited = edit_remote(&sftp, remote_path, editor).await;
        Self::close_sftp(host, session, sftp).await;
        edited
    }

    /// Connect, authenticate and disconnect. Used to wait for sshd on boot.
    pub async fn ssh_ping(&self, host: &str) -> Result<()> {
        let session = self.connect(host).await?;
        session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}

async fn write_remote(sftp: &SftpSession, remote_path: &str, contents: &[u8]) -> Result<()> {
    let mut file = sftp
        .create(remote_path)
        .await
        .map_err(|e| RemoteError::sftp(remote_path, e))?;
    file.write_all(contents).await?;
    file.shutdown().await?;
    Ok(())
}

async fn edit_remote(sftp: &SftpSession, remote_path: &str, editor: FileEditor) -> Result<()> {
    let current = sftp
        .read(remote_path)
        .await
        .map_err(|e| RemoteError::sftp(remote_path, e))?;

    let mut cursor = Cursor::new(current);
    editor(&mut cursor).map_err(|source| RemoteError::Edit {
        path: remote_path.to_string(),
        source,
    })?;

    write_remote(sftp, remote_path, &cursor.into_inner()).await
}

/// Quote `s` for a POSIX shell
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn first_line(command: &str) -> &str {
    command.trim_start().lines().next().unwrap_or_default()
}
