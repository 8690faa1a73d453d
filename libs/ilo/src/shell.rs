//! Command shell transport
//!
//! Fan speeds are changed through the controller's SSH command line. The
//! transport sits behind [`ShellConnector`]/[`ShellSession`] so the client can
//! be driven against a scripted shell in tests.

use async_trait::async_trait;
use russh::{ChannelMsg, Disconnect, client};
use russh_keys::key::PublicKey;
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

use crate::error::{DeviceError, DeviceResult};

/// Where and as whom to open a shell
#[derive(Clone)]
pub struct ShellTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ShellTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Output of a single command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<u32>,
}

/// Opens authenticated shell sessions
#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn connect(&self, target: &ShellTarget) -> DeviceResult<Box<dyn ShellSession>>;
}

/// An open shell; callers must `close` it on every path
#[async_trait]
pub trait ShellSession: Send {
    async fn exec(&mut self, command: &str) -> DeviceResult<CommandOutput>;

    async fn close(self: Box<Self>) -> DeviceResult<()>;
}

/// SSH transport backed by `russh`
#[derive(Clone)]
pub struct SshConnector {
    config: Arc<client::Config>,
    host_key_fingerprint: Option<String>,
}

impl SshConnector {
    /// `host_key_fingerprint` pins the controller's SHA-256 host key
    /// fingerprint; without it any host key is accepted.
    pub fn new(host_key_fingerprint: Option<String>) -> Self {
        Self {
            config: Arc::new(client::Config::default()),
            host_key_fingerprint,
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(None)
    }
}

struct HostKeyCheck {
    expected_fingerprint: Option<String>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let Some(expected) = &self.expected_fingerprint else {
            return Ok(true);
        };

        let actual = server_public_key.fingerprint();
        let expected = expected.trim_start_matches("SHA256:");
        if actual == expected {
            Ok(true)
        } else {
            warn!("Rejected SSH host key with fingerprint SHA256:{}", actual);
            Ok(false)
        }
    }
}

#[async_trait]
impl ShellConnector for SshConnector {
    async fn connect(&self, target: &ShellTarget) -> DeviceResult<Box<dyn ShellSession>> {
        debug!("Opening SSH session to {}:{}", target.host, target.port);

        let handler = HostKeyCheck {
            expected_fingerprint: self.host_key_fingerprint.clone(),
        };
        let mut handle = client::connect(
            self.config.clone(),
            (target.host.as_str(), target.port),
            handler,
        )
        .await?;

        let authenticated = match handle
            .authenticate_password(target.username.clone(), target.password.clone())
            .await
        {
            Ok(authenticated) => authenticated,
            Err(e) => {
                disconnect(&handle).await;
                return Err(e.into());
            }
        };

        if !authenticated {
            disconnect(&handle).await;
            return Err(DeviceError::AuthenticationFailed);
        }

        Ok(Box::new(SshSession { handle }))
    }
}

struct SshSession {
    handle: client::Handle<HostKeyCheck>,
}

#[async_trait]
impl ShellSession for SshSession {
    async fn exec(&mut self, command: &str) -> DeviceResult<CommandOutput> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }

    async fn close(self: Box<Self>) -> DeviceResult<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

async fn disconnect(handle: &client::Handle<HostKeyCheck>) {
    if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
        debug!("Ignoring SSH disconnect failure: {}", e);
    }
}
