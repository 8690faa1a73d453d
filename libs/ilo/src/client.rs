//! iLO client
//!
//! Sensor readings come from the Redfish thermal resource over HTTPS. Fan
//! overrides are issued as commands on the controller's SSH shell.

use async_trait::async_trait;
use regex::Regex;
use std::{
    fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    error::{DeviceError, DeviceResult},
    models::{FanReading, FanSpeedRequest, ThermalResponse, UNLOCK_ALL_COMMAND},
    shell::{ShellConnector, ShellSession, ShellTarget, SshConnector},
};

const THERMAL_PATH: &str = "/redfish/v1/chassis/1/Thermal";

/// Operations the panel needs from a fan controller
#[async_trait]
pub trait FanController: Send + Sync {
    /// Current fan sensor readings
    async fn fetch_fans(&self) -> DeviceResult<Vec<FanReading>>;

    /// Pin each channel to the requested percentage
    async fn set_fan_speeds(&self, request: &FanSpeedRequest) -> DeviceResult<()>;

    /// Return every channel to automatic control
    async fn unlock_fans(&self) -> DeviceResult<()>;
}

/// iLO connection settings
///
/// Credentials are optional here; they are checked by [`IloConfig::credentials`]
/// before every device call so a missing value is reported without any
/// transport being attempted.
#[derive(Clone)]
pub struct IloConfig {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssh_port: u16,
    pub ssh_host_key_fingerprint: Option<String>,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl IloConfig {
    /// Create a new IloConfig from environment variables
    ///
    /// # Environment Variables
    /// - `ILO_HOST`, `ILO_USERNAME`, `ILO_PASSWORD`: controller address and account
    /// - `ILO_SSH_PORT`: SSH port (default: 22)
    /// - `ILO_SSH_FINGERPRINT`: pinned SHA-256 host key fingerprint (optional)
    /// - `ILO_TIMEOUT_SECS`: bound on each device call (default: 30)
    /// - `ILO_ACCEPT_INVALID_CERTS`: accept self-signed certificates (default: true)
    pub fn from_env() -> common::error::ConfigResult<Self> {
        use common::config::{optional, parse_or};

        Ok(Self {
            host: optional("ILO_HOST"),
            username: optional("ILO_USERNAME"),
            password: optional("ILO_PASSWORD"),
            ssh_port: parse_or("ILO_SSH_PORT", 22)?,
            ssh_host_key_fingerprint: optional("ILO_SSH_FINGERPRINT"),
            timeout: Duration::from_secs(parse_or("ILO_TIMEOUT_SECS", 30)?),
            accept_invalid_certs: parse_or("ILO_ACCEPT_INVALID_CERTS", true)?,
        })
    }

    /// The device credentials, or the list of variables that are missing
    pub fn credentials(&self) -> DeviceResult<IloCredentials> {
        match (&self.host, &self.username, &self.password) {
            (Some(host), Some(username), Some(password)) => Ok(IloCredentials {
                host: host.clone(),
                username: username.clone(),
                password: password.clone(),
            }),
            _ => {
                let missing = [
                    ("ILO_HOST", self.host.is_none()),
                    ("ILO_USERNAME", self.username.is_none()),
                    ("ILO_PASSWORD", self.password.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(DeviceError::MissingConfig(missing))
            }
        }
    }
}

impl Default for IloConfig {
    fn default() -> Self {
        Self {
            host: None,
            username: None,
            password: None,
            ssh_port: 22,
            ssh_host_key_fingerprint: None,
            timeout: Duration::from_secs(30),
            accept_invalid_certs: true,
        }
    }
}

impl fmt::Debug for IloConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IloConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssh_port", &self.ssh_port)
            .field("timeout", &self.timeout)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Validated device credentials
#[derive(Clone)]
pub struct IloCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl IloCredentials {
    /// Host for the shell transport, without any `scheme://` prefix
    pub fn shell_host(&self) -> &str {
        static SCHEME_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = SCHEME_REGEX.get_or_init(|| {
            Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").expect("Failed to compile scheme regex")
        });

        match regex.find(&self.host) {
            Some(scheme) => &self.host[scheme.end()..],
            None => &self.host,
        }
    }
}

/// Client for a single iLO management controller
#[derive(Clone)]
pub struct IloClient {
    config: IloConfig,
    http: reqwest::Client,
    shell: Arc<dyn ShellConnector>,
    base_url: Option<String>,
}

impl IloClient {
    /// Create a client using SSH for the shell transport
    pub fn new(config: IloConfig) -> DeviceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        let shell = Arc::new(SshConnector::new(config.ssh_host_key_fingerprint.clone()));

        Ok(Self {
            config,
            http,
            shell,
            base_url: None,
        })
    }

    /// Replace the shell transport
    pub fn with_shell(mut self, shell: Arc<dyn ShellConnector>) -> Self {
        self.shell = shell;
        self
    }

    /// Send Redfish requests to `base_url` instead of `https://{ILO_HOST}`
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn thermal_url(&self, credentials: &IloCredentials) -> String {
        match &self.base_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), THERMAL_PATH),
            None => format!("https://{}{}", credentials.host, THERMAL_PATH),
        }
    }

    fn shell_target(&self, credentials: &IloCredentials) -> ShellTarget {
        ShellTarget {
            host: credentials.shell_host().to_string(),
            port: self.config.ssh_port,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        }
    }

    /// Read the fan list from the Redfish thermal resource
    pub async fn fetch_fans(&self) -> DeviceResult<Vec<FanReading>> {
        let credentials = self.config.credentials()?;
        let url = self.thermal_url(&credentials);
        debug!("Fetching fan readings from {}", url);

        let response = self
            .http
            .get(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .map_err(timeout_or_http)?;

        let status = response.status();
        if !status.is_success() {
            warn!("Thermal request failed with status {}", status);
            return Err(DeviceError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(timeout_or_http)?;
        let thermal: ThermalResponse = serde_json::from_slice(&body)?;
        Ok(thermal.fans.unwrap_or_default())
    }

    /// Pin every requested channel, in order, over a single shell session
    pub async fn set_fan_speeds(&self, request: &FanSpeedRequest) -> DeviceResult<()> {
        let out_of_range = request.out_of_range();
        if let Some((channel, percent)) = out_of_range.first() {
            return Err(DeviceError::InvalidRequest(format!(
                "fans[{channel}] must be between 10 and 100, got {percent}"
            )));
        }

        let credentials = self.config.credentials()?;
        let commands: Vec<String> = request.commands().iter().map(|c| c.to_shell()).collect();
        if commands.is_empty() {
            debug!("Empty fan speed request, nothing to send");
            return Ok(());
        }

        self.run_commands(&credentials, &commands).await?;
        info!("Pinned {} fan channel(s)", commands.len());
        Ok(())
    }

    /// Hand every channel back to the controller
    pub async fn unlock_fans(&self) -> DeviceResult<()> {
        let credentials = self.config.credentials()?;
        self.run_commands(&credentials, &[UNLOCK_ALL_COMMAND.to_string()])
            .await?;
        info!("Returned fans to automatic control");
        Ok(())
    }

    /// Run commands on one session and always close it
    ///
    /// The first command failure wins over a failure to close. If the whole
    /// exchange exceeds the timeout, `close` never runs: the session is
    /// released by dropping it, and dropping the SSH handle ends its
    /// connection.
    async fn run_commands(
        &self,
        credentials: &IloCredentials,
        commands: &[String],
    ) -> DeviceResult<()> {
        let target = self.shell_target(credentials);

        let exchange = async {
            let mut session = self.shell.connect(&target).await?;
            let outcome = exec_all(session.as_mut(), commands).await;
            let closed = session.close().await;

            match (outcome, closed) {
                (Err(e), Err(close_err)) => {
                    debug!("Ignoring shell close failure after error: {}", close_err);
                    Err(e)
                }
                (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
                (Ok(()), Ok(())) => Ok(()),
            }
        };

        tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| DeviceError::Timeout)?
    }
}

async fn exec_all(session: &mut dyn ShellSession, commands: &[String]) -> DeviceResult<()> {
    for command in commands {
        let output = session.exec(command).await?;
        if !output.stderr.trim().is_empty() {
            warn!("`{}` wrote to stderr: {}", command, output.stderr.trim());
        }
        match output.exit_status {
            Some(0) | None => {}
            Some(code) => warn!("`{}` exited with status {}", command, code),
        }
    }
    Ok(())
}

fn timeout_or_http(e: reqwest::Error) -> DeviceError {
    if e.is_timeout() {
        DeviceError::Timeout
    } else {
        DeviceError::Http(e)
    }
}

#[async_trait]
impl FanController for IloClient {
    async fn fetch_fans(&self) -> DeviceResult<Vec<FanReading>> {
        IloClient::fetch_fans(self).await
    }

    async fn set_fan_speeds(&self, request: &FanSpeedRequest) -> DeviceResult<()> {
        IloClient::set_fan_speeds(self, request).await
    }

    async fn unlock_fans(&self) -> DeviceResult<()> {
        IloClient::unlock_fans(self).await
    }
}
