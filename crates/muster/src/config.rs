//! Configuration management for Muster.
//!
//! Sources, lowest to highest precedence: built-in defaults, the TOML
//! config file, CLI flags (which also read their `MUSTER_*` env vars).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use muster_common::constants::{
    DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DOCKER_API_PORT,
    DEFAULT_DOCKER_BIN, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL_SECS, DEFAULT_SSH_TOKEN_COMMAND,
    DEFAULT_SSH_USER, DEFAULT_SWARM_PORT, DEFAULT_TOKEN_DIR,
};
use muster_common::{MusterError, NodeRole};

/// Raw configuration as read from file and CLI, before validation
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Node role: "manager" or "worker"
    #[serde(default)]
    pub role: Option<String>,

    /// Private address of the manager node
    #[serde(default)]
    pub manager_address: Option<String>,

    /// Address the manager advertises (defaults to manager_address)
    #[serde(default)]
    pub advertise_address: Option<String>,

    /// Swarm management port
    #[serde(default = "default_swarm_port")]
    pub swarm_port: u16,

    /// Global join attempt budget
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed pause between attempts
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Probe and SSH connect timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Deadline for any docker/ssh command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// This node's unique ID (auto-generated if not set)
    #[serde(default = "generate_node_id")]
    pub node_id: String,

    /// Docker CLI binary
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,

    /// Token exchange configuration
    #[serde(default)]
    pub token: TokenConfig,
}

/// Token backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackendKind {
    File,
    Ssh,
    Docker,
}

/// Token exchange configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Backends tried in order when fetching
    #[serde(default = "default_token_sources")]
    pub sources: Vec<TokenBackendKind>,

    /// Shared directory for published tokens
    #[serde(default = "default_token_dir")]
    pub file_dir: PathBuf,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub docker: DockerApiConfig,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            sources: default_token_sources(),
            file_dir: default_token_dir(),
            ssh: SshConfig::default(),
            docker: DockerApiConfig::default(),
        }
    }
}

/// SSH token backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    /// Remote principal
    #[serde(default = "default_ssh_user")]
    pub user: String,

    /// Private key passed with `-i`
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Command whose stdout is the join token
    #[serde(default = "default_ssh_command")]
    pub remote_command: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            identity_file: None,
            remote_command: default_ssh_command(),
        }
    }
}

/// Direct Docker API token backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DockerApiConfig {
    #[serde(default = "default_docker_api_port")]
    pub api_port: u16,
}

impl Default for DockerApiConfig {
    fn default() -> Self {
        Self {
            api_port: default_docker_api_port(),
        }
    }
}

// Default value functions
fn default_swarm_port() -> u16 { DEFAULT_SWARM_PORT }
fn default_max_retries() -> u32 { DEFAULT_MAX_RETRIES }
fn default_retry_interval() -> u64 { DEFAULT_RETRY_INTERVAL_SECS }
fn default_connect_timeout() -> u64 { DEFAULT_CONNECT_TIMEOUT_SECS }
fn default_command_timeout() -> u64 { DEFAULT_COMMAND_TIMEOUT_SECS }
fn default_docker_bin() -> String { DEFAULT_DOCKER_BIN.to_string() }
fn default_token_sources() -> Vec<TokenBackendKind> { vec![TokenBackendKind::Ssh] }
fn default_token_dir() -> PathBuf { PathBuf::from(DEFAULT_TOKEN_DIR) }
fn default_ssh_user() -> String { DEFAULT_SSH_USER.to_string() }
fn default_ssh_command() -> String { DEFAULT_SSH_TOKEN_COMMAND.to_string() }
fn default_docker_api_port() -> u16 { DEFAULT_DOCKER_API_PORT }

fn generate_node_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    format!("node-{:08x}", rng.random::<u32>())
}

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            tracing::debug!(path = %config_path, "Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref role) = args.role {
            config.role = Some(role.clone());
        }
        if let Some(ref address) = args.manager_address {
            config.manager_address = Some(address.clone());
        }
        if let Some(ref address) = args.advertise_address {
            config.advertise_address = Some(address.clone());
        }
        if let Some(port) = args.swarm_port {
            config.swarm_port = port;
        }
        if let Some(retries) = args.max_retries {
            config.max_retries = retries;
        }
        if let Some(interval) = args.retry_interval {
            config.retry_interval_secs = interval;
        }
        if let Some(timeout) = args.connect_timeout {
            config.connect_timeout_secs = timeout;
        }
        if let Some(ref node_id) = args.node_id {
            config.node_id = node_id.clone();
        }
        if !args.token_source.is_empty() {
            config.token.sources = args.token_source.clone();
        }
        if let Some(ref dir) = args.token_dir {
            config.token.file_dir = dir.clone();
        }
        if let Some(ref user) = args.ssh_user {
            config.token.ssh.user = user.clone();
        }
        if let Some(ref key) = args.ssh_key {
            config.token.ssh.identity_file = Some(key.clone());
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            role: None,
            manager_address: None,
            advertise_address: None,
            swarm_port: default_swarm_port(),
            max_retries: default_max_retries(),
            retry_interval_secs: default_retry_interval(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            node_id: generate_node_id(),
            docker_bin: default_docker_bin(),
            token: TokenConfig::default(),
        }
    }
}

/// Validated bootstrap configuration
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub role: NodeRole,
    pub manager_address: String,
    /// Manager: address passed to `swarm init`. Worker: informational, may be empty.
    pub advertise_address: String,
    pub swarm_port: u16,
    pub max_retries: u32,
    pub retry_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub node_id: String,
    pub docker_bin: String,
    pub token: TokenConfig,
}

impl BootstrapConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl TryFrom<AppConfig> for BootstrapConfig {
    type Error = MusterError;

    fn try_from(config: AppConfig) -> Result<Self, Self::Error> {
        let role: NodeRole = config
            .role
            .as_deref()
            .ok_or_else(|| MusterError::Config("role is required (manager or worker)".into()))?
            .parse()?;

        let manager_address = config
            .manager_address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| MusterError::Config("manager_address is required".into()))?;
        validate_host("manager_address", &manager_address)?;

        let advertise_address = match config.advertise_address {
            Some(address) if !address.trim().is_empty() => {
                let address = address.trim().to_string();
                validate_host("advertise_address", &address)?;
                address
            }
            _ => match role {
                NodeRole::Manager => manager_address.clone(),
                NodeRole::Worker => String::new(),
            },
        };

        if config.max_retries == 0 {
            return Err(MusterError::Config("max_retries must be at least 1".into()));
        }
        if config.swarm_port == 0 {
            return Err(MusterError::Config("swarm_port must be non-zero".into()));
        }
        if config.connect_timeout_secs == 0 {
            return Err(MusterError::Config("connect_timeout_secs must be at least 1".into()));
        }
        if config.command_timeout_secs == 0 {
            return Err(MusterError::Config("command_timeout_secs must be at least 1".into()));
        }
        if role == NodeRole::Worker && config.token.sources.is_empty() {
            return Err(MusterError::Config("token.sources must name at least one backend".into()));
        }
        if config.node_id.trim().is_empty() {
            return Err(MusterError::Config("node_id must not be empty".into()));
        }

        Ok(Self {
            role,
            manager_address,
            advertise_address,
            swarm_port: config.swarm_port,
            max_retries: config.max_retries,
            retry_interval_secs: config.retry_interval_secs,
            connect_timeout_secs: config.connect_timeout_secs,
            command_timeout_secs: config.command_timeout_secs,
            node_id: config.node_id,
            docker_bin: config.docker_bin,
            token: config.token,
        })
    }
}

/// Accept IP literals and DNS hostnames
fn validate_host(field: &str, host: &str) -> Result<(), MusterError> {
    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let valid_hostname = host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });

    if valid_hostname {
        Ok(())
    } else {
        Err(MusterError::Config(format!("{} '{}' is not a valid address", field, host)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker_config() -> AppConfig {
        AppConfig {
            role: Some("worker".to_string()),
            manager_address: Some("10.0.1.5".to_string()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = BootstrapConfig::try_from(worker_config()).unwrap();

        assert_eq!(config.role, NodeRole::Worker);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.retry_interval(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.swarm_port, 2377);
        assert_eq!(config.token.sources, vec![TokenBackendKind::Ssh]);
        assert!(config.node_id.starts_with("node-"));
    }

    #[test]
    fn test_manager_advertises_manager_address_by_default() {
        let mut raw = worker_config();
        raw.role = Some("MANAGER".to_string());

        let config = BootstrapConfig::try_from(raw).unwrap();
        assert_eq!(config.role, NodeRole::Manager);
        assert_eq!(config.advertise_address, "10.0.1.5");
    }

    #[test]
    fn test_missing_role_is_config_error() {
        let mut raw = worker_config();
        raw.role = None;
        assert!(matches!(
            BootstrapConfig::try_from(raw),
            Err(MusterError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_role_is_config_error() {
        let mut raw = worker_config();
        raw.role = Some("leader".to_string());
        assert!(matches!(
            BootstrapConfig::try_from(raw),
            Err(MusterError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_address_is_config_error() {
        for bad in ["", "10.0.1.5:2377", "bad host", "-leading.example", "a..b"] {
            let mut raw = worker_config();
            raw.manager_address = Some(bad.to_string());
            assert!(
                matches!(BootstrapConfig::try_from(raw), Err(MusterError::Config(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_hostnames_and_ipv6_accepted() {
        for good in ["manager.internal", "ip-10-0-1-5.ec2.internal", "fd00::5"] {
            let mut raw = worker_config();
            raw.manager_address = Some(good.to_string());
            assert!(BootstrapConfig::try_from(raw).is_ok(), "rejected {:?}", good);
        }
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut raw = worker_config();
        raw.max_retries = 0;
        assert!(matches!(
            BootstrapConfig::try_from(raw),
            Err(MusterError::Config(_))
        ));
    }

    #[test]
    fn test_worker_needs_a_token_backend() {
        let mut raw = worker_config();
        raw.token.sources.clear();
        assert!(matches!(
            BootstrapConfig::try_from(raw),
            Err(MusterError::Config(_))
        ));
    }

    #[test]
    fn test_parse_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("muster.toml");
        std::fs::write(
            &path,
            r#"
role = "worker"
manager_address = "10.0.1.5"
max_retries = 5
retry_interval_secs = 15

[token]
sources = ["file", "ssh"]
file_dir = "/srv/tokens"

[token.ssh]
user = "ec2-user"
identity_file = "/etc/muster/id_ed25519"
"#,
        )
        .unwrap();

        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .build()
            .unwrap();
        let raw: AppConfig = settings.try_deserialize().unwrap();
        let config = BootstrapConfig::try_from(raw).unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_interval_secs, 15);
        assert_eq!(
            config.token.sources,
            vec![TokenBackendKind::File, TokenBackendKind::Ssh]
        );
        assert_eq!(config.token.file_dir, PathBuf::from("/srv/tokens"));
        assert_eq!(config.token.ssh.user, "ec2-user");
        assert_eq!(
            config.token.ssh.identity_file,
            Some(PathBuf::from("/etc/muster/id_ed25519"))
        );
        assert_eq!(config.token.docker.api_port, 2375);
    }
}
