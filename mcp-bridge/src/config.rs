//! Bridge configuration, read from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::handshake::{DEFAULT_PROTOCOL_VERSION, HandshakeConfig};
use crate::normalize::{DEFAULT_FAILURE_KEYWORDS, Normalizer};
use crate::supervisor::{ChildCommand, SupervisorConfig};
use crate::transport::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub server_path: PathBuf,
    pub server_args: Vec<String>,
    pub server_cwd: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub call_timeout: Duration,
    pub init_timeout: Duration,
    pub boot_delay: Duration,
    pub restart_backoff: Duration,
    pub max_restarts: Option<u32>,
    pub protocol_version: String,
    pub failure_keywords: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server_path: PathBuf::from("mcp-server"),
            server_args: Vec::new(),
            server_cwd: None,
            host: "0.0.0.0".to_string(),
            port: 3000,
            call_timeout: Duration::from_secs(30),
            init_timeout: Duration::from_secs(20),
            boot_delay: Duration::from_millis(800),
            restart_backoff: Duration::from_millis(1500),
            max_restarts: None,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            failure_keywords: DEFAULT_FAILURE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset and blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = get("MCP_SERVER_PATH") {
            config.server_path = PathBuf::from(path.trim());
        }
        if let Some(args) = get("MCP_SERVER_ARGS") {
            config.server_args = args.split_whitespace().map(str::to_string).collect();
        }
        config.server_cwd = get("MCP_SERVER_CWD").map(PathBuf::from);
        if let Some(host) = get("HOST") {
            config.host = host.trim().to_string();
        }
        if let Some(port) = get("PORT") {
            config.port = parse_number("PORT", &port)?;
        }
        if let Some(ms) = get("MCP_CALL_TIMEOUT_MS") {
            config.call_timeout = parse_millis("MCP_CALL_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = get("MCP_INIT_TIMEOUT_MS") {
            config.init_timeout = parse_millis("MCP_INIT_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = get("MCP_BOOT_DELAY_MS") {
            config.boot_delay = parse_millis("MCP_BOOT_DELAY_MS", &ms)?;
        }
        if let Some(ms) = get("MCP_RESTART_BACKOFF_MS") {
            config.restart_backoff = parse_millis("MCP_RESTART_BACKOFF_MS", &ms)?;
        }
        if let Some(max) = get("MCP_MAX_RESTARTS") {
            config.max_restarts = Some(parse_number("MCP_MAX_RESTARTS", &max)?);
        }
        if let Some(version) = get("MCP_PROTOCOL_VERSION") {
            config.protocol_version = version.trim().to_string();
        }
        // Set-but-empty disables the heuristic, so read it without the blank filter.
        if let Some(keywords) = lookup("MCP_FAILURE_KEYWORDS") {
            config.failure_keywords = keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
    }

    pub fn child_command(&self) -> ChildCommand {
        let command = ChildCommand::new(&self.server_path).with_args(self.server_args.clone());
        match self.server_cwd {
            Some(ref dir) => command.with_current_dir(dir),
            None => command,
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig::new(self.child_command())
            .with_boot_delay(self.boot_delay)
            .with_restart_backoff(self.restart_backoff)
            .with_max_restarts(self.max_restarts)
    }

    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig::default()
            .with_protocol_version(self.protocol_version.clone())
            .with_timeout(self.init_timeout)
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(&self.failure_keywords)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        })
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_number(var, value).map(Duration::from_millis)
}
