//! Configuration for k6-mcp
//!
//! Configuration is searched in order:
//! 1. `K6_MCP_CONFIG_PATH` env var
//! 2. `~/.binks/k6.toml`
//! 3. `./k6-mcp.toml`
//! 4. `$XDG_CONFIG_HOME/k6-mcp/config.toml`
//! 5. Default config if none found
//!
//! `K6_BINARY` overrides `engine.binary` regardless of where the config came from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{K6Error, K6Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub ports: PortConfig,
    #[serde(default)]
    pub startup: StartupConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// k6 binary name or path
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Extra arguments appended after the managed flags
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Lines of engine output kept for launch failure reports
    #[serde(default = "default_output_tail_lines")]
    pub output_tail_lines: usize,
}

fn default_binary() -> String {
    "k6".to_string()
}

fn default_output_tail_lines() -> usize {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            extra_args: Vec::new(),
            output_tail_lines: default_output_tail_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// First control port tried (k6's own default API port)
    #[serde(default = "default_base_port")]
    pub base: u16,

    /// How many ports above `base` may be searched
    #[serde(default = "default_search_limit")]
    pub search_limit: u16,
}

fn default_base_port() -> u16 {
    6565
}

fn default_search_limit() -> u16 {
    100
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            base: default_base_port(),
            search_limit: default_search_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Poll the control port until it accepts connections.
    /// When false, sleep `settle_ms` instead.
    #[serde(default = "default_true")]
    pub probe: bool,

    #[serde(default = "default_startup_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_startup_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_settle_ms() -> u64 {
    2_000
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            probe: default_true(),
            timeout_ms: default_startup_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl StartupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Whole-request timeout for control API calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    2
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Grace period between SIGTERM and a forced kill
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

fn default_grace_secs() -> u64 {
    5
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
        }
    }
}

impl ShutdownConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl Config {
    /// Load config from the standard locations, falling back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                tracing::info!("Using default configuration");
                Self::default()
            }
        };

        if let Ok(binary) = std::env::var("K6_BINARY") {
            tracing::info!("Using k6 binary from K6_BINARY={}", binary);
            config.engine.binary = binary;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("K6_MCP_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!("K6_MCP_CONFIG_PATH={} does not exist", env_path);
        }

        let mut candidates = Vec::new();
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".binks").join("k6.toml"));
        }
        candidates.push(PathBuf::from("k6-mcp.toml"));
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("k6-mcp").join("config.toml"));
        }

        candidates.into_iter().find(|p| p.exists())
    }

    /// Reject values that would make the registry misbehave
    pub fn validate(&self) -> K6Result<()> {
        if self.engine.binary.trim().is_empty() {
            return Err(K6Error::Config("engine.binary cannot be empty".into()));
        }
        if self.ports.search_limit == 0 {
            return Err(K6Error::Config("ports.search_limit must be at least 1".into()));
        }
        if self.startup.poll_interval_ms == 0 {
            return Err(K6Error::Config(
                "startup.poll_interval_ms must be at least 1".into(),
            ));
        }
        if self.control.request_timeout_secs == 0 {
            return Err(K6Error::Config(
                "control.request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
