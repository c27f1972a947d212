//! Configuration management
//!
//! Layered: built-in defaults, then an optional TOML file (`softphone.toml`,
//! or the path in `SOFTPHONE_CONFIG`), then `SOFTPHONE__SECTION__KEY`
//! environment variables.

use crate::application::SoftphoneSettings;
use crate::domain::call::Volume;
use crate::domain::session::AgentIdentity;
use crate::domain::shared::error::DomainError;
use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "softphone.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub signaling: SignalingConfig,
    pub agent: AgentConfig,
    pub softphone: SoftphoneConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Back-office REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub agent_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftphoneConfig {
    pub grace_delay_secs: u64,
    pub tick_interval_ms: u64,
    pub history_page_size: u32,
    pub default_volume: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            api: ApiConfig {
                base_url: "http://localhost:3000/api".to_string(),
                auth_token: None,
                request_timeout_secs: 10,
            },
            signaling: SignalingConfig {
                url: "ws://localhost:9090/signaling".to_string(),
            },
            agent: AgentConfig {
                agent_id: "agent".to_string(),
                agent_name: "Agent".to_string(),
            },
            softphone: SoftphoneConfig {
                grace_delay_secs: 2,
                tick_interval_ms: 1000,
                history_page_size: 20,
                default_volume: 100,
            },
            log: LogConfig {
                filter: "softphone=info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load defaults, the config file and `SOFTPHONE__*` overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("SOFTPHONE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_with(&path, "SOFTPHONE")
    }

    pub fn load_with(path: &str, env_prefix: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity::new(&self.agent.agent_id, &self.agent.agent_name)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}

impl SoftphoneConfig {
    pub fn settings(&self) -> Result<SoftphoneSettings, DomainError> {
        Ok(SoftphoneSettings {
            grace_delay: Duration::from_secs(self.grace_delay_secs),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            history_page_size: self.history_page_size,
            default_volume: Volume::new(self.default_volume)?,
        })
    }
}
