//! Server configuration

use deskwire_hub::{AllowedOrigins, TransportSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Realtime transport configuration
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &crate::Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        // Apply CLI overrides
        if let Some(listen) = &cli.listen {
            config.listen = listen.clone();
        }

        if let Some(port) = cli.port {
            config.port = port;
        }

        if let Some(origins) = &cli.allowed_origins {
            config.realtime.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            realtime: RealtimeConfig::default(),
        }
    }
}

/// Realtime transport configuration, read once when the hub initializes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Origins allowed to open push connections; `*` allows any
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,

    /// SSE heartbeat comment interval
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl RealtimeConfig {
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            allowed_origins: AllowedOrigins::parse(&self.allowed_origins.join(",")),
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs.max(1)),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            subscriber_buffer: self.subscriber_buffer,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_origins(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            heartbeat_interval_secs: default_heartbeat(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

fn default_ping_interval() -> u64 {
    25
}

fn default_pong_timeout() -> u64 {
    60
}

fn default_heartbeat() -> u64 {
    25
}

fn default_subscriber_buffer() -> usize {
    64
}
