//! Transport settings fixed at hub initialization

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Origins allowed to open push or stream connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parse a comma-separated list; `*` allows any origin
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }

    /// Requests without an `Origin` header (non-browser clients) are allowed
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (AllowedOrigins::Any, _) | (_, None) => true,
            (AllowedOrigins::List(list), Some(origin)) => {
                let origin = origin.trim_end_matches('/');
                list.iter().any(|allowed| allowed.eq_ignore_ascii_case(origin))
            }
        }
    }
}

impl Default for AllowedOrigins {
    fn default() -> Self {
        AllowedOrigins::List(vec![
            "http://localhost:3000".to_string(),
            "http://127.0.0.1:3000".to_string(),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub allowed_origins: AllowedOrigins,
    /// Interval between server pings on push sockets
    pub ping_interval: Duration,
    /// Push sockets silent for longer than this are closed
    pub pong_timeout: Duration,
    /// Interval between SSE heartbeat comments
    pub heartbeat_interval: Duration,
    /// Per-subscriber buffer before events start being dropped for it
    pub subscriber_buffer: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::default(),
            ping_interval: Duration::from_secs(25),
            pong_timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(25),
            subscriber_buffer: 64,
        }
    }
}

/// The single transport instance created by [`crate::FanoutHub::initialize`]
#[derive(Debug)]
pub struct PushTransport {
    instance_id: Uuid,
    settings: TransportSettings,
    started_at: DateTime<Utc>,
}

impl PushTransport {
    pub(crate) fn new(settings: TransportSettings) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            settings,
            started_at: Utc::now(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_origin_allowed(&self, origin: Option<&str>) -> bool {
        self.settings.allowed_origins.allows(origin)
    }
}
