use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable that overrides `server.origin`
pub const SERVER_URL_ENV: &str = "TAROT_LIVE_SERVER_URL";

pub const ADMIN_NOTIFICATIONS_TOPIC: &str = "/topic/admin/notifications";
pub const DASHBOARD_SESSIONS_TOPIC: &str = "/topic/dashboard/sessions";

/// Largest STOMP frame buffered before it is discarded
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// tarot-live configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// Server location
    #[serde(default)]
    pub server: ServerConfig,
    /// Connection lifecycle tuning
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Topics subscribed by default
    #[serde(default = "default_topics")]
    pub topics: Vec<TopicConfig>,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Maximum number of entries kept in a live list
    #[serde(default = "default_max_list_size")]
    pub max_list_size: usize,
}

/// Where the push endpoint lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base server origin, e.g. `https://api.example.com`
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Path of the STOMP endpoint below the origin
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    /// Whether the hosting page is served over TLS; the origin scheme is
    /// coerced to match
    #[serde(default)]
    pub page_secure: bool,
    /// Transport used to reach the endpoint
    #[serde(default)]
    pub transport: TransportKind,
}

/// Reconnect, heartbeat and handshake tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Fixed delay between reconnect attempts
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Give up after this many consecutive failed attempts; unbounded when unset
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
    /// Heart-beat interval we offer to send
    #[serde(default = "default_heartbeat")]
    pub heartbeat_outgoing_ms: u64,
    /// Heart-beat interval we ask the server to send
    #[serde(default = "default_heartbeat")]
    pub heartbeat_incoming_ms: u64,
    /// Multiple of the incoming interval tolerated before the link is
    /// considered dead
    #[serde(default = "default_heartbeat_tolerance")]
    pub heartbeat_tolerance: f64,
    /// Time allowed between opening the transport and receiving CONNECTED
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Largest STOMP frame accepted; bigger frames are dropped as malformed
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

/// Supported transport kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// WebSocket first, XHR polling if the socket cannot be opened
    #[default]
    Auto,
    /// Raw WebSocket carrying STOMP frames
    Websocket,
    /// SockJS framing over a WebSocket
    Sockjs,
    /// SockJS XHR long-polling
    XhrPolling,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Auto => write!(f, "auto"),
            TransportKind::Websocket => write!(f, "websocket"),
            TransportKind::Sockjs => write!(f, "sockjs"),
            TransportKind::XhrPolling => write!(f, "xhr-polling"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(TransportKind::Auto),
            "websocket" | "ws" => Ok(TransportKind::Websocket),
            "sockjs" => Ok(TransportKind::Sockjs),
            "xhr-polling" | "xhr" => Ok(TransportKind::XhrPolling),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

/// A topic subscribed by default
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicConfig {
    /// Destination, e.g. `/topic/admin/notifications`
    pub name: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_list_size() -> usize {
    10
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_endpoint_path() -> String {
    "/ws".to_string()
}

fn default_reconnect_delay() -> u64 {
    5000
}

fn default_heartbeat() -> u64 {
    4000
}

fn default_heartbeat_tolerance() -> f64 {
    2.0
}

fn default_connect_timeout() -> u64 {
    10000
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

fn default_topics() -> Vec<TopicConfig> {
    vec![
        TopicConfig {
            name: ADMIN_NOTIFICATIONS_TOPIC.to_string(),
            description: "Admin notifications".to_string(),
        },
        TopicConfig {
            name: DASHBOARD_SESSIONS_TOPIC.to_string(),
            description: "Dashboard reading sessions".to_string(),
        },
    ]
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            server: ServerConfig::default(),
            connection: ConnectionConfig::default(),
            topics: default_topics(),
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            max_list_size: default_max_list_size(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            endpoint_path: default_endpoint_path(),
            page_secure: false,
            transport: TransportKind::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: None,
            heartbeat_outgoing_ms: default_heartbeat(),
            heartbeat_incoming_ms: default_heartbeat(),
            heartbeat_tolerance: default_heartbeat_tolerance(),
            connect_timeout_ms: default_connect_timeout(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl LiveConfig {
    /// Apply `TAROT_LIVE_SERVER_URL` when it is set and non-empty
    pub fn apply_env_overrides(&mut self) {
        if let Ok(origin) = std::env::var(SERVER_URL_ENV) {
            let origin = origin.trim();
            if !origin.is_empty() {
                self.server.origin = origin.to_string();
            }
        }
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.name.clone()).collect()
    }
}
