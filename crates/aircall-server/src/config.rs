//! Server configuration.

use std::time::Duration;

use aircall_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the AirCall server.
///
/// The default binds `127.0.0.1:0` so tests get a free port; the binary builds
/// its config from [`ServerSettings`] instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Route the signaling WebSocket is served on.
    pub path: String,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings in milliseconds.
    pub ping_interval_ms: u64,
    /// Disconnect after this long without a pong, in milliseconds.
    pub pong_timeout_ms: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound messages buffered per connection.
    pub send_queue_capacity: usize,
}

impl ServerConfig {
    /// Ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Pong timeout as a [`Duration`].
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = ServerSettings::default();
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ..Self::from(&settings)
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            path: settings.path.clone(),
            max_connections: settings.max_connections,
            ping_interval_ms: settings.ping_interval_ms,
            pong_timeout_ms: settings.pong_timeout_ms,
            max_message_size: settings.max_message_size,
            send_queue_capacity: settings.send_queue_capacity,
        }
    }
}
