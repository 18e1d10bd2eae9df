//! Settings types.
//!
//! All structs use camelCase JSON keys and `#[serde(default)]`, so a settings
//! file only needs to name the values it changes.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AirCallSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Server network and connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Route the signaling WebSocket is served on.
    pub path: String,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings in milliseconds.
    pub ping_interval_ms: u64,
    /// Disconnect a client after this long without a pong, in milliseconds.
    pub pong_timeout_ms: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
    /// Outbound messages buffered per connection before drops begin.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            path: "/call".to_string(),
            max_connections: 1000,
            ping_interval_ms: 30_000,
            pong_timeout_ms: 60_000,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` takes precedence).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AirCallSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if !server.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.path must start with '/', got {:?}",
                server.path
            )));
        }
        if server.path == "/health" {
            return Err(SettingsError::InvalidValue(
                "server.path collides with /health".to_string(),
            ));
        }
        if server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".to_string(),
            ));
        }
        if server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".to_string(),
            ));
        }
        if server.ping_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.pingIntervalMs must be positive".to_string(),
            ));
        }
        if server.pong_timeout_ms < server.ping_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "server.pongTimeoutMs ({}) is shorter than server.pingIntervalMs ({})",
                server.pong_timeout_ms, server.ping_interval_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 5000);
        assert_eq!(s.path, "/call");
        assert_eq!(s.max_connections, 1000);
        assert_eq!(s.ping_interval_ms, 30_000);
        assert_eq!(s.pong_timeout_ms, 60_000);
        assert!(!LoggingSettings::default().json);
    }

    #[test]
    fn camel_case_keys() {
        let v = serde_json::to_value(AirCallSettings::default()).unwrap();
        assert!(v["server"]["maxConnections"].is_number());
        assert!(v["server"]["pingIntervalMs"].is_number());
        assert!(v["server"]["sendQueueCapacity"].is_number());
    }

    #[test]
    fn partial_object_fills_defaults() {
        let s: ServerSettings = serde_json::from_str(r#"{"port": 7000}"#).unwrap();
        assert_eq!(s.port, 7000);
        assert_eq!(s.path, "/call");
    }

    #[test]
    fn path_must_be_absolute() {
        let mut settings = AirCallSettings::default();
        settings.server.path = "call".into();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn path_cannot_shadow_health() {
        let mut settings = AirCallSettings::default();
        settings.server.path = "/health".into();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn zero_connections_rejected() {
        let mut settings = AirCallSettings::default();
        settings.server.max_connections = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn pong_timeout_shorter_than_ping_rejected() {
        let mut settings = AirCallSettings::default();
        settings.server.ping_interval_ms = 10_000;
        settings.server.pong_timeout_ms = 5_000;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("pongTimeoutMs"));
    }
}
