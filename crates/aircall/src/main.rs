//! # aircall
//!
//! AirCall signaling server binary: loads settings, installs logging and
//! serves the room WebSocket until ctrl-c.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;

use aircall_server::config::ServerConfig;
use aircall_server::server::AirCallServer;
use aircall_settings::{AirCallSettings, load_settings_from_path, settings_path};
use anyhow::{Context, Result};
use clap::Parser;

/// AirCall signaling server.
#[derive(Parser, Debug)]
#[command(name = "aircall", about = "Signaling server for multi-party call rooms")]
struct Cli {
    /// Settings file (defaults to `~/.aircall/settings.json`).
    #[arg(long, env = "AIRCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// WebSocket route (overrides settings).
    #[arg(long)]
    path: Option<String>,

    /// Maximum concurrent connections (overrides settings).
    #[arg(long)]
    max_connections: Option<usize>,

    /// Log filter directive, e.g. `debug` or `aircall_core=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Apply flags on top of file and environment settings.
    fn apply_to(&self, settings: &mut AirCallSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref path) = self.path {
            settings.server.path.clone_from(path);
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<AirCallSettings> {
    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply_to(&mut settings);
    settings
        .validate()
        .context("Invalid command-line overrides")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let server = AirCallServer::new(ServerConfig::from(&settings.server));
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        "AirCall listening on ws://{addr}{} ({} RPC methods registered)",
        server.config().path,
        server.registry().methods().len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(vec![handle], None).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["aircall"]);
        let mut settings = AirCallSettings::default();
        cli.apply_to(&mut settings);
        assert_eq!(settings, AirCallSettings::default());
    }

    #[test]
    fn cli_overrides_apply() {
        let cli = Cli::parse_from([
            "aircall",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--path",
            "/signal",
            "--max-connections",
            "5",
            "--log-level",
            "debug",
            "--log-json",
        ]);
        let mut settings = AirCallSettings::default();
        cli.apply_to(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.path, "/signal");
        assert_eq!(settings.server.max_connections, 5);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["aircall", "--config", "/tmp/aircall.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/aircall.json")));
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["aircall", "--port", "70000"]).is_err());
    }

    #[test]
    fn settings_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 7000, "path": "/rooms"}}"#).unwrap();

        let cli = Cli::parse_from([
            "aircall",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "7001",
        ]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.server.port, 7001);
        assert_eq!(settings.server.path, "/rooms");
    }

    #[test]
    fn invalid_override_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let cli = Cli::parse_from([
            "aircall",
            "--config",
            path.to_str().unwrap(),
            "--path",
            "/health",
        ]);
        let err = load_settings(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("/health"));
    }
}
