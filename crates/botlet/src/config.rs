//! Environment-driven configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `BOT_FILE_PATH` | unset (offers fail with "No bot file specified") |
//! | `BOTLET_HOST` | `localhost` |
//! | `BOTLET_PORT` | `7860` |
//! | `BOTLET_ICE_SERVERS` | `stun:stun.l.google.com:19302` |
//!
//! A `.env` file in the working directory is applied first when present.

use std::path::PathBuf;

use crate::transport::ServerConfig;

pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct BotletConfig {
    /// Bot library to load. Checked per request, not at startup.
    pub bot_path: Option<PathBuf>,
    pub server: ServerConfig,
    pub ice_servers: Vec<String>,
}

impl Default for BotletConfig {
    fn default() -> Self {
        Self {
            bot_path: None,
            server: ServerConfig::default(),
            ice_servers: vec![DEFAULT_ICE_SERVER.to_string()],
        }
    }
}

impl BotletConfig {
    /// Read configuration from the process environment, after `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv_override() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.bot_path = lookup("BOT_FILE_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        if let Some(host) = lookup("BOTLET_HOST").filter(|host| !host.is_empty()) {
            config.server.host = host;
        }

        if let Some(port) = lookup("BOTLET_PORT") {
            config.server.port = port.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    var: "BOTLET_PORT",
                    value: port.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(servers) = lookup("BOTLET_ICE_SERVERS") {
            config.ice_servers = servers
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }
}
