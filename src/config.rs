//! Process-wide settings, loaded once in `main` and handed to every task
//! and handler as shared state: explicit dependency injection in place of
//! a `lru_cache`-memoized global.

use serde::Deserialize;

use crate::error::ProxyError;

fn default_port() -> u16 {
    5500
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_network_name() -> String {
    "avalanche".to_string()
}

/// Mirrors `slasher_proxy.common.settings.SlasherRpcProxySettings`.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub dsn: String,
    pub rpc_url: String,
    #[serde(default)]
    pub blocks_channel: Option<String>,
    #[serde(default)]
    pub blocks_websocket_url: Option<String>,
    #[serde(default = "default_network_name")]
    pub network_name: String,
}

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

impl Settings {
    /// Loads settings from the process environment (after an optional
    /// `.env` file, ignored if absent), and validates the fatal
    /// fatal configuration errors.
    pub fn load() -> Result<Self, ProxyError> {
        let _ = dotenvy::dotenv();

        let settings: Settings =
            envy::from_env().map_err(|e| ProxyError::ConfigInvalid(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ProxyError> {
        if self.blocks_channel.is_some() && self.blocks_websocket_url.is_some() {
            return Err(ProxyError::ConfigInvalid(
                "BLOCKS_CHANNEL and BLOCKS_WEBSOCKET_URL cannot both be set".to_string(),
            ));
        }

        let level_upper = self.log_level.to_uppercase();
        if !VALID_LOG_LEVELS.contains(&level_upper.as_str()) {
            return Err(ProxyError::ConfigInvalid(format!(
                "invalid log level {:?}, allowed values are {:?}",
                self.log_level, VALID_LOG_LEVELS
            )));
        }

        Ok(())
    }

    /// Translates `LOG_LEVEL` into a `tracing` filter directive. CRITICAL
    /// has no tracing equivalent stricter than ERROR, so it maps there.
    pub fn tracing_filter(&self) -> &'static str {
        match self.log_level.to_uppercase().as_str() {
            "DEBUG" => "debug",
            "INFO" => "info",
            "WARNING" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
    }
}
