use config::{Config, Environment, File};
pub use config::ConfigError;
use serde::Deserialize;

use crate::consts::{DEFAULT_TIMEOUT_SECS, DEFAULT_WINDOW_MS, MAINNET_API_URL};
use crate::volume::VolumeParams;

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Settings {
    /// Network configuration (base url, window)
    #[serde(default)]
    pub network: NetworkConfig,
    /// Default parameters for volume runs
    #[serde(default)]
    pub volume: VolumeParams,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// REST base URL, endpoints are appended to it
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Signature time window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: String,
    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            window_ms: default_window_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl NetworkConfig {
    /// Base URL without a trailing slash
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn default_base_url() -> String {
    MAINNET_API_URL.to_string()
}

fn default_window_ms() -> String {
    DEFAULT_WINDOW_MS.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from an optional configuration file.
    ///
    /// A missing file is not an error. Environment variables override the
    /// file, e.g. `BACKPACK_NETWORK__BASE_URL=...`.
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix("BACKPACK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }
}

/// API key and base64 Ed25519 secret
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl Credentials {
    pub fn new(api_key: Option<String>, api_secret: Option<String>) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Read `BACKPACK_API_KEY` and `BACKPACK_API_SECRET` from the environment
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("BACKPACK_API_KEY").ok(),
            std::env::var("BACKPACK_API_SECRET").ok(),
        )
    }

    pub fn api_key(&self) -> Option<&str> {
        non_empty(&self.api_key)
    }

    pub fn api_secret(&self) -> Option<&str> {
        non_empty(&self.api_secret)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key())
            .field("api_secret", &self.api_secret().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::new("definitely_missing_config_file").unwrap();
        assert_eq!(settings.network.window_ms, "5000");
        assert_eq!(settings.network.timeout_secs, 30);
        assert_eq!(settings.log.level, "info");
        assert_eq!(settings.volume.symbol, "SOL");
        assert_eq!(settings.volume.order_count, 1);
    }

    #[test]
    fn test_normalized_base_url() {
        let network = NetworkConfig {
            base_url: "https://api.backpack.exchange/".into(),
            ..Default::default()
        };
        assert_eq!(network.normalized_base_url(), "https://api.backpack.exchange");
    }

    #[test]
    fn test_credentials_blank_is_absent() {
        let creds = Credentials::new(Some("  ".into()), Some("abc".into()));
        assert!(creds.api_key().is_none());
        assert_eq!(creds.api_secret(), Some("abc"));
        assert!(!format!("{creds:?}").contains("abc"));
    }
}
