use std::time::Duration;

pub const MAINNET_API_URL: &str = "https://api.backpack.exchange";
pub const DEFAULT_WINDOW_MS: &str = "5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Positions smaller than this (in absolute size) are already flat
pub const FLATTEN_EPSILON: f64 = 0.0001;

/// Upper bound on how long a paused run waits between flag checks
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) const SPOT_SUFFIX: &str = "_USDC";
pub(crate) const PERP_SUFFIX: &str = "_USDC_PERP";

pub(crate) const HEADER_API_KEY: &str = "X-API-Key";
pub(crate) const HEADER_SIGNATURE: &str = "X-Signature";
pub(crate) const HEADER_TIMESTAMP: &str = "X-Timestamp";
pub(crate) const HEADER_WINDOW: &str = "X-Window";
pub(crate) const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
