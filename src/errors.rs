use thiserror::Error;

/// Errors produced by the signing, dispatch and order layers
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid API secret: {0}")]
    InvalidSecret(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("API error [{status}]: {body}")]
    Api { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(String),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::InvalidSecret(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;
