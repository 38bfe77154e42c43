//! Ed25519 request signing
//!
//! Every authenticated call carries a signature over a canonical string:
//!
//! ```text
//! instruction=<name>[&k1=v1&k2=v2...]&timestamp=<millis>&window=<window>
//! ```
//!
//! Parameters are sorted by key, null values are dropped and booleans are
//! written as `true` / `false`. The signature is base64 encoded.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signer as _, SigningKey, SECRET_KEY_LENGTH};
use log::debug;

use crate::consts::{
    HEADER_API_KEY, HEADER_SIGNATURE, HEADER_TIMESTAMP, HEADER_WINDOW, JSON_CONTENT_TYPE,
};
use crate::errors::{Error, Result};
use crate::types::{render_value, Instruction, Params};

/// Authentication headers for one request
#[derive(Debug, Clone, PartialEq)]
pub struct AuthHeaders {
    pub api_key: String,
    pub signature: String,
    pub timestamp: i64,
    pub window: String,
}

impl AuthHeaders {
    /// Header name/value pairs, including the JSON content type
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_API_KEY, self.api_key.clone()),
            (HEADER_SIGNATURE, self.signature.clone()),
            (HEADER_TIMESTAMP, self.timestamp.to_string()),
            (HEADER_WINDOW, self.window.clone()),
            ("Content-Type", JSON_CONTENT_TYPE.to_string()),
        ]
    }
}

/// Build the string that gets signed
pub fn canonical_string(
    instruction: Instruction,
    params: Option<&Params>,
    timestamp: i64,
    window: &str,
) -> String {
    let mut out = format!("instruction={instruction}");

    if let Some(params) = params {
        let mut pairs: Vec<(&String, String)> = params
            .iter()
            .filter_map(|(k, v)| render_value(v).map(|v| (k, v)))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        if !pairs.is_empty() {
            let joined = pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            out.push('&');
            out.push_str(&joined);
        }
    }

    out.push_str(&format!("&timestamp={timestamp}&window={window}"));
    out
}

/// Holds the API key and the Ed25519 key used to sign requests
pub struct RequestSigner {
    api_key: String,
    signing_key: SigningKey,
    window: String,
}

impl RequestSigner {
    pub fn new(
        api_key: impl Into<String>,
        signing_key: SigningKey,
        window: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            signing_key,
            window: window.into(),
        }
    }

    /// Build a signer from a base64 secret.
    ///
    /// Accepts a 32-byte seed or a 64-byte keypair (seed followed by public key).
    pub fn from_base64_secret(
        api_key: impl Into<String>,
        secret: &str,
        window: impl Into<String>,
    ) -> Result<Self> {
        let bytes = STANDARD.decode(secret.trim())?;
        let signing_key = match bytes.len() {
            SECRET_KEY_LENGTH => {
                let mut seed = [0u8; SECRET_KEY_LENGTH];
                seed.copy_from_slice(&bytes);
                SigningKey::from_bytes(&seed)
            }
            64 => {
                let mut keypair = [0u8; 64];
                keypair.copy_from_slice(&bytes);
                SigningKey::from_keypair_bytes(&keypair)
                    .map_err(|e| Error::InvalidSecret(e.to_string()))?
            }
            n => {
                return Err(Error::InvalidSecret(format!(
                    "expected 32 or 64 key bytes, got {n}"
                )))
            }
        };
        Ok(Self::new(api_key, signing_key, window))
    }

    pub fn window(&self) -> &str {
        &self.window
    }

    /// Sign with a fresh timestamp
    pub fn sign(&self, instruction: Instruction, params: Option<&Params>) -> AuthHeaders {
        self.sign_at(instruction, params, chrono::Utc::now().timestamp_millis())
    }

    /// Sign with an explicit timestamp
    pub fn sign_at(
        &self,
        instruction: Instruction,
        params: Option<&Params>,
        timestamp: i64,
    ) -> AuthHeaders {
        let message = canonical_string(instruction, params, timestamp, &self.window);
        debug!("Sign string: {message}");

        let signature = self.signing_key.sign(message.as_bytes());

        AuthHeaders {
            api_key: self.api_key.clone(),
            signature: STANDARD.encode(signature.to_bytes()),
            timestamp,
            window: self.window.clone(),
        }
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("api_key", &self.api_key)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
