//! Signed JWT verification configuration.

use serde::Deserialize;

use crate::config::default_true;

/// JWT verification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Enable JWT authentication.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Token issuer (iss claim). Must match exactly.
    #[serde(default)]
    pub issuer: String,

    /// Audience that the aud claim must contain.
    #[serde(default)]
    pub audience: String,

    /// PEM-encoded RSA public key (SPKI or PKCS#1).
    #[serde(default)]
    pub key: String,

    /// Clock skew tolerance in seconds for exp/nbf validation.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,
}

fn default_clock_skew() -> u64 {
    30 // 30 seconds
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            issuer: String::new(),
            audience: String::new(),
            key: String::new(),
            clock_skew_secs: default_clock_skew(),
        }
    }
}

impl JwtConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.issuer.is_empty() {
            return Err("JWT issuer is required".to_string());
        }

        if self.audience.is_empty() {
            return Err("JWT audience is required".to_string());
        }

        if self.key.trim().is_empty() {
            return Err("JWT public key is required".to_string());
        }

        Ok(())
    }
}
