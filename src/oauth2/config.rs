//! OAuth2 authorization-code configuration.

use secrecy::SecretString;
use serde::Deserialize;

use super::providers::{FieldMapping, OAuth2Provider};
use crate::config::{default_timeout_secs, default_true};

/// OAuth 2.0 authorization-code client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Config {
    /// Enable OAuth2 authentication.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Known provider preset (google, microsoft, github).
    #[serde(default)]
    pub provider: Option<OAuth2Provider>,

    #[serde(default)]
    pub client_id: String,

    /// Client secret, sent with `client_secret_post`.
    #[serde(default = "default_client_secret")]
    pub client_secret: SecretString,

    /// Redirect URI registered with the provider.
    #[serde(default)]
    pub redirect_url: String,

    #[serde(default)]
    pub scopes: Vec<String>,

    /// Authorization endpoint. Overrides the preset when set.
    #[serde(default)]
    pub auth_url: String,

    /// Token endpoint. Overrides the preset when set.
    #[serde(default)]
    pub token_url: String,

    /// User-info endpoint. Overrides the preset when set; without either
    /// the Google user-info endpoint is used.
    #[serde(default)]
    pub userinfo_url: String,

    /// User-info field mapping. Overrides the preset when set.
    #[serde(default)]
    pub field_mapping: Option<FieldMapping>,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// User-info endpoint used when neither a preset nor `userinfo_url` names one.
const DEFAULT_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

fn default_client_secret() -> SecretString {
    SecretString::new(String::new())
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: None,
            client_id: String::new(),
            client_secret: default_client_secret(),
            redirect_url: String::new(),
            scopes: Vec::new(),
            auth_url: String::new(),
            token_url: String::new(),
            userinfo_url: String::new(),
            field_mapping: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Endpoints and mapping after applying preset and overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub field_mapping: FieldMapping,
}

impl OAuth2Config {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.is_empty() {
            return Err("OAuth2 client_id is required".to_string());
        }

        if self.redirect_url.is_empty() {
            return Err("OAuth2 redirect_url is required".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("OAuth2 timeout_secs must be non-zero".to_string());
        }

        let endpoints = self.endpoints()?;
        for (name, url) in [
            ("auth_url", &endpoints.auth_url),
            ("token_url", &endpoints.token_url),
            ("userinfo_url", &endpoints.userinfo_url),
        ] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(format!("OAuth2 {} must be a valid HTTP(S) URL", name));
            }
        }

        Ok(())
    }

    /// Resolve endpoints: explicit fields win over the provider preset.
    pub fn endpoints(&self) -> Result<ResolvedEndpoints, String> {
        let preset = self.provider.map(OAuth2Provider::preset);

        let pick = |explicit: &str, preset_value: Option<&'static str>, name: &str| {
            if !explicit.is_empty() {
                Ok(explicit.to_string())
            } else {
                preset_value
                    .map(String::from)
                    .ok_or_else(|| format!("OAuth2 {} is required without a provider preset", name))
            }
        };

        Ok(ResolvedEndpoints {
            auth_url: pick(&self.auth_url, preset.as_ref().map(|p| p.auth_url), "auth_url")?,
            token_url: pick(&self.token_url, preset.as_ref().map(|p| p.token_url), "token_url")?,
            userinfo_url: pick(
                &self.userinfo_url,
                Some(
                    preset
                        .as_ref()
                        .map_or(DEFAULT_USERINFO_URL, |p| p.userinfo_url),
                ),
                "userinfo_url",
            )?,
            field_mapping: self
                .field_mapping
                .clone()
                .or_else(|| preset.map(|p| p.field_mapping))
                .unwrap_or_default(),
        })
    }
}
