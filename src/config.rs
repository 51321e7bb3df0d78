//! Per-call authentication configuration.

use serde::Deserialize;

use crate::error::AuthError;
use crate::jwt::JwtConfig;
use crate::ldap::LdapConfig;
use crate::oauth2::OAuth2Config;
use crate::saml::SamlConfig;
use crate::types::AuthMethod;

/// Configuration for one authentication attempt, keyed by method.
///
/// Deserializes from an internally tagged object, e.g.
/// `{"method": "ldap", "server": "ldap.example.com", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method")]
pub enum AuthConfig {
    #[serde(rename = "oauth2")]
    OAuth2(OAuth2Config),
    #[serde(rename = "saml")]
    Saml(SamlConfig),
    #[serde(rename = "ldap")]
    Ldap(LdapConfig),
    #[serde(rename = "jwt_token", alias = "jwt")]
    Jwt(JwtConfig),
    #[serde(rename = "api_key")]
    ApiKey,
}

impl AuthConfig {
    pub fn method(&self) -> AuthMethod {
        match self {
            AuthConfig::OAuth2(_) => AuthMethod::OAuth2,
            AuthConfig::Saml(_) => AuthMethod::Saml,
            AuthConfig::Ldap(_) => AuthMethod::Ldap,
            AuthConfig::Jwt(_) => AuthMethod::Jwt,
            AuthConfig::ApiKey => AuthMethod::ApiKey,
        }
    }

    /// Check that the selected method has a backend and is enabled.
    ///
    /// Field-level checks are left to the backend, which runs them after
    /// reading its credentials.
    pub fn ensure_enabled(&self) -> Result<(), AuthError> {
        let enabled = match self {
            AuthConfig::OAuth2(c) => c.enabled,
            AuthConfig::Saml(c) => c.enabled,
            AuthConfig::Ldap(c) => c.enabled,
            AuthConfig::Jwt(c) => c.enabled,
            AuthConfig::ApiKey => {
                return Err(AuthError::UnsupportedMethod(AuthMethod::ApiKey.to_string()))
            }
        };

        if !enabled {
            return Err(AuthError::Configuration(format!(
                "{} authentication is not enabled",
                self.method()
            )));
        }
        Ok(())
    }

    /// Check that the selected method is enabled and structurally valid.
    pub fn validate(&self) -> Result<(), AuthError> {
        self.ensure_enabled()?;

        let checked = match self {
            AuthConfig::OAuth2(c) => c.validate(),
            AuthConfig::Saml(c) => c.validate(),
            AuthConfig::Ldap(c) => c.validate(),
            AuthConfig::Jwt(c) => c.validate(),
            AuthConfig::ApiKey => Ok(()),
        };
        checked.map_err(AuthError::Configuration)
    }
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_timeout_secs() -> u64 {
    10
}
