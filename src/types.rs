//! Shared request and result types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AuthError;

/// Caller-supplied credential map. Required keys depend on the method;
/// unknown keys are ignored.
pub type Credentials = HashMap<String, String>;

/// Authentication method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[serde(rename = "oauth2")]
    OAuth2,
    Saml,
    Ldap,
    #[serde(rename = "jwt_token", alias = "jwt")]
    Jwt,
    /// Reserved. No backend implements it.
    ApiKey,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::OAuth2 => write!(f, "oauth2"),
            AuthMethod::Saml => write!(f, "saml"),
            AuthMethod::Ldap => write!(f, "ldap"),
            AuthMethod::Jwt => write!(f, "jwt_token"),
            AuthMethod::ApiKey => write!(f, "api_key"),
        }
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oauth2" => Ok(AuthMethod::OAuth2),
            "saml" => Ok(AuthMethod::Saml),
            "ldap" => Ok(AuthMethod::Ldap),
            "jwt" | "jwt_token" => Ok(AuthMethod::Jwt),
            "api_key" => Ok(AuthMethod::ApiKey),
            other => Err(AuthError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Normalized identity returned by every backend.
///
/// `valid` is only ever `true`: a failed check is an [`AuthError`], never
/// a result with `valid: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    pub user_id: String,
    pub user_name: String,
    pub email: String,
    /// Provider-supplied claims/attributes, including the promoted ones.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl AuthResult {
    /// Build a result for an identity whose proof has already succeeded.
    pub(crate) fn verified(
        user_id: String,
        user_name: String,
        email: String,
        attributes: HashMap<String, String>,
    ) -> Self {
        Self {
            user_id,
            user_name,
            email,
            attributes,
            valid: true,
            access_token: None,
        }
    }

    pub(crate) fn with_access_token(mut self, token: String) -> Self {
        self.access_token = Some(token);
        self
    }
}

/// Fetch a required credential. Absent, empty and whitespace-only values
/// are all treated as missing.
pub(crate) fn required_credential<'a>(
    credentials: &'a Credentials,
    key: &str,
) -> Result<&'a str, AuthError> {
    match credentials.get(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.as_str()),
        _ => Err(AuthError::Input(format!("missing required credential '{}'", key))),
    }
}
