//! Known OAuth2 providers and user-info field mappings.

use serde::{Deserialize, Serialize};

/// Provider presets, selected by the `provider` config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuth2Provider {
    Google,
    Microsoft,
    Github,
}

/// Endpoints and field mapping for a known provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPreset {
    pub auth_url: &'static str,
    pub token_url: &'static str,
    pub userinfo_url: &'static str,
    pub field_mapping: FieldMapping,
}

impl OAuth2Provider {
    pub fn preset(self) -> ProviderPreset {
        match self {
            OAuth2Provider::Google => ProviderPreset {
                auth_url: "https://accounts.google.com/o/oauth2/auth",
                token_url: "https://oauth2.googleapis.com/token",
                userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo",
                field_mapping: FieldMapping::new(&["id"], &["name"], &["email"]),
            },
            OAuth2Provider::Microsoft => ProviderPreset {
                auth_url: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
                token_url: "https://login.microsoftonline.com/common/oauth2/v2.0/token",
                userinfo_url: "https://graph.microsoft.com/v1.0/me",
                field_mapping: FieldMapping::new(
                    &["id"],
                    &["displayName"],
                    &["mail", "userPrincipalName"],
                ),
            },
            OAuth2Provider::Github => ProviderPreset {
                auth_url: "https://github.com/login/oauth/authorize",
                token_url: "https://github.com/login/oauth/access_token",
                userinfo_url: "https://api.github.com/user",
                field_mapping: FieldMapping::new(&["id"], &["name", "login"], &["email"]),
            },
        }
    }
}

/// Which user-info fields populate the promoted result fields.
///
/// Each list is tried in order; the first present, non-empty scalar wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub user_id: Vec<String>,
    #[serde(default)]
    pub user_name: Vec<String>,
    #[serde(default)]
    pub email: Vec<String>,
}

impl FieldMapping {
    fn new(user_id: &[&str], user_name: &[&str], email: &[&str]) -> Self {
        fn owned(fields: &[&str]) -> Vec<String> {
            fields.iter().map(|f| f.to_string()).collect()
        }

        Self {
            user_id: owned(user_id),
            user_name: owned(user_name),
            email: owned(email),
        }
    }

    /// OpenID Connect UserInfo claims.
    pub fn openid() -> Self {
        Self::new(&["sub", "id"], &["name", "preferred_username"], &["email"])
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::openid()
    }
}

/// Render a scalar JSON value as a string. Numeric ids (GitHub) become
/// their decimal form; objects, arrays and nulls yield `None`.
pub(crate) fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First non-empty scalar among `candidates`.
pub(crate) fn first_field(
    payload: &serde_json::Map<String, serde_json::Value>,
    candidates: &[String],
) -> Option<String> {
    candidates
        .iter()
        .filter_map(|name| payload.get(name))
        .filter_map(scalar_to_string)
        .find(|s| !s.is_empty())
}
