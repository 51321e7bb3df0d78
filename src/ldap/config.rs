//! LDAP directory configuration.

use secrecy::SecretString;
use serde::Deserialize;

use crate::config::{default_timeout_secs, default_true};

/// LDAP bind authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LdapConfig {
    /// Enable LDAP authentication.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory host name.
    #[serde(default)]
    pub server: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base DN for user DNs and the user search.
    #[serde(default)]
    pub base_dn: String,

    /// Service account DN. Empty means no service bind.
    #[serde(default)]
    pub bind_dn: String,

    /// Service account password.
    #[serde(default = "default_bind_pass")]
    pub bind_pass: SecretString,

    /// Naming attribute for user DNs and the search filter.
    ///
    /// When unset, user DNs use `uid` if `bind_dn` is set and `cn`
    /// otherwise, and the search filter matches on `uid`.
    #[serde(default)]
    pub user_attribute: Option<String>,

    /// Connect with `ldaps://`.
    #[serde(default)]
    pub use_tls: bool,

    /// Connect and per-operation timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    389
}

fn default_bind_pass() -> SecretString {
    SecretString::new(String::new())
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server: String::new(),
            port: default_port(),
            base_dn: String::new(),
            bind_dn: String::new(),
            bind_pass: default_bind_pass(),
            user_attribute: None,
            use_tls: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LdapConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.is_empty() {
            return Err("LDAP server is required".to_string());
        }

        if self.port == 0 {
            return Err("LDAP port must be non-zero".to_string());
        }

        if self.base_dn.is_empty() {
            return Err("LDAP base_dn is required".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("LDAP timeout_secs must be non-zero".to_string());
        }

        Ok(())
    }

    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.server, self.port)
    }

    fn explicit_user_attribute(&self) -> Option<&str> {
        self.user_attribute.as_deref().filter(|a| !a.is_empty())
    }

    /// Attribute naming the user's RDN.
    pub fn naming_attribute(&self) -> &str {
        match self.explicit_user_attribute() {
            Some(attr) => attr,
            None if !self.bind_dn.is_empty() => "uid",
            None => "cn",
        }
    }

    /// DN to bind as for `username`, with the username DN-escaped.
    pub fn user_dn(&self, username: &str) -> String {
        format!(
            "{}={},{}",
            self.naming_attribute(),
            ldap3::dn_escape(username),
            self.base_dn
        )
    }

    /// Person search filter for `username`, with the username filter-escaped.
    pub fn user_filter(&self, username: &str) -> String {
        format!(
            "(&(objectClass=person)({}={}))",
            self.explicit_user_attribute().unwrap_or("uid"),
            ldap3::ldap_escape(username)
        )
    }
}
