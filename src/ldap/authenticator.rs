//! LDAP bind authentication.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::config::LdapConfig;
use super::connection::{
    BindStatus, DirectoryConnection, DirectoryConnector, DirectoryEntry, Ldap3Connector,
};
use crate::authenticator::CredentialValidator;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::types::{required_credential, AuthMethod, AuthResult, Credentials};

const SEARCH_ATTRIBUTES: [&str; 3] = ["dn", "cn", "mail"];

struct LdapRequest<'a> {
    username: &'a str,
    password: &'a str,
}

impl<'a> LdapRequest<'a> {
    fn from_credentials(credentials: &'a Credentials) -> Result<Self, AuthError> {
        let username = required_credential(credentials, "username")?;
        // An empty simple bind is an anonymous bind, not a credential check.
        let password = credentials
            .get("password")
            .map(String::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AuthError::Input("missing required credential 'password'".to_string()))?;
        Ok(Self { username, password })
    }
}

/// Authenticates a user by binding to the directory as them.
#[derive(Debug, Default, Clone)]
pub struct LdapAuthenticator<C = Ldap3Connector> {
    connector: C,
}

impl LdapAuthenticator<Ldap3Connector> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: DirectoryConnector> LdapAuthenticator<C> {
    pub fn with_connector(connector: C) -> Self {
        Self { connector }
    }

    /// Bind as `username` and look up their directory entry.
    ///
    /// The connection is closed on every path out of this function,
    /// including cancellation of a pending bind or search.
    pub async fn authenticate_user(
        &self,
        ctx: &RequestContext,
        config: &LdapConfig,
        username: &str,
        password: &str,
    ) -> Result<AuthResult, AuthError> {
        config.validate().map_err(AuthError::Configuration)?;

        let mut conn = ctx
            .guard("LDAP connect", self.connector.connect(config))
            .await?;

        let outcome = self
            .bind_and_lookup(ctx, config, &mut conn, username, password)
            .await;
        conn.close().await;

        match &outcome {
            Ok(result) => info!(user_dn = %result.user_id, "LDAP authentication succeeded"),
            Err(e) => debug!(error = %e, "LDAP authentication failed"),
        }
        outcome
    }

    async fn bind_and_lookup(
        &self,
        ctx: &RequestContext,
        config: &LdapConfig,
        conn: &mut C::Connection,
        username: &str,
        password: &str,
    ) -> Result<AuthResult, AuthError> {
        if !config.bind_dn.is_empty() {
            let status = ctx
                .guard(
                    "LDAP service bind",
                    conn.simple_bind(&config.bind_dn, config.bind_pass.expose_secret()),
                )
                .await?;
            if let BindStatus::Rejected { code, message } = status {
                warn!(bind_dn = %config.bind_dn, code, "LDAP service bind rejected");
                return Err(AuthError::protocol(
                    "LDAP service bind",
                    format!("rejected with result code {} ({})", code, message),
                ));
            }
        }

        let user_dn = config.user_dn(username);
        debug!(user_dn = %user_dn, "Binding as user");

        let status = ctx
            .guard("LDAP bind", conn.simple_bind(&user_dn, password))
            .await?;
        if let BindStatus::Rejected { code, .. } = status {
            debug!(user_dn = %user_dn, code, "LDAP user bind rejected");
            return Err(AuthError::Validation("invalid directory credentials".to_string()));
        }

        let filter = config.user_filter(username);
        let entries = ctx
            .guard(
                "LDAP search",
                conn.search(&config.base_dn, &filter, &SEARCH_ATTRIBUTES),
            )
            .await?;

        let entry = entries.into_iter().next().ok_or_else(|| {
            AuthError::NotFound(format!("no directory entry matches {}", filter))
        })?;

        Ok(entry_to_result(entry))
    }
}

fn entry_to_result(entry: DirectoryEntry) -> AuthResult {
    let user_name = entry.first("cn").unwrap_or_default().to_string();
    let email = entry.first("mail").unwrap_or_default().to_string();

    let mut attributes: HashMap<String, String> = entry
        .attrs
        .iter()
        .filter_map(|(name, values)| values.first().map(|v| (name.clone(), v.clone())))
        .collect();
    attributes.insert("dn".to_string(), entry.dn.clone());

    AuthResult::verified(entry.dn, user_name, email, attributes)
}

#[async_trait]
impl<C: DirectoryConnector> CredentialValidator for LdapAuthenticator<C> {
    type Config = LdapConfig;

    fn method(&self) -> AuthMethod {
        AuthMethod::Ldap
    }

    async fn validate(
        &self,
        ctx: &RequestContext,
        config: &LdapConfig,
        credentials: &Credentials,
    ) -> Result<AuthResult, AuthError> {
        let request = LdapRequest::from_credentials(credentials)?;
        self.authenticate_user(ctx, config, request.username, request.password)
            .await
    }
}
