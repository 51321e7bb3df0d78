//! Credential validation capability and the method dispatcher.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::jwt::JwtVerifier;
use crate::ldap::{DirectoryConnector, Ldap3Connector, LdapAuthenticator};
use crate::oauth2::OAuth2Exchanger;
use crate::saml::SamlValidator;
use crate::types::{AuthMethod, AuthResult, Credentials};

/// One authentication backend.
///
/// `validate` returns `Ok` only after the backend has proven the
/// identity; every failure is an [`AuthError`].
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    type Config: Send + Sync;

    fn method(&self) -> AuthMethod;

    async fn validate(
        &self,
        ctx: &RequestContext,
        config: &Self::Config,
        credentials: &Credentials,
    ) -> Result<AuthResult, AuthError>;
}

/// Routes each request to the backend selected by its config.
///
/// Holds no per-request state; one instance can serve any number of
/// concurrent calls.
#[derive(Debug, Clone)]
pub struct MultiAuthenticator<C = Ldap3Connector> {
    oauth2: OAuth2Exchanger,
    saml: SamlValidator,
    ldap: LdapAuthenticator<C>,
    jwt: JwtVerifier,
}

impl MultiAuthenticator<Ldap3Connector> {
    pub fn new() -> Result<Self, AuthError> {
        Ok(Self {
            oauth2: OAuth2Exchanger::new()?,
            saml: SamlValidator::new(),
            ldap: LdapAuthenticator::new(),
            jwt: JwtVerifier::new(),
        })
    }
}

impl<C: DirectoryConnector> MultiAuthenticator<C> {
    /// Replace the directory connector (e.g. with a pooled or test one).
    pub fn with_directory_connector<D: DirectoryConnector>(
        self,
        connector: D,
    ) -> MultiAuthenticator<D> {
        MultiAuthenticator {
            oauth2: self.oauth2,
            saml: self.saml,
            ldap: LdapAuthenticator::with_connector(connector),
            jwt: self.jwt,
        }
    }

    /// Use a preconfigured HTTP client for OAuth2 calls.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.oauth2 = OAuth2Exchanger::with_client(client);
        self
    }

    /// Authenticate with no deadline and no external cancellation.
    pub async fn authenticate(
        &self,
        config: &AuthConfig,
        credentials: &Credentials,
    ) -> Result<AuthResult, AuthError> {
        self.authenticate_with_context(&RequestContext::new(), config, credentials)
            .await
    }

    pub async fn authenticate_with_context(
        &self,
        ctx: &RequestContext,
        config: &AuthConfig,
        credentials: &Credentials,
    ) -> Result<AuthResult, AuthError> {
        let method = config.method();
        debug!(method = %method, credentials = credentials.len(), "Dispatching authentication");

        config.ensure_enabled()?;

        let outcome = match config {
            AuthConfig::OAuth2(c) => self.oauth2.validate(ctx, c, credentials).await,
            AuthConfig::Saml(c) => self.saml.validate(ctx, c, credentials).await,
            AuthConfig::Ldap(c) => self.ldap.validate(ctx, c, credentials).await,
            AuthConfig::Jwt(c) => self.jwt.validate(ctx, c, credentials).await,
            AuthConfig::ApiKey => Err(AuthError::UnsupportedMethod(method.to_string())),
        };

        match &outcome {
            Ok(result) => info!(method = %method, user_id = %result.user_id, "Authentication succeeded"),
            Err(e) => warn!(method = %method, kind = %e.kind(), error = %e, "Authentication failed"),
        }
        outcome
    }
}
