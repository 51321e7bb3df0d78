//! Unified authentication verifier.
//!
//! One entry point, [`authenticate`], checks caller-supplied credentials
//! against one of four protocols and returns a normalized [`AuthResult`]:
//!
//! - OAuth2 authorization-code exchange plus user-info lookup
//! - SAML 2.0 Web SSO response validation (XML-DSig, conditions)
//! - LDAP simple bind, then a directory search for the user entry
//! - RSA-signed JWT verification
//!
//! The protocol is chosen by the [`AuthConfig`] variant. Configuration is
//! passed per call and never stored, so a single [`MultiAuthenticator`]
//! can serve concurrent requests for different tenants.

pub mod authenticator;
pub mod config;
pub mod context;
pub mod error;
pub mod jwt;
pub mod ldap;
pub mod oauth2;
pub mod saml;
pub mod types;

#[cfg(test)]
mod test_support;

pub use authenticator::{CredentialValidator, MultiAuthenticator};
pub use config::AuthConfig;
pub use context::RequestContext;
pub use error::{AuthError, CancelReason, ErrorKind};
pub use jwt::JwtConfig;
pub use ldap::LdapConfig;
pub use oauth2::{OAuth2Config, OAuth2Provider};
pub use saml::SamlConfig;
pub use types::{AuthMethod, AuthResult, Credentials};

/// Authenticate `credentials` with the method selected by `config`.
pub async fn authenticate(
    config: &AuthConfig,
    credentials: &Credentials,
) -> Result<AuthResult, AuthError> {
    authenticate_with_context(&RequestContext::new(), config, credentials).await
}

/// Like [`authenticate`], bounded by the caller's cancellation and deadline.
pub async fn authenticate_with_context(
    ctx: &RequestContext,
    config: &AuthConfig,
    credentials: &Credentials,
) -> Result<AuthResult, AuthError> {
    MultiAuthenticator::new()?
        .authenticate_with_context(ctx, config, credentials)
        .await
}

/// Build the IdP redirect URL for SP-initiated SAML login.
pub fn generate_saml_auth_url(config: &SamlConfig, relay_state: &str) -> Result<String, AuthError> {
    saml::generate_auth_url(config, relay_state)
}
