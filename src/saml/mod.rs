//! SAML 2.0 Web Browser SSO, service-provider side.
//!
//! Validates signed responses posted to the ACS endpoint and builds
//! redirect-binding AuthnRequests for SP-initiated login.

mod c14n;
pub mod config;
mod signature;
pub mod request;
pub mod validator;

pub use config::SamlConfig;
pub use request::generate_auth_url;
pub use validator::SamlValidator;
