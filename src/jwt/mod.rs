//! Signed JWT authentication.
//!
//! Verifies compact RSA-signed tokens against a configured public key and
//! validates issuer, audience and validity window.

pub mod config;
pub mod verifier;

pub use config::JwtConfig;
pub use verifier::JwtVerifier;
