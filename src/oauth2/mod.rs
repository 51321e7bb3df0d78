//! OAuth2 authorization-code authentication.
//!
//! Exchanges a code at the provider's token endpoint, then resolves the
//! user from its user-info endpoint through a per-provider field mapping.

pub mod config;
pub mod exchanger;
pub mod providers;

pub use config::OAuth2Config;
pub use exchanger::{authorization_url, OAuth2Exchanger};
pub use providers::{FieldMapping, OAuth2Provider};
