//! LDAP bind authentication.

pub mod authenticator;
pub mod config;
pub mod connection;

pub use authenticator::LdapAuthenticator;
pub use config::LdapConfig;
pub use connection::{
    BindStatus, DirectoryConnection, DirectoryConnector, DirectoryEntry, Ldap3Connector,
};
