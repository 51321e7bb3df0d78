//! Directory access seam and its ldap3 implementation.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::config::LdapConfig;
use crate::error::AuthError;

/// Upper bound on the unbind sent when a connection is closed.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of a simple bind that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindStatus {
    Success,
    /// The server answered with a non-zero result code.
    Rejected { code: u32, message: String },
}

/// One search result entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.attrs
            .get(attr)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Opens directory connections.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    type Connection: DirectoryConnection;

    async fn connect(&self, config: &LdapConfig) -> Result<Self::Connection, AuthError>;
}

/// An open directory connection. Transport failures are `ProtocolError`s.
#[async_trait]
pub trait DirectoryConnection: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindStatus, AuthError>;

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, AuthError>;

    /// Release the connection. Never fails; problems are logged.
    async fn close(&mut self);
}

/// Production connector backed by `ldap3`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ldap3Connector;

pub struct Ldap3Connection {
    ldap: Ldap,
    driver: JoinHandle<()>,
    op_timeout: Duration,
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    type Connection = Ldap3Connection;

    async fn connect(&self, config: &LdapConfig) -> Result<Ldap3Connection, AuthError> {
        let url = config.url();
        let op_timeout = Duration::from_secs(config.timeout_secs);
        let settings = LdapConnSettings::new().set_conn_timeout(op_timeout);

        debug!(url = %url, "Connecting to LDAP server");

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| AuthError::protocol("LDAP connect", e))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver ended with error");
            }
        });

        Ok(Ldap3Connection {
            ldap,
            driver,
            op_timeout,
        })
    }
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindStatus, AuthError> {
        let result = self
            .ldap
            .with_timeout(self.op_timeout)
            .simple_bind(dn, password)
            .await
            .map_err(|e| AuthError::protocol("LDAP bind", e))?;

        if result.rc == 0 {
            Ok(BindStatus::Success)
        } else {
            Ok(BindStatus::Rejected {
                code: result.rc,
                message: result.text,
            })
        }
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, AuthError> {
        let (entries, _) = self
            .ldap
            .with_timeout(self.op_timeout)
            .search(base, Scope::Subtree, filter, attrs.to_vec())
            .await
            .and_then(|result| result.success())
            .map_err(|e| AuthError::protocol("LDAP search", e))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| DirectoryEntry {
                dn: entry.dn,
                attrs: entry.attrs,
            })
            .collect())
    }

    async fn close(&mut self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.ldap.unbind()).await {
            Ok(Ok(())) => debug!("LDAP connection closed"),
            Ok(Err(e)) => debug!(error = %e, "LDAP unbind failed"),
            Err(_) => debug!("LDAP unbind timed out"),
        }
        self.driver.abort();
    }
}
