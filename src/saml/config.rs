//! SAML Service Provider configuration.

use base64::{engine::general_purpose::STANDARD, Engine};
use secrecy::SecretString;
use serde::Deserialize;

use crate::config::default_true;

const PEM_CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_CERT_END: &str = "-----END CERTIFICATE-----";

/// SAML Service Provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SamlConfig {
    /// Enable SAML authentication.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// IdP single sign-on endpoint (redirect target for AuthnRequests).
    #[serde(default)]
    pub idp_issuer_url: String,

    /// IdP signing certificate, PEM or bare base64 DER.
    #[serde(default)]
    pub idp_cert: String,

    /// SP certificate (PEM). Informational; published in SP metadata.
    #[serde(default)]
    pub sp_cert: Option<String>,

    /// SP private key (PEM) used to sign redirect-binding requests.
    #[serde(default)]
    pub sp_key: Option<SecretString>,

    /// Assertion Consumer Service URL (where IdP posts SAML response).
    #[serde(default)]
    pub acs_url: String,

    /// SP Entity ID. Falls back to `acs_url` as request Issuer.
    #[serde(default)]
    pub sp_entity_id: Option<String>,

    /// Expected assertion Issuer.
    #[serde(default)]
    pub idp_entity_id: Option<String>,

    /// NameID format to request (optional).
    /// e.g., "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress"
    #[serde(default)]
    pub name_id_format: Option<String>,

    /// Clock skew tolerance in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,

    /// Accept RSA-SHA1 signatures and SHA-1 digests.
    #[serde(default)]
    pub allow_sha1: bool,
}

fn default_clock_skew() -> u64 {
    300 // 5 minutes
}

impl Default for SamlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idp_issuer_url: String::new(),
            idp_cert: String::new(),
            sp_cert: None,
            sp_key: None,
            acs_url: String::new(),
            sp_entity_id: None,
            idp_entity_id: None,
            name_id_format: None,
            clock_skew_secs: default_clock_skew(),
            allow_sha1: false,
        }
    }
}

impl SamlConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.validate_for_redirect()?;

        if self.idp_cert.trim().is_empty() {
            return Err("SAML idp_cert is required".to_string());
        }

        Ok(())
    }

    /// Fields needed to build an AuthnRequest redirect. The IdP
    /// certificate is only needed to verify responses.
    pub fn validate_for_redirect(&self) -> Result<(), String> {
        if self.idp_issuer_url.is_empty() {
            return Err("SAML idp_issuer_url is required".to_string());
        }

        if self.acs_url.is_empty() {
            return Err("SAML acs_url is required".to_string());
        }

        Ok(())
    }

    /// Issuer placed in outgoing AuthnRequests.
    pub fn request_issuer(&self) -> &str {
        self.sp_entity_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.acs_url)
    }

    /// DER bytes of the IdP certificate.
    pub(crate) fn idp_certificate_der(&self) -> Result<Vec<u8>, String> {
        decode_cert_data(&self.idp_cert)
    }
}

/// Accepts a PEM block or raw base64 DER (as found in IdP metadata).
fn decode_cert_data(data: &str) -> Result<Vec<u8>, String> {
    let data = data.trim();

    let body = match (data.find(PEM_CERT_BEGIN), data.find(PEM_CERT_END)) {
        (Some(start), Some(end)) if end > start => &data[start + PEM_CERT_BEGIN.len()..end],
        (Some(_), _) => return Err("invalid PEM: missing END marker".to_string()),
        _ => data,
    };

    let base64_content: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(base64_content.as_bytes())
        .map_err(|e| format!("failed to decode IdP certificate: {}", e))
}
