//! SP-initiated login: AuthnRequest over the HTTP-Redirect binding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use std::io::Write;
use tracing::debug;

use super::config::SamlConfig;
use super::validator::{ASSERTION_NS, PROTOCOL_NS};
use crate::error::AuthError;

const HTTP_POST_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
const REDIRECT_SIG_ALG: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

/// Build the IdP redirect URL for an SP-initiated login.
///
/// `relay_state` is percent-encoded and comes back from the IdP
/// unchanged; an empty value omits the parameter. The query parameters
/// use the HTTP-Redirect binding names `SAMLRequest` and `RelayState`,
/// so callers expecting a lowercase `relay_state` key must read
/// `RelayState` instead. When `sp_key` is configured the query is signed
/// (`SigAlg`, `Signature`). `idp_cert` is not required here.
pub fn generate_auth_url(config: &SamlConfig, relay_state: &str) -> Result<String, AuthError> {
    config
        .validate_for_redirect()
        .map_err(AuthError::Configuration)?;

    let request_id = format!("_{}", uuid::Uuid::new_v4().simple());
    let issue_instant = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let authn_request = build_authn_request(config, &request_id, &issue_instant);

    // Deflate and base64 encode
    let encoded = deflate_and_encode(&authn_request)?;

    let mut query = format!("SAMLRequest={}", urlencoding::encode(&encoded));
    if !relay_state.is_empty() {
        query.push_str(&format!("&RelayState={}", urlencoding::encode(relay_state)));
    }

    if let Some(ref sp_key) = config.sp_key {
        let key = parse_private_key(sp_key.expose_secret())?;
        query.push_str(&format!("&SigAlg={}", urlencoding::encode(REDIRECT_SIG_ALG)));

        let hashed = Sha256::digest(query.as_bytes());
        let signature = key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .map_err(|e| AuthError::protocol("AuthnRequest signing", e))?;
        query.push_str(&format!(
            "&Signature={}",
            urlencoding::encode(&BASE64.encode(signature))
        ));
    }

    let separator = if config.idp_issuer_url.contains('?') { '&' } else { '?' };
    let url = format!("{}{}{}", config.idp_issuer_url, separator, query);

    debug!(
        request_id = %request_id,
        destination = %config.idp_issuer_url,
        signed = config.sp_key.is_some(),
        "Created SAML AuthnRequest redirect"
    );
    Ok(url)
}

fn build_authn_request(config: &SamlConfig, request_id: &str, issue_instant: &str) -> String {
    let name_id_policy = config
        .name_id_format
        .as_deref()
        .filter(|f| !f.is_empty())
        .map(|format| {
            format!(
                r#"<samlp:NameIDPolicy Format="{}" AllowCreate="true"/>"#,
                xml_escape(format)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="{}" xmlns:saml="{}" ID="{}" Version="2.0" IssueInstant="{}" Destination="{}" AssertionConsumerServiceURL="{}" ProtocolBinding="{}"><saml:Issuer>{}</saml:Issuer>{}</samlp:AuthnRequest>"#,
        PROTOCOL_NS,
        ASSERTION_NS,
        request_id,
        issue_instant,
        xml_escape(&config.idp_issuer_url),
        xml_escape(&config.acs_url),
        HTTP_POST_BINDING,
        xml_escape(config.request_issuer()),
        name_id_policy
    )
}

fn deflate_and_encode(xml: &str) -> Result<String, AuthError> {
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| AuthError::protocol("AuthnRequest encoding", e))?;
    let compressed = encoder
        .finish()
        .map_err(|e| AuthError::protocol("AuthnRequest encoding", e))?;
    Ok(BASE64.encode(compressed))
}

/// PKCS#8 first, then PKCS#1. Parse errors never echo key material.
fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, AuthError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|_| AuthError::Configuration("SAML sp_key is not a valid RSA private key".to_string()))
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
