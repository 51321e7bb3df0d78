//! SAML response validation.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use roxmltree::{Document, Node};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::config::SamlConfig;
use super::signature::{verify_enveloped, IdpKey, DSIG_NS};
use crate::authenticator::CredentialValidator;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::types::{required_credential, AuthMethod, AuthResult, Credentials};

pub(crate) const PROTOCOL_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub(crate) const ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
const BEARER_METHOD: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";
const MAX_CLOCK_SKEW_SECS: u64 = 24 * 60 * 60;

/// Validates base64 SAML responses posted to the ACS endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct SamlValidator;

impl SamlValidator {
    pub fn new() -> Self {
        Self
    }

    /// Decode, verify and extract the identity from a `SAMLResponse` value.
    pub fn validate_response(
        &self,
        config: &SamlConfig,
        saml_response: &str,
    ) -> Result<AuthResult, AuthError> {
        config.validate().map_err(AuthError::Configuration)?;
        let key = IdpKey::from_config(config)?;

        let compact: String = saml_response
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let decoded = BASE64
            .decode(compact.as_bytes())
            .map_err(|_| AuthError::Input("SAMLResponse is not valid base64".to_string()))?;
        let xml = String::from_utf8(decoded)
            .map_err(|_| AuthError::Input("SAMLResponse is not valid UTF-8".to_string()))?;

        // DTDs are rejected by the parser.
        let doc = Document::parse(&xml).map_err(|e| {
            AuthError::Input(format!("SAMLResponse is not well-formed XML: {}", e))
        })?;

        debug!(bytes = xml.len(), "Processing SAML response");

        self.validate_document(config, &key, &doc, Utc::now())
    }

    fn validate_document(
        &self,
        config: &SamlConfig,
        key: &IdpKey,
        doc: &Document<'_>,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        let root = doc.root_element();
        let is_response = root.has_tag_name((PROTOCOL_NS, "Response"));
        if !is_response && !root.has_tag_name((ASSERTION_NS, "Assertion")) {
            return Err(AuthError::Validation(format!(
                "unexpected SAML document element '{}'",
                root.tag_name().name()
            )));
        }

        if is_response {
            check_status(root)?;
        }

        if doc
            .descendants()
            .any(|n| n.has_tag_name((ASSERTION_NS, "EncryptedAssertion")))
        {
            return Err(AuthError::Validation(
                "encrypted assertions are not supported".to_string(),
            ));
        }

        check_unique_ids(doc)?;

        let assertion = single_assertion(doc)?;

        // Every signature present must verify, and at least one must
        // cover the assertion (directly or through the Response).
        let assertion_signature = signature_of(assertion);
        let response_signature = if is_response { signature_of(root) } else { None };
        if assertion_signature.is_none() && response_signature.is_none() {
            warn!("Rejecting unsigned SAML assertion");
            return Err(AuthError::Validation("assertion is not signed".to_string()));
        }
        if let Some(signature) = response_signature {
            verify_enveloped(signature, root, key, config.allow_sha1)?;
        }
        if let Some(signature) = assertion_signature {
            verify_enveloped(signature, assertion, key, config.allow_sha1)?;
        }

        let skew = Duration::seconds(config.clock_skew_secs.min(MAX_CLOCK_SKEW_SECS) as i64);
        check_issuer(config, assertion)?;
        check_conditions(config, assertion, now, skew)?;
        check_subject_confirmation(config, assertion, now, skew)?;

        let name_id = assertion_child(assertion, "Subject")
            .and_then(|subject| assertion_child(subject, "NameID"))
            .map(text_content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::Validation("assertion has no NameID".to_string()))?;

        let attributes = extract_attributes(assertion);
        let email = attributes
            .get("email")
            .or_else(|| attributes.get("mail"))
            .cloned()
            .unwrap_or_default();

        debug!(
            name_id = %name_id,
            assertion_id = assertion.attribute("ID").unwrap_or_default(),
            attributes = attributes.len(),
            "SAML assertion accepted"
        );

        Ok(AuthResult::verified(
            name_id.clone(),
            name_id,
            email,
            attributes,
        ))
    }
}

#[async_trait]
impl CredentialValidator for SamlValidator {
    type Config = SamlConfig;

    fn method(&self) -> AuthMethod {
        AuthMethod::Saml
    }

    async fn validate(
        &self,
        ctx: &RequestContext,
        config: &SamlConfig,
        credentials: &Credentials,
    ) -> Result<AuthResult, AuthError> {
        let saml_response = required_credential(credentials, "SAMLResponse")?;
        ctx.guard("SAML verification", async {
            self.validate_response(config, saml_response)
        })
        .await
    }
}

fn assertion_child<'a, 'i>(node: Node<'a, 'i>, local: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.has_tag_name((ASSERTION_NS, local)))
}

fn signature_of<'a, 'i>(node: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name((DSIG_NS, "Signature")))
}

fn check_status(response: Node<'_, '_>) -> Result<(), AuthError> {
    let status = response
        .children()
        .find(|n| n.has_tag_name((PROTOCOL_NS, "Status")));
    let code = status
        .and_then(|s| s.children().find(|n| n.has_tag_name((PROTOCOL_NS, "StatusCode"))))
        .and_then(|c| c.attribute("Value"));

    if code == Some(STATUS_SUCCESS) {
        return Ok(());
    }

    let message = status
        .and_then(|s| {
            s.children()
                .find(|n| n.has_tag_name((PROTOCOL_NS, "StatusMessage")))
        })
        .and_then(|m| m.text())
        .unwrap_or("Unknown error");
    Err(AuthError::Validation(format!(
        "IdP returned status {}: {}",
        code.unwrap_or("(none)"),
        message
    )))
}

fn check_unique_ids(doc: &Document<'_>) -> Result<(), AuthError> {
    let mut seen = HashSet::new();
    for id in doc
        .descendants()
        .filter(|n| n.is_element())
        .filter_map(|n| n.attribute("ID"))
    {
        if !seen.insert(id) {
            return Err(AuthError::Validation(format!(
                "duplicate ID '{}' in SAML response",
                id
            )));
        }
    }
    Ok(())
}

fn single_assertion<'a, 'i>(doc: &'a Document<'i>) -> Result<Node<'a, 'i>, AuthError> {
    let mut assertions = doc
        .descendants()
        .filter(|n| n.has_tag_name((ASSERTION_NS, "Assertion")));
    match (assertions.next(), assertions.next()) {
        (Some(assertion), None) => Ok(assertion),
        (None, _) => Err(AuthError::Validation(
            "SAML response contains no assertion".to_string(),
        )),
        (Some(_), Some(_)) => Err(AuthError::Validation(
            "SAML response must contain exactly one assertion".to_string(),
        )),
    }
}

fn check_issuer(config: &SamlConfig, assertion: Node<'_, '_>) -> Result<(), AuthError> {
    let Some(expected) = config.idp_entity_id.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(());
    };

    let issuer = assertion_child(assertion, "Issuer")
        .map(text_content)
        .unwrap_or_default();
    if issuer.trim() != expected {
        return Err(AuthError::Validation(format!(
            "unexpected assertion issuer '{}'",
            issuer.trim()
        )));
    }
    Ok(())
}

fn check_conditions(
    config: &SamlConfig,
    assertion: Node<'_, '_>,
    now: DateTime<Utc>,
    skew: Duration,
) -> Result<(), AuthError> {
    let conditions = assertion_child(assertion, "Conditions");

    if let Some(conditions) = conditions {
        if let Some(not_before) = parse_instant(conditions, "NotBefore")? {
            if now + skew < not_before {
                return Err(AuthError::Validation(
                    "assertion is not yet valid".to_string(),
                ));
            }
        }
        if let Some(not_on_or_after) = parse_instant(conditions, "NotOnOrAfter")? {
            if now - skew >= not_on_or_after {
                return Err(AuthError::Validation("assertion has expired".to_string()));
            }
        }
    }

    let Some(sp_entity_id) = config.sp_entity_id.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(());
    };

    let listed = conditions
        .into_iter()
        .flat_map(|c| c.children())
        .filter(|n| n.has_tag_name((ASSERTION_NS, "AudienceRestriction")))
        .flat_map(|r| r.children())
        .filter(|n| n.has_tag_name((ASSERTION_NS, "Audience")))
        .map(text_content)
        .any(|audience| audience.trim() == sp_entity_id);

    if !listed {
        return Err(AuthError::Validation(
            "assertion audience does not include this service provider".to_string(),
        ));
    }
    Ok(())
}

fn check_subject_confirmation(
    config: &SamlConfig,
    assertion: Node<'_, '_>,
    now: DateTime<Utc>,
    skew: Duration,
) -> Result<(), AuthError> {
    let Some(subject) = assertion_child(assertion, "Subject") else {
        return Ok(());
    };

    for confirmation in subject
        .children()
        .filter(|n| n.has_tag_name((ASSERTION_NS, "SubjectConfirmation")))
        .filter(|n| n.attribute("Method") == Some(BEARER_METHOD))
    {
        let Some(data) = assertion_child(confirmation, "SubjectConfirmationData") else {
            continue;
        };

        if let Some(recipient) = data.attribute("Recipient") {
            if recipient != config.acs_url {
                return Err(AuthError::Validation(format!(
                    "assertion recipient '{}' does not match the ACS URL",
                    recipient
                )));
            }
        }

        if let Some(not_on_or_after) = parse_instant(data, "NotOnOrAfter")? {
            if now - skew >= not_on_or_after {
                return Err(AuthError::Validation(
                    "subject confirmation has expired".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn parse_instant(node: Node<'_, '_>, attr: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
    node.attribute(attr)
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| AuthError::Validation(format!("invalid {} timestamp", attr)))
        })
        .transpose()
}

/// All text beneath `node`, in document order.
///
/// Canonicalization drops comments, so a signed value may arrive split
/// into several text nodes; `Node::text` would return only the first.
pub(crate) fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|d| d.is_text())
        .filter_map(|d| d.text())
        .collect()
}

/// First value of each attribute, keyed by attribute Name.
fn extract_attributes(assertion: Node<'_, '_>) -> HashMap<String, String> {
    let mut attributes = HashMap::new();

    for attribute in assertion
        .children()
        .filter(|n| n.has_tag_name((ASSERTION_NS, "AttributeStatement")))
        .flat_map(|s| s.children())
        .filter(|n| n.has_tag_name((ASSERTION_NS, "Attribute")))
    {
        let Some(name) = attribute.attribute("Name") else {
            continue;
        };
        let value = assertion_child(attribute, "AttributeValue")
            .map(text_content)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        attributes.entry(name.to_string()).or_insert(value);
    }

    attributes
}
