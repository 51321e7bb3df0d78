//! XML-DSig verification of enveloped SAML signatures.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use roxmltree::Node;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tracing::debug;
use x509_parser::prelude::*;

use super::c14n::canonicalize;
use super::config::SamlConfig;
use super::validator::text_content;
use crate::error::AuthError;

pub(crate) const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

const DIGEST_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
const DIGEST_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const DIGEST_SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    fn from_signature_method(uri: &str, allow_sha1: bool) -> Result<Self, AuthError> {
        match uri {
            RSA_SHA256 => Ok(Self::Sha256),
            RSA_SHA512 => Ok(Self::Sha512),
            RSA_SHA1 if allow_sha1 => Ok(Self::Sha1),
            other => Err(AuthError::Validation(format!(
                "signature method '{}' is not accepted",
                other
            ))),
        }
    }

    fn from_digest_method(uri: &str, allow_sha1: bool) -> Result<Self, AuthError> {
        match uri {
            DIGEST_SHA256 => Ok(Self::Sha256),
            DIGEST_SHA512 => Ok(Self::Sha512),
            DIGEST_SHA1 if allow_sha1 => Ok(Self::Sha1),
            other => Err(AuthError::Validation(format!(
                "digest method '{}' is not accepted",
                other
            ))),
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn pkcs1v15(self) -> Pkcs1v15Sign {
        match self {
            Self::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
            Self::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
            Self::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        }
    }
}

/// Public key taken from the configured IdP certificate.
#[derive(Debug, Clone)]
pub(crate) struct IdpKey {
    key: RsaPublicKey,
}

impl IdpKey {
    pub(crate) fn from_config(config: &SamlConfig) -> Result<Self, AuthError> {
        let der = config
            .idp_certificate_der()
            .map_err(AuthError::Configuration)?;

        let (_, cert) = X509Certificate::from_der(&der).map_err(|e| {
            AuthError::Configuration(format!("failed to parse IdP certificate: {:?}", e))
        })?;

        let key = RsaPublicKey::from_public_key_der(cert.public_key().raw).map_err(|e| {
            AuthError::Configuration(format!("IdP certificate does not hold an RSA key: {}", e))
        })?;

        debug!(subject = %cert.subject(), "Loaded IdP signing certificate");

        Ok(Self { key })
    }
}

/// Verify `signature`, an enveloped `ds:Signature` inside `signed`.
///
/// The single Reference must point at `signed` by ID. Any key material in
/// `KeyInfo` is ignored; only `key` is trusted.
pub(crate) fn verify_enveloped(
    signature: Node<'_, '_>,
    signed: Node<'_, '_>,
    key: &IdpKey,
    allow_sha1: bool,
) -> Result<(), AuthError> {
    let signed_info = required_child(signature, "SignedInfo")?;

    let c14n_method = required_child(signed_info, "CanonicalizationMethod")?;
    if c14n_method.attribute("Algorithm") != Some(EXC_C14N) {
        return Err(AuthError::Validation(
            "SignedInfo must use exclusive canonicalization".to_string(),
        ));
    }

    let signature_method = required_child(signed_info, "SignatureMethod")?;
    let signature_hash = HashAlgorithm::from_signature_method(
        signature_method.attribute("Algorithm").unwrap_or_default(),
        allow_sha1,
    )?;

    let mut references = signed_info
        .children()
        .filter(|n| n.has_tag_name((DSIG_NS, "Reference")));
    let reference = references
        .next()
        .ok_or_else(|| AuthError::Validation("signature has no Reference".to_string()))?;
    if references.next().is_some() {
        return Err(AuthError::Validation(
            "signature must carry exactly one Reference".to_string(),
        ));
    }

    let signed_id = signed.attribute("ID").unwrap_or_default();
    let uri = reference.attribute("URI").unwrap_or_default();
    if signed_id.is_empty() || uri.strip_prefix('#') != Some(signed_id) {
        return Err(AuthError::Validation(
            "signature does not reference the enclosing element".to_string(),
        ));
    }

    let inclusive = reference_transforms(reference)?;

    let digest_method = required_child(reference, "DigestMethod")?;
    let digest_hash = HashAlgorithm::from_digest_method(
        digest_method.attribute("Algorithm").unwrap_or_default(),
        allow_sha1,
    )?;
    let expected_digest = decode_base64_text(required_child(reference, "DigestValue")?)?;

    let canonical = canonicalize(signed, Some(signature), &inclusive);
    if digest_hash.digest(canonical.as_bytes()) != expected_digest {
        return Err(AuthError::Validation(
            "digest of the signed element does not match".to_string(),
        ));
    }

    let signature_value = decode_base64_text(required_child(signature, "SignatureValue")?)?;
    let canonical_signed_info =
        canonicalize(signed_info, None, &inclusive_prefixes(c14n_method));
    let hashed = signature_hash.digest(canonical_signed_info.as_bytes());

    key.key
        .verify(signature_hash.pkcs1v15(), &hashed, &signature_value)
        .map_err(|_| {
            AuthError::Validation("signature does not verify against the IdP certificate".to_string())
        })?;

    debug!(reference = %uri, "XML signature verified");
    Ok(())
}

/// Check the Reference transforms and return the exclusive c14n prefix list.
fn reference_transforms(reference: Node<'_, '_>) -> Result<Vec<String>, AuthError> {
    let transforms = required_child(reference, "Transforms")?;

    let mut enveloped = false;
    let mut inclusive = None;
    for transform in transforms
        .children()
        .filter(|n| n.has_tag_name((DSIG_NS, "Transform")))
    {
        match transform.attribute("Algorithm").unwrap_or_default() {
            ENVELOPED_SIGNATURE => enveloped = true,
            EXC_C14N => inclusive = Some(inclusive_prefixes(transform)),
            other => {
                return Err(AuthError::Validation(format!(
                    "transform '{}' is not supported",
                    other
                )))
            }
        }
    }

    match (enveloped, inclusive) {
        (true, Some(prefixes)) => Ok(prefixes),
        _ => Err(AuthError::Validation(
            "reference must use enveloped-signature and exclusive canonicalization transforms"
                .to_string(),
        )),
    }
}

fn inclusive_prefixes(method: Node<'_, '_>) -> Vec<String> {
    method
        .children()
        .find(|n| n.has_tag_name((EXC_C14N, "InclusiveNamespaces")))
        .and_then(|n| n.attribute("PrefixList"))
        .map(|list| {
            list.split_whitespace()
                .map(|p| if p == "#default" { String::new() } else { p.to_string() })
                .collect()
        })
        .unwrap_or_default()
}

fn required_child<'a, 'i>(node: Node<'a, 'i>, local: &str) -> Result<Node<'a, 'i>, AuthError> {
    node.children()
        .find(|n| n.has_tag_name((DSIG_NS, local)))
        .ok_or_else(|| AuthError::Validation(format!("signature is missing {}", local)))
}

fn decode_base64_text(node: Node<'_, '_>) -> Result<Vec<u8>, AuthError> {
    let text: String = text_content(node)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    BASE64.decode(text.as_bytes()).map_err(|_| {
        AuthError::Validation(format!("{} is not valid base64", node.tag_name().name()))
    })
}
