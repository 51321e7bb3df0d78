//! JWT signature and claim verification.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::config::JwtConfig;
use crate::authenticator::CredentialValidator;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::types::{required_credential, AuthMethod, AuthResult, Credentials};

/// Signature algorithms accepted with an RSA public key.
const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Registered claims plus everything else the issuer put in the token.
#[derive(Debug, Deserialize)]
struct JwtClaims {
    sub: Option<String>,
    iss: Option<String>,
    #[serde(default)]
    aud: Audience,
    exp: Option<u64>,
    nbf: Option<u64>,
    iat: Option<u64>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

/// Audience can be a single string or array of strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
enum Audience {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    fn joined(&self) -> Option<String> {
        match self {
            Audience::None => None,
            Audience::Single(s) => Some(s.clone()),
            Audience::Multiple(v) => Some(v.join(",")),
        }
    }
}

struct JwtRequest<'a> {
    token: &'a str,
}

impl<'a> JwtRequest<'a> {
    fn from_credentials(credentials: &'a Credentials) -> Result<Self, AuthError> {
        Ok(Self {
            token: required_credential(credentials, "token")?.trim(),
        })
    }
}

/// Verifies RSA-signed compact JWTs.
#[derive(Debug, Default, Clone, Copy)]
pub struct JwtVerifier;

impl JwtVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Verify `token` against `config` and build the identity.
    pub fn verify(&self, config: &JwtConfig, token: &str) -> Result<AuthResult, AuthError> {
        config.validate().map_err(AuthError::Configuration)?;

        let decoding_key = DecodingKey::from_rsa_pem(config.key.trim().as_bytes())
            .map_err(|e| AuthError::Configuration(format!("invalid JWT public key: {}", e)))?;

        let header = decode_header(token)
            .map_err(|e| AuthError::Input(format!("malformed token: {}", e)))?;

        debug!(kid = ?header.kid, alg = ?header.alg, "Verifying JWT");

        if !RSA_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::Validation(format!(
                "token algorithm {:?} is not accepted",
                header.alg
            )));
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = RSA_ALGORITHMS.to_vec();
        validation.leeway = config.clock_skew_secs;
        validation.validate_nbf = true;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let token_data =
            decode::<JwtClaims>(token, &decoding_key, &validation).map_err(map_jwt_error)?;
        let claims = token_data.claims;

        let user_id = claims
            .sub
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::Validation("token has no subject".to_string()))?;

        let user_name = string_claim(&claims.extra, "name")
            .or_else(|| string_claim(&claims.extra, "username"))
            .unwrap_or_default();
        let email = string_claim(&claims.extra, "email").unwrap_or_default();
        let attributes = build_claims_map(&claims);

        debug!(user_id = %user_id, claims = attributes.len(), "JWT verified");

        Ok(AuthResult::verified(user_id, user_name, email, attributes))
    }
}

#[async_trait]
impl CredentialValidator for JwtVerifier {
    type Config = JwtConfig;

    fn method(&self) -> AuthMethod {
        AuthMethod::Jwt
    }

    async fn validate(
        &self,
        _ctx: &RequestContext,
        config: &JwtConfig,
        credentials: &Credentials,
    ) -> Result<AuthResult, AuthError> {
        let request = JwtRequest::from_credentials(credentials)?;
        self.verify(config, request.token)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        JwtErrorKind::InvalidToken
        | JwtErrorKind::Base64(_)
        | JwtErrorKind::Json(_)
        | JwtErrorKind::Utf8(_) => AuthError::Input(format!("malformed token: {}", err)),
        JwtErrorKind::InvalidRsaKey(_) | JwtErrorKind::InvalidKeyFormat => {
            AuthError::Configuration(format!("invalid JWT public key: {}", err))
        }
        JwtErrorKind::InvalidSignature => {
            AuthError::Validation("token signature does not match the configured key".to_string())
        }
        JwtErrorKind::ExpiredSignature => AuthError::Validation("token has expired".to_string()),
        JwtErrorKind::ImmatureSignature => {
            AuthError::Validation("token is not yet valid".to_string())
        }
        JwtErrorKind::InvalidIssuer => AuthError::Validation("unexpected token issuer".to_string()),
        JwtErrorKind::InvalidAudience => {
            AuthError::Validation("token audience does not match".to_string())
        }
        JwtErrorKind::MissingRequiredClaim(claim) => {
            AuthError::Validation(format!("token is missing required claim '{}'", claim))
        }
        _ => AuthError::Validation(err.to_string()),
    }
}

fn string_claim(extra: &HashMap<String, serde_json::Value>, name: &str) -> Option<String> {
    extra
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Flatten scalar claims into string attributes.
fn build_claims_map(claims: &JwtClaims) -> HashMap<String, String> {
    let mut map = HashMap::new();

    if let Some(ref sub) = claims.sub {
        map.insert("sub".to_string(), sub.clone());
    }
    if let Some(ref iss) = claims.iss {
        map.insert("iss".to_string(), iss.clone());
    }
    if let Some(aud) = claims.aud.joined() {
        map.insert("aud".to_string(), aud);
    }
    if let Some(exp) = claims.exp {
        map.insert("exp".to_string(), exp.to_string());
    }
    if let Some(nbf) = claims.nbf {
        map.insert("nbf".to_string(), nbf.to_string());
    }
    if let Some(iat) = claims.iat {
        map.insert("iat".to_string(), iat.to_string());
    }

    for (key, value) in &claims.extra {
        match value {
            serde_json::Value::String(s) => {
                map.insert(key.clone(), s.clone());
            }
            serde_json::Value::Number(n) => {
                map.insert(key.clone(), n.to_string());
            }
            serde_json::Value::Bool(b) => {
                map.insert(key.clone(), b.to_string());
            }
            _ => {} // Skip complex values
        }
    }

    map
}
