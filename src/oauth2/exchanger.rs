//! Authorization-code exchange and user-info lookup.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::{OAuth2Config, ResolvedEndpoints};
use super::providers::{first_field, scalar_to_string};
use crate::authenticator::CredentialValidator;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::types::{required_credential, AuthMethod, AuthResult, Credentials};

const TOKEN_EXCHANGE: &str = "OAuth2 token exchange";
const USERINFO_FETCH: &str = "OAuth2 user-info fetch";

/// Token endpoint response. Some providers (GitHub) answer 200 with an
/// `error` field instead of an error status.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

struct OAuth2Request<'a> {
    code: &'a str,
}

impl<'a> OAuth2Request<'a> {
    fn from_credentials(credentials: &'a Credentials) -> Result<Self, AuthError> {
        Ok(Self {
            code: required_credential(credentials, "code")?.trim(),
        })
    }
}

/// Exchanges authorization codes and resolves the user behind them.
#[derive(Debug, Clone)]
pub struct OAuth2Exchanger {
    http_client: reqwest::Client,
}

impl OAuth2Exchanger {
    pub fn new() -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(http_client))
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Exchange `code` for an access token and fetch the user's profile.
    pub async fn exchange(
        &self,
        ctx: &RequestContext,
        config: &OAuth2Config,
        code: &str,
    ) -> Result<AuthResult, AuthError> {
        config.validate().map_err(AuthError::Configuration)?;
        let endpoints = config.endpoints().map_err(AuthError::Configuration)?;
        let timeout = Duration::from_secs(config.timeout_secs);

        let access_token = ctx
            .guard(
                TOKEN_EXCHANGE,
                self.request_token(config, &endpoints, code, timeout),
            )
            .await?;

        let profile = ctx
            .guard(
                USERINFO_FETCH,
                self.fetch_userinfo(&endpoints, &access_token, timeout),
            )
            .await?;

        let result = profile_to_result(&endpoints, profile)?.with_access_token(access_token);
        info!(
            provider = ?config.provider,
            user_id = %result.user_id,
            "OAuth2 authentication succeeded"
        );
        Ok(result)
    }

    async fn request_token(
        &self,
        config: &OAuth2Config,
        endpoints: &ResolvedEndpoints,
        code: &str,
        timeout: Duration,
    ) -> Result<String, AuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_url.as_str()),
            ("client_id", config.client_id.as_str()),
        ];
        let client_secret = config.client_secret.expose_secret();
        if !client_secret.is_empty() {
            form.push(("client_secret", client_secret.as_str()));
        }

        debug!(token_url = %endpoints.token_url, "Exchanging authorization code");

        let response = self
            .http_client
            .post(&endpoints.token_url)
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::protocol(TOKEN_EXCHANGE, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::protocol(TOKEN_EXCHANGE, e))?;
        let token: Option<TokenResponse> = serde_json::from_str(&body).ok();

        if let Some(error) = token.as_ref().and_then(|t| t.error.as_deref()) {
            let description = token
                .as_ref()
                .and_then(|t| t.error_description.as_deref())
                .unwrap_or_default();
            warn!(status = %status, error, "Token endpoint rejected the authorization code");
            return Err(AuthError::protocol(
                TOKEN_EXCHANGE,
                format!("provider returned '{}' {}", error, description)
                    .trim_end()
                    .to_string(),
            ));
        }

        if !status.is_success() {
            return Err(AuthError::protocol(
                TOKEN_EXCHANGE,
                format!("token endpoint returned status {}", status),
            ));
        }

        let token = token.ok_or_else(|| {
            AuthError::protocol(TOKEN_EXCHANGE, "token response is not valid JSON")
        })?;

        if let Some(token_type) = token.token_type.as_deref() {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(AuthError::protocol(
                    TOKEN_EXCHANGE,
                    format!("unsupported token type '{}'", token_type),
                ));
            }
        }

        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::protocol(TOKEN_EXCHANGE, "token response has no access_token"))
    }

    async fn fetch_userinfo(
        &self,
        endpoints: &ResolvedEndpoints,
        access_token: &str,
        timeout: Duration,
    ) -> Result<serde_json::Map<String, serde_json::Value>, AuthError> {
        debug!(userinfo_url = %endpoints.userinfo_url, "Fetching user info");

        let response = self
            .http_client
            .get(&endpoints.userinfo_url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AuthError::protocol(USERINFO_FETCH, e))?;

        if !response.status().is_success() {
            return Err(AuthError::protocol(
                USERINFO_FETCH,
                format!("user-info endpoint returned status {}", response.status()),
            ));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::protocol(USERINFO_FETCH, e))?;

        match payload {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(AuthError::protocol(
                USERINFO_FETCH,
                "user-info payload is not a JSON object",
            )),
        }
    }
}

/// Build the provider authorization redirect (`response_type=code`).
pub fn authorization_url(config: &OAuth2Config, state: &str) -> Result<String, AuthError> {
    config.validate().map_err(AuthError::Configuration)?;
    let endpoints = config.endpoints().map_err(AuthError::Configuration)?;

    let mut url = url::Url::parse(&endpoints.auth_url)
        .map_err(|e| AuthError::Configuration(format!("invalid OAuth2 auth_url: {}", e)))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_url);
        if !config.scopes.is_empty() {
            query.append_pair("scope", &config.scopes.join(" "));
        }
        if !state.is_empty() {
            query.append_pair("state", state);
        }
    }
    Ok(url.into())
}

fn profile_to_result(
    endpoints: &ResolvedEndpoints,
    profile: serde_json::Map<String, serde_json::Value>,
) -> Result<AuthResult, AuthError> {
    let mapping = &endpoints.field_mapping;

    let user_id = first_field(&profile, &mapping.user_id).ok_or_else(|| {
        AuthError::protocol(
            USERINFO_FETCH,
            format!("user-info payload has none of {:?}", mapping.user_id),
        )
    })?;
    let user_name = first_field(&profile, &mapping.user_name).unwrap_or_default();
    let email = first_field(&profile, &mapping.email).unwrap_or_default();

    let attributes: HashMap<String, String> = profile
        .iter()
        .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s)))
        .collect();

    Ok(AuthResult::verified(user_id, user_name, email, attributes))
}

#[async_trait]
impl CredentialValidator for OAuth2Exchanger {
    type Config = OAuth2Config;

    fn method(&self) -> AuthMethod {
        AuthMethod::OAuth2
    }

    async fn validate(
        &self,
        ctx: &RequestContext,
        config: &OAuth2Config,
        credentials: &Credentials,
    ) -> Result<AuthResult, AuthError> {
        let request = OAuth2Request::from_credentials(credentials)?;
        self.exchange(ctx, config, request.code).await
    }
}
