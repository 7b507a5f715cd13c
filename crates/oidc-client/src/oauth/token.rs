//! Token endpoint and revocation endpoint calls
//!
//! Handles:
//! - Client credentials grant (access token for the registration endpoint)
//! - Authorization code exchange
//! - Refresh token grant
//! - Token revocation (RFC 7009)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::{OidcClient, RequestBody};
use crate::config::ClientConfig;
use crate::error::{OidcError, Outcome, Result, SkipReason};
use crate::transport::{Method, TransportError};

/// Scope requested for the registration access token
pub const DCR_SCOPE: &str = "dcr";

/// Token endpoint response, passed through as received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenResponse(Map<String, Value>);

impl TokenResponse {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.str_field("access_token")
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.str_field("refresh_token")
    }

    pub fn id_token(&self) -> Option<&str> {
        self.str_field("id_token")
    }

    pub fn token_type(&self) -> Option<&str> {
        self.str_field("token_type")
    }

    pub fn expires_in(&self) -> Option<u64> {
        self.0.get("expires_in").and_then(Value::as_u64)
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_json(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for TokenResponse {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl OidcClient {
    /// Get an access token for the registration endpoint with the
    /// client credentials grant.
    pub fn get_registration_token(&self) -> Result<String> {
        let client_id = self.config.dcr_client_id.as_deref().ok_or_else(|| {
            OidcError::Configuration(
                "Can not run client registration. Missing client id.".to_string(),
            )
        })?;
        let client_secret = self.config.dcr_client_secret.as_deref().ok_or_else(|| {
            OidcError::Configuration(
                "Can not run client registration. Missing client secret.".to_string(),
            )
        })?;
        let token_endpoint = ClientConfig::require(&self.config.token_endpoint, "token_endpoint")?;

        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "client_credentials"),
            ("scope", DCR_SCOPE),
        ];

        let response = self
            .send_json(Method::Post, token_endpoint, Some(RequestBody::Form(&params)), None)
            .inspect_err(|e| tracing::error!("Could not get DCR access token: {}", e))?;

        match response.get("access_token").and_then(Value::as_str) {
            Some(token) => Ok(token.to_string()),
            None => Err(TransportError::InvalidResponse {
                url: token_endpoint.to_string(),
                message: "access_token missing from response".to_string(),
            }
            .into()),
        }
    }

    /// Exchange an authorization code for tokens.
    pub fn get_token(&self, code: &str, code_verifier: &str) -> Result<TokenResponse> {
        let redirect_uri = ClientConfig::require(&self.config.redirect_uri, "redirect_uri")?;
        let mut params = self.client_credentials()?;
        params.extend([
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ]);

        self.token_request(&params)
            .inspect_err(|e| tracing::error!("Could not exchange code for tokens: {}", e))
    }

    /// Get a new access token with a refresh token.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let mut params = self.client_credentials()?;
        params.extend([
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ]);

        self.token_request(&params)
            .inspect_err(|e| tracing::error!("Could not refresh tokens: {}", e))
    }

    /// Revoke a token. Skipped when the server has no revocation endpoint.
    ///
    /// `token_type_hint` is usually `access_token` or `refresh_token`.
    pub fn revoke(&self, token: &str, token_type_hint: &str) -> Result<Outcome<()>> {
        let Some(revocation_endpoint) = self.config.revocation_endpoint.as_deref() else {
            tracing::info!("No revocation endpoint set");
            return Ok(Outcome::Skipped(SkipReason::NoRevocationEndpoint));
        };

        let mut params = vec![("token", token), ("token_type_hint", token_type_hint)];
        params.extend(self.client_credentials()?);

        self.send(
            Method::Post,
            revocation_endpoint,
            Some(RequestBody::Form(&params)),
            None,
        )
        .inspect_err(|e| tracing::error!("Could not revoke token: {}", e))?;

        tracing::info!("Revoked {}", token_type_hint);
        Ok(Outcome::Completed(()))
    }

    /// `client_id`, plus `client_secret` when the client is confidential
    fn client_credentials(&self) -> Result<Vec<(&str, &str)>> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or_else(|| OidcError::Configuration("Client is not registered".to_string()))?;

        let mut params = vec![("client_id", client_id)];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }
        Ok(params)
    }

    fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let token_endpoint = ClientConfig::require(&self.config.token_endpoint, "token_endpoint")?;
        let response =
            self.send_json(Method::Post, token_endpoint, Some(RequestBody::Form(params)), None)?;
        Ok(TokenResponse::from(response))
    }
}
