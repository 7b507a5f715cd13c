//! Authorization request URL with PKCE (RFC 7636)

use std::collections::{BTreeMap, HashMap};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::client::OidcClient;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::storage::generate_random_string;

pub const SESSION_STATE: &str = "state";
pub const SESSION_CODE_VERIFIER: &str = "code_verifier";
pub const SESSION_NONCE: &str = "nonce";
pub const SESSION_FLOW: &str = "flow";

const STATE_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 32;
const CODE_VERIFIER_LENGTH: usize = 100;

/// Caller-owned store for per-attempt values (state, verifier, nonce, flow).
pub trait Session {
    fn insert(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

impl Session for HashMap<String, String> {
    fn insert(&mut self, key: &str, value: String) {
        HashMap::insert(self, key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        HashMap::remove(self, key);
    }
}

impl Session for BTreeMap<String, String> {
    fn insert(&mut self, key: &str, value: String) {
        BTreeMap::insert(self, key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        BTreeMap::remove(self, key);
    }
}

/// Options for one authorization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnRequest {
    /// Requested authentication context, sent as `acr_values`
    pub acr: Option<String>,
    /// Ask the user to log in even with an existing session
    pub force_authn: bool,
    /// Scope to request; the configured scope when unset
    pub scope: Option<String>,
    /// Ask the user for consent
    pub force_consent: bool,
    /// Let the user deselect individual consent options
    pub allow_consent_option_deselection: bool,
    pub response_type: String,
}

impl Default for AuthnRequest {
    fn default() -> Self {
        Self::new("code")
    }
}

impl AuthnRequest {
    pub fn new(response_type: impl Into<String>) -> Self {
        Self {
            acr: None,
            force_authn: false,
            scope: None,
            force_consent: false,
            allow_consent_option_deselection: false,
            response_type: response_type.into(),
        }
    }
}

/// An ID token in the response requires a nonce.
fn includes_id_token(response_type: &str) -> bool {
    response_type.split_whitespace().any(|t| t == "id_token")
}

/// S256 code challenge: BASE64URL(SHA256(code_verifier)), unpadded
pub fn code_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Set a query parameter, replacing an existing value in place.
fn set_param(params: &mut Vec<(String, String)>, key: &str, value: String) {
    match params.iter_mut().find(|(k, _)| k == key) {
        Some((_, existing)) => *existing = value,
        None => params.push((key.to_string(), value)),
    }
}

fn get_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

impl OidcClient {
    /// Build the URL to send the user to for authorization.
    ///
    /// Fresh `state`, `code_verifier` and `flow` (plus `nonce` when an ID
    /// token is requested) are written to `session`, replacing earlier values.
    /// A nonce left over from an earlier ID token request is removed.
    pub fn get_authn_req_url(
        &self,
        session: &mut impl Session,
        request: &AuthnRequest,
    ) -> Result<String> {
        let client_id = ClientConfig::require(&self.config.client_id, "client_id")?;
        let redirect_uri = ClientConfig::require(&self.config.redirect_uri, "redirect_uri")?;
        let authorization_endpoint = ClientConfig::require(
            &self.config.authorization_endpoint,
            "authorization_endpoint",
        )?;

        let state = generate_random_string(STATE_LENGTH);
        let code_verifier = generate_random_string(CODE_VERIFIER_LENGTH);
        let challenge = code_challenge(&code_verifier);
        session.insert(SESSION_STATE, state.clone());
        session.insert(SESSION_CODE_VERIFIER, code_verifier);

        let scope = request
            .scope
            .clone()
            .unwrap_or_else(|| self.config.scope().to_string());

        let mut params: Vec<(String, String)> = vec![
            ("response_type".into(), request.response_type.clone()),
            ("client_id".into(), client_id.to_string()),
            ("redirect_uri".into(), redirect_uri.to_string()),
            ("scope".into(), scope),
            ("state".into(), state),
            ("code_challenge".into(), challenge),
            ("code_challenge_method".into(), "S256".into()),
        ];

        for (key, value) in &self.config.authn_parameters {
            set_param(&mut params, key, value.clone());
        }

        if let Some(acr) = request.acr.as_deref().filter(|acr| !acr.is_empty()) {
            set_param(&mut params, "acr_values", acr.to_string());
        }

        if request.force_authn {
            set_param(&mut params, "prompt", "login".into());
        }

        if request.force_consent {
            let consent = if request.allow_consent_option_deselection {
                "consent consent_allow_deselection"
            } else {
                "consent"
            };
            let prompt = match get_param(&params, "prompt").filter(|p| !p.trim().is_empty()) {
                Some(existing) => format!("{} {}", existing.trim(), consent),
                None => consent.to_string(),
            };
            set_param(&mut params, "prompt", prompt);
        }

        // authn_parameters may have replaced the requested response_type
        let response_type = get_param(&params, "response_type")
            .unwrap_or(request.response_type.as_str())
            .to_string();
        if includes_id_token(&response_type) {
            let nonce = generate_random_string(NONCE_LENGTH);
            session.insert(SESSION_NONCE, nonce.clone());
            set_param(&mut params, "nonce", nonce);
        } else {
            session.remove(SESSION_NONCE);
        }
        session.insert(SESSION_FLOW, response_type);

        let delimiter = if authorization_endpoint.contains('?') {
            '&'
        } else {
            '?'
        };
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        let login_url = format!("{}{}{}", authorization_endpoint, delimiter, query);

        tracing::debug!("Redirect to {}", login_url);
        Ok(login_url)
    }
}
