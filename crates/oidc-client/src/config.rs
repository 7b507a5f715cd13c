//! Client settings: loaded from a JSON file, enriched by discovery and registration

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OidcError, Result};

pub const DEFAULT_SCOPE: &str = "openid";

/// Client configuration.
///
/// Known settings are named fields; everything else a discovery document
/// returns lands in `extra`. Unset fields are skipped on serialization so
/// that merging JSON objects into the config is a plain key overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Issuer URL; when set, endpoints are fetched from its discovery document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Requested scope (default: "openid")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Client credentials used to obtain a token for the registration endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dcr_client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dcr_client_secret: Option<String>,

    /// Register from a server-side template (sent as `software_id`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_client: Option<String>,

    /// Base URL of this application; the callback is `{base_url}/callback`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Extra parameters added to every authorization request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authn_parameters: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub debug: bool,

    /// Verify the server's TLS certificate (default: true)
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub verify_ssl: bool,

    /// Additional PEM root certificate to trust
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Any other key, typically server metadata from discovery
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            authorization_endpoint: None,
            token_endpoint: None,
            registration_endpoint: None,
            revocation_endpoint: None,
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scope: None,
            dcr_client_id: None,
            dcr_client_secret: None,
            template_client: None,
            base_url: None,
            authn_parameters: BTreeMap::new(),
            debug: false,
            verify_ssl: default_true(),
            ca_cert: None,
            extra: Map::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ClientConfig {
    /// Minimal config with the two mandatory endpoints set.
    pub fn with_endpoints(
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            authorization_endpoint: Some(authorization_endpoint.into()),
            token_endpoint: Some(token_endpoint.into()),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON settings file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        let config: ClientConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))?;
        tracing::info!("Loaded settings from {:?}", path);
        Ok(config)
    }

    /// Merge a JSON object into the config. Keys from `other` always win,
    /// whether they map to a named field or to `extra`.
    pub fn merge(&mut self, other: Map<String, Value>) -> Result<()> {
        let mut merged = match serde_json::to_value(&*self) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => return Err(OidcError::Configuration(e.to_string())),
        };
        merged.extend(other);

        *self = serde_json::from_value(Value::Object(merged)).map_err(|e| {
            OidcError::Configuration(format!("Merged configuration is invalid: {}", e))
        })?;
        Ok(())
    }

    pub fn scope(&self) -> &str {
        self.scope.as_deref().unwrap_or(DEFAULT_SCOPE)
    }

    pub(crate) fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
        value.as_deref().ok_or_else(|| OidcError::missing(key))
    }
}
