//! The OpenID Connect client: owns the configuration, the transport and
//! the registration store. Protocol operations live in `crate::oauth`.

use serde_json::{Map, Value};

use crate::config::{ClientConfig, DEFAULT_SCOPE};
use crate::error::{OidcError, Result};
use crate::storage::{FileRegistrationStore, RegisteredClient, RegistrationStore};
use crate::transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError, ACCEPT,
    USER_AGENT,
};

/// Request payloads the client sends.
pub(crate) enum RequestBody<'a> {
    Form(&'a [(&'a str, &'a str)]),
    Json(&'a Value),
}

pub struct OidcClient {
    pub(crate) config: ClientConfig,
    /// Last registration record read from the store
    pub(crate) client_data: Option<RegisteredClient>,
    pub(crate) transport: Box<dyn HttpTransport>,
    pub(crate) store: Box<dyn RegistrationStore>,
}

impl OidcClient {
    /// Create a client using HTTPS and `registered_client.json` in the
    /// working directory.
    pub fn new(config: ClientConfig) -> Result<Self> {
        tracing::info!("Getting TLS context for the authorization server");
        let transport = ReqwestTransport::from_config(&config)?;
        Self::with_parts(config, transport, FileRegistrationStore::default())
    }

    /// Create a client with an explicit transport and registration store.
    ///
    /// Runs discovery when `issuer` is set, checks the mandatory endpoints
    /// and loads any persisted registration.
    pub fn with_parts(
        config: ClientConfig,
        transport: impl HttpTransport + 'static,
        store: impl RegistrationStore + 'static,
    ) -> Result<Self> {
        let mut client = Self {
            config,
            client_data: None,
            transport: Box::new(transport),
            store: Box::new(store),
        };
        client.init_config()?;
        Ok(client)
    }

    fn init_config(&mut self) -> Result<()> {
        self.discover()?;

        if self.config.authorization_endpoint.is_none() {
            return Err(OidcError::missing("authorization_endpoint"));
        }
        if self.config.token_endpoint.is_none() {
            return Err(OidcError::missing("token_endpoint"));
        }

        self.read_credentials_from_file();
        if self.config.client_id.is_none() {
            tracing::info!("Client is not registered");
        }

        if self.config.scope.is_none() {
            self.config.scope = Some(DEFAULT_SCOPE.to_string());
        }
        Ok(())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request with the fixed header set. Non-success statuses are errors.
    pub(crate) fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<RequestBody<'_>>,
        token: Option<&str>,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let mut headers = vec![
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            ("Accept".to_string(), ACCEPT.to_string()),
        ];
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        let body = match body {
            Some(RequestBody::Form(params)) => {
                headers.push((
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ));
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params.iter())
                    .finish();
                Some(encoded.into_bytes())
            }
            Some(RequestBody::Json(value)) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                Some(value.to_string().into_bytes())
            }
            None => None,
        };

        let response = self.transport.send(HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        })?;

        if !response.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }
        Ok(response)
    }

    /// Send a request and decode the response body as a JSON object.
    pub(crate) fn send_json(
        &self,
        method: Method,
        url: &str,
        body: Option<RequestBody<'_>>,
        token: Option<&str>,
    ) -> std::result::Result<Map<String, Value>, TransportError> {
        let response = self.send(method, url, body, token)?;
        serde_json::from_slice(&response.body).map_err(|e| TransportError::InvalidResponse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
