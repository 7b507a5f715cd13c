//! HTTP transport abstraction.
//!
//! Implementations:
//! - `ReqwestTransport` - blocking HTTPS client built from the client config
//! - `InMemoryTransport` - canned responses and request capture, for testing

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::config::ClientConfig;

pub const USER_AGENT: &str = "CurityExample/1.0";
pub const ACCEPT: &str = "application/json,text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Setup(String),

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decode a form-encoded body into key/value pairs.
    pub fn form(&self) -> HashMap<String, String> {
        self.body
            .as_deref()
            .map(|body| url::form_urlencoded::parse(body).into_owned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request and blocks until the response arrives.
pub trait HttpTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Box<T> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

/// Blocking HTTPS transport backed by reqwest.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Build the client with the TLS settings from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        tracing::debug!("Building TLS context for the authorization server");

        let mut builder = reqwest::blocking::Client::builder().use_rustls_tls();

        if !config.verify_ssl {
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path).map_err(|e| {
                TransportError::Setup(format!("Failed to read CA certificate {:?}: {}", path, e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| TransportError::Setup(format!("Invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(|e| TransportError::Request {
            url: request.url.clone(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| TransportError::Request {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// In-memory transport for testing.
///
/// Responses are keyed by URL; each request is recorded. Clones share
/// state, so a test can keep a handle after moving one into the client.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    responses: Arc<Mutex<HashMap<String, HttpResponse>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the response returned for `url`.
    pub fn respond(&self, url: impl Into<String>, response: HttpResponse) {
        self.responses.lock().unwrap().insert(url.into(), response);
    }

    /// Register a 200 JSON response for `url`.
    pub fn respond_json(&self, url: impl Into<String>, value: serde_json::Value) {
        self.respond(url, HttpResponse::json(200, &value));
    }

    /// All requests sent so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }
}

impl HttpTransport for InMemoryTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        self.responses
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .ok_or_else(|| TransportError::Request {
                url,
                message: "no mock response for url".into(),
            })
    }
}
