//! OpenID Connect demo client
//!
//! Provides:
//! - OpenID Connect discovery from an issuer
//! - RFC 7591 Dynamic Client Registration, persisted to `registered_client.json`
//! - Authorization code flow URLs with PKCE
//! - Token exchange, refresh and revocation

pub mod client;
pub mod config;
pub mod error;
pub mod oauth;
pub mod storage;
pub mod transport;

pub use client::OidcClient;
pub use config::ClientConfig;
pub use error::{OidcError, Outcome, Result, SkipReason};
pub use oauth::authorize::{code_challenge, AuthnRequest, Session};
pub use oauth::token::TokenResponse;
pub use storage::{
    FileRegistrationStore, InMemoryRegistrationStore, RegisteredClient, RegistrationStore,
    StoreError,
};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, InMemoryTransport, ReqwestTransport, TransportError,
};
