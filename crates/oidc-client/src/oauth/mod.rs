//! OpenID Connect / OAuth 2.0 client operations
//!
//! Implements:
//! - OpenID Connect Discovery 1.0
//! - RFC 7591: OAuth 2.0 Dynamic Client Registration
//! - Authorization Code flow with PKCE (RFC 7636)
//! - Token exchange, refresh and revocation (RFC 7009)

pub mod authorize;
pub mod metadata;
pub mod registration;
pub mod token;
