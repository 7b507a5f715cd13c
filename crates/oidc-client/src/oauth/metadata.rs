//! OpenID Connect Discovery
//!
//! Fetches `{issuer}/.well-known/openid-configuration` and merges the
//! returned metadata into the client configuration.

use crate::client::OidcClient;
use crate::error::Result;
use crate::transport::Method;

pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Discovery document URL for an issuer
pub fn discovery_url(issuer: &str) -> String {
    format!("{}{}", issuer.trim_end_matches('/'), WELL_KNOWN_PATH)
}

impl OidcClient {
    /// Merge the issuer's metadata into the config. Returns `false` when no
    /// issuer is configured.
    pub(crate) fn discover(&mut self) -> Result<bool> {
        let Some(issuer) = self.config.issuer.as_deref() else {
            tracing::info!(
                "Found no issuer in config, can not perform discovery. All endpoint config needs to be set manually"
            );
            return Ok(false);
        };

        let url = discovery_url(issuer);
        tracing::info!("Fetching config from: {}", url);

        let metadata = self.send_json(Method::Get, &url, None, None)?;
        tracing::debug!("Discovery document has {} keys", metadata.len());
        self.config.merge(metadata)?;
        Ok(true)
    }
}
