//! Error and outcome types shared by every client operation.

use thiserror::Error;

use crate::storage::StoreError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum OidcError {
    /// A required setting (endpoint, credential, redirect URI) is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Client is already registered")]
    AlreadyRegistered,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, OidcError>;

impl OidcError {
    pub(crate) fn missing(key: &str) -> Self {
        OidcError::Configuration(format!("{} not set", key))
    }
}

/// Why an operation did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The server does not advertise a registration endpoint
    NoRegistrationEndpoint,
    /// The server does not advertise a revocation endpoint
    NoRevocationEndpoint,
    /// No registration record has been persisted
    NotRegistered,
    /// The registration record exists but could not be read
    Unreadable(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoRegistrationEndpoint => write!(
                f,
                "authorization server does not support dynamic client registration"
            ),
            SkipReason::NoRevocationEndpoint => write!(f, "no revocation endpoint set"),
            SkipReason::NotRegistered => write!(f, "client is not registered"),
            SkipReason::Unreadable(reason) => {
                write!(f, "could not read registered client: {}", reason)
            }
        }
    }
}

/// Result of an operation that may be skipped when an optional capability is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Skipped(SkipReason),
}

impl<T> Outcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }
}
