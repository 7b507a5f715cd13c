//! Persistent storage for the dynamically registered client

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// File the registration response is written to, relative to the working directory
pub const REGISTERED_CLIENT_FILENAME: &str = "registered_client.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Registered client not found at {0}")]
    NotFound(String),

    #[error("Invalid registered client data: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Invalid(e.to_string())
    }
}

/// A client registered at the authorization server (RFC 7591 response).
///
/// Holds the response object exactly as received, nulls and unknown keys
/// included, so saving it writes the server's answer back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisteredClient(Map<String, Value>);

impl From<Map<String, Value>> for RegisteredClient {
    fn from(data: Map<String, Value>) -> Self {
        Self(data)
    }
}

impl RegisteredClient {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.str_field("client_id")
    }

    /// `None` for public clients, including an explicit `null`
    pub fn client_secret(&self) -> Option<&str> {
        self.str_field("client_secret")
    }

    /// First entry of `redirect_uris`, if the server returned any
    pub fn redirect_uri(&self) -> Option<&str> {
        self.0
            .get("redirect_uris")
            .and_then(Value::as_array)
            .and_then(|uris| uris.first())
            .and_then(Value::as_str)
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.0.clone()
    }
}

/// Storage backend for the registration record.
pub trait RegistrationStore {
    /// Load the record; `Ok(None)` when nothing has been saved
    fn load(&self) -> Result<Option<RegisteredClient>, StoreError>;

    /// Save the record, replacing any previous one
    fn save(&self, client: &RegisteredClient) -> Result<(), StoreError>;

    /// Delete the record; fails if there is none
    fn delete(&self) -> Result<(), StoreError>;
}

impl<T: RegistrationStore + ?Sized> RegistrationStore for Box<T> {
    fn load(&self) -> Result<Option<RegisteredClient>, StoreError> {
        (**self).load()
    }

    fn save(&self, client: &RegisteredClient) -> Result<(), StoreError> {
        (**self).save(client)
    }

    fn delete(&self) -> Result<(), StoreError> {
        (**self).delete()
    }
}

/// Stores the record as a JSON file.
pub struct FileRegistrationStore {
    path: PathBuf,
}

impl Default for FileRegistrationStore {
    fn default() -> Self {
        Self::new(REGISTERED_CLIENT_FILENAME)
    }
}

impl FileRegistrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to a temp file next to the target, then rename over it.
    fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
        let temp_path = path.with_extension(format!("{}.tmp", generate_random_string(8)));

        if let Err(e) = std::fs::write(&temp_path, content) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
        if let Err(e) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
        Ok(())
    }
}

impl RegistrationStore for FileRegistrationStore {
    fn load(&self) -> Result<Option<RegisteredClient>, StoreError> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let client: RegisteredClient = serde_json::from_str(&content)?;
        tracing::debug!("Loaded registered client from {:?}", self.path);
        Ok(Some(client))
    }

    fn save(&self, client: &RegisteredClient) -> Result<(), StoreError> {
        let content = serde_json::to_string(client)?;
        Self::atomic_write(&self.path, &content)?;
        tracing::info!("Saved registered client to {:?}", self.path);
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        std::fs::remove_file(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(self.path.display().to_string())
            } else {
                StoreError::from(e)
            }
        })?;
        tracing::info!("Removed registered client file {:?}", self.path);
        Ok(())
    }
}

/// In-memory store for testing.
#[derive(Default)]
pub struct InMemoryRegistrationStore {
    client: RwLock<Option<RegisteredClient>>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: RegisteredClient) -> Self {
        Self {
            client: RwLock::new(Some(client)),
        }
    }
}

impl RegistrationStore for InMemoryRegistrationStore {
    fn load(&self) -> Result<Option<RegisteredClient>, StoreError> {
        Ok(self.client.read().unwrap().clone())
    }

    fn save(&self, client: &RegisteredClient) -> Result<(), StoreError> {
        *self.client.write().unwrap() = Some(client.clone());
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        match self.client.write().unwrap().take() {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound("memory".into())),
        }
    }
}

// --- Utility Functions ---

/// Generate a cryptographically secure random string
pub fn generate_random_string(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
