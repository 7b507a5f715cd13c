//! RFC 7591: OAuth 2.0 Dynamic Client Registration
//!
//! Registers this client at the authorization server and keeps the
//! resulting credentials in the registration store.

use serde_json::{json, Map, Value};

use crate::client::{OidcClient, RequestBody};
use crate::config::ClientConfig;
use crate::error::{OidcError, Outcome, Result, SkipReason};
use crate::storage::RegisteredClient;
use crate::transport::{Method, TransportError};

pub const CLIENT_NAME: &str = "OpenID Connect Demo";

/// Replaces the client secret in data meant for display
pub const MASKED_SECRET: &str = "***********************************";

/// Build the registration request body.
///
/// With a template client only the `software_id` is sent; the server fills
/// in the rest.
pub fn registration_payload(config: &ClientConfig) -> Result<Value> {
    if let Some(template) = &config.template_client {
        tracing::info!("Registering client using template_client: {}", template);
        return Ok(json!({ "software_id": template }));
    }

    let base_url = ClientConfig::require(&config.base_url, "base_url")?;
    Ok(json!({
        "client_name": CLIENT_NAME,
        "grant_types": ["implicit", "authorization_code", "refresh_token"],
        "redirect_uris": [format!("{}/callback", base_url.trim_end_matches('/'))],
    }))
}

impl OidcClient {
    /// Register this client at the authorization server.
    ///
    /// Skipped when the server has no registration endpoint. Fails when a
    /// `client_id` is already configured.
    pub fn register(&mut self) -> Result<Outcome<()>> {
        let Some(registration_endpoint) = self.config.registration_endpoint.clone() else {
            tracing::info!(
                "Authorization server does not support Dynamic Client Registration. Please configure client credentials manually"
            );
            return Ok(Outcome::Skipped(SkipReason::NoRegistrationEndpoint));
        };

        if self.config.client_id.is_some() {
            return Err(OidcError::AlreadyRegistered);
        }

        let dcr_access_token =
            if self.config.dcr_client_id.is_some() && self.config.dcr_client_secret.is_some() {
                Some(self.get_registration_token()?)
            } else {
                None
            };

        let payload = registration_payload(&self.config)?;
        tracing::debug!("Registering client with data: {}", payload);

        let response = self.send_json(
            Method::Post,
            &registration_endpoint,
            Some(RequestBody::Json(&payload)),
            dcr_access_token.as_deref(),
        )?;
        let registered = RegisteredClient::from(response);
        tracing::debug!("Registration response: {:?}", registered.as_json());

        // Persist what the server sent before interpreting any of it
        self.store.save(&registered)?;

        match self.read_credentials_from_file() {
            Outcome::Completed(()) => {
                tracing::info!(
                    "Registered client {}",
                    registered.client_id().unwrap_or_default()
                );
                Ok(Outcome::Completed(()))
            }
            Outcome::Skipped(reason) => Err(TransportError::InvalidResponse {
                url: registration_endpoint,
                message: reason.to_string(),
            }
            .into()),
        }
    }

    /// Remove the persisted registration and start over with `config`.
    ///
    /// `client_id` and `client_secret` are cleared from `config` before it
    /// replaces the current configuration.
    pub fn clean_registration(&mut self, mut config: ClientConfig) -> Result<()> {
        self.store.delete()?;

        config.client_id = None;
        config.client_secret = None;
        self.client_data = None;
        self.config = config;
        tracing::info!("Registration removed");
        Ok(())
    }

    /// Copy persisted credentials into the config.
    ///
    /// Read failures are logged and leave the config unchanged.
    pub fn read_credentials_from_file(&mut self) -> Outcome<()> {
        let registered = match self.store.load() {
            Ok(Some(registered)) => registered,
            Ok(None) => {
                tracing::info!("Client is not registered");
                return Outcome::Skipped(SkipReason::NotRegistered);
            }
            Err(e) => {
                tracing::warn!("Could not read credentials from file: {}", e);
                return Outcome::Skipped(SkipReason::Unreadable(e.to_string()));
            }
        };

        let Some(client_id) = registered.client_id() else {
            tracing::warn!("Registered client has no client_id");
            return Outcome::Skipped(SkipReason::Unreadable("client_id missing".into()));
        };

        self.config.client_id = Some(client_id.to_string());
        self.config.client_secret = registered.client_secret().map(str::to_string);
        if let Some(redirect_uri) = registered.redirect_uri() {
            self.config.redirect_uri = Some(redirect_uri.to_string());
        }
        self.client_data = Some(registered);
        Outcome::Completed(())
    }

    /// The registration record with its secret masked, for display.
    pub fn get_client_data(&mut self) -> Option<Map<String, Value>> {
        if self.client_data.is_none() {
            self.read_credentials_from_file();
        }

        self.client_data.as_ref().map(|registered| {
            let mut masked = registered.to_json();
            masked.insert("client_secret".to_string(), json!(MASKED_SECRET));
            masked
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryRegistrationStore, RegistrationStore, StoreError};
    use crate::transport::{HttpResponse, InMemoryTransport};
    use std::sync::Arc;

    const REGISTER: &str = "https://as.example/register";
    const TOKEN: &str = "https://as.example/token";

    /// Shares one in-memory store between the client and the test
    #[derive(Clone, Default)]
    struct SharedStore(Arc<InMemoryRegistrationStore>);

    impl RegistrationStore for SharedStore {
        fn load(&self) -> std::result::Result<Option<RegisteredClient>, StoreError> {
            self.0.load()
        }
        fn save(&self, client: &RegisteredClient) -> std::result::Result<(), StoreError> {
            self.0.save(client)
        }
        fn delete(&self) -> std::result::Result<(), StoreError> {
            self.0.delete()
        }
    }

    /// Store whose content cannot be parsed
    struct BrokenStore;

    impl RegistrationStore for BrokenStore {
        fn load(&self) -> std::result::Result<Option<RegisteredClient>, StoreError> {
            Err(StoreError::Invalid("expected value at line 1 column 1".into()))
        }
        fn save(&self, _: &RegisteredClient) -> std::result::Result<(), StoreError> {
            Err(StoreError::Io("read-only".into()))
        }
        fn delete(&self) -> std::result::Result<(), StoreError> {
            Err(StoreError::Io("read-only".into()))
        }
    }

    fn config() -> ClientConfig {
        let mut config = ClientConfig::with_endpoints("https://as.example/authz", TOKEN);
        config.registration_endpoint = Some(REGISTER.into());
        config.base_url = Some("http://localhost:5443".into());
        config
    }

    fn registration_response() -> Value {
        json!({
            "client_id": "dyn-client",
            "client_secret": "dyn-secret",
            "redirect_uris": ["http://localhost:5443/callback"],
            "client_id_issued_at": 1700000000
        })
    }

    #[test]
    fn payload_for_demo_client() {
        let payload = registration_payload(&config()).unwrap();
        assert_eq!(payload["client_name"], CLIENT_NAME);
        assert_eq!(
            payload["grant_types"],
            json!(["implicit", "authorization_code", "refresh_token"])
        );
        assert_eq!(payload["redirect_uris"], json!(["http://localhost:5443/callback"]));
    }

    #[test]
    fn payload_for_template_client() {
        let mut config = config();
        config.template_client = Some("template-1".into());
        config.base_url = None;
        assert_eq!(
            registration_payload(&config).unwrap(),
            json!({ "software_id": "template-1" })
        );
    }

    #[test]
    fn payload_requires_base_url() {
        let mut config = config();
        config.base_url = None;
        assert!(matches!(
            registration_payload(&config),
            Err(OidcError::Configuration(_))
        ));
    }

    #[test]
    fn register_persists_and_loads_credentials() {
        let transport = InMemoryTransport::new();
        transport.respond_json(REGISTER, registration_response());
        let store = SharedStore::default();
        let mut client =
            OidcClient::with_parts(config(), transport.clone(), store.clone()).unwrap();

        assert_eq!(client.register().unwrap(), Outcome::Completed(()));

        let config = client.config();
        assert_eq!(config.client_id.as_deref(), Some("dyn-client"));
        assert_eq!(config.client_secret.as_deref(), Some("dyn-secret"));
        assert_eq!(config.redirect_uri.as_deref(), Some("http://localhost:5443/callback"));

        let saved = store.load().unwrap().unwrap();
        assert_eq!(Value::Object(saved.to_json()), registration_response());

        let request = &transport.requests_to(REGISTER)[0];
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header("Authorization"), None);
    }

    #[test]
    fn register_twice_fails() {
        let transport = InMemoryTransport::new();
        transport.respond_json(REGISTER, registration_response());
        let mut client =
            OidcClient::with_parts(config(), transport, SharedStore::default()).unwrap();

        client.register().unwrap();
        assert!(matches!(client.register(), Err(OidcError::AlreadyRegistered)));
    }

    #[test]
    fn register_without_endpoint_is_skipped() {
        let transport = InMemoryTransport::new();
        let mut config = config();
        config.registration_endpoint = None;
        let mut client =
            OidcClient::with_parts(config, transport.clone(), SharedStore::default()).unwrap();

        assert_eq!(
            client.register().unwrap(),
            Outcome::Skipped(SkipReason::NoRegistrationEndpoint)
        );
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn register_with_dcr_credentials_sends_bearer_token() {
        let transport = InMemoryTransport::new();
        transport.respond_json(TOKEN, json!({ "access_token": "dcr-token" }));
        transport.respond_json(REGISTER, registration_response());
        let mut config = config();
        config.dcr_client_id = Some("dcr-client".into());
        config.dcr_client_secret = Some("dcr-secret".into());
        let mut client =
            OidcClient::with_parts(config, transport.clone(), SharedStore::default()).unwrap();

        client.register().unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].url, TOKEN);
        assert_eq!(requests[1].url, REGISTER);
        assert_eq!(requests[1].header("Authorization"), Some("Bearer dcr-token"));
    }

    #[test]
    fn failed_registration_leaves_config_untouched() {
        let transport = InMemoryTransport::new();
        transport.respond(
            REGISTER,
            HttpResponse::json(401, &json!({ "error": "invalid_token" })),
        );
        let store = SharedStore::default();
        let mut client = OidcClient::with_parts(config(), transport, store.clone()).unwrap();
        let before = client.config().clone();

        assert!(matches!(client.register(), Err(OidcError::Transport(_))));
        assert_eq!(client.config(), &before);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn invalid_registration_response_is_rejected() {
        let transport = InMemoryTransport::new();
        transport.respond_json(REGISTER, json!({ "client_secret": "no id" }));
        let mut client =
            OidcClient::with_parts(config(), transport, SharedStore::default()).unwrap();

        assert!(matches!(
            client.register(),
            Err(OidcError::Transport(TransportError::InvalidResponse { .. }))
        ));
        assert!(client.config().client_id.is_none());
    }

    #[test]
    fn template_registration_without_redirect_uris_is_kept() {
        let response = json!({
            "client_id": "tpl-client",
            "client_secret": null,
            "software_id": "template-1"
        });
        let transport = InMemoryTransport::new();
        transport.respond_json(REGISTER, response.clone());
        let store = SharedStore::default();
        let mut config = config();
        config.template_client = Some("template-1".into());
        let mut client =
            OidcClient::with_parts(config, transport.clone(), store.clone()).unwrap();

        assert_eq!(client.register().unwrap(), Outcome::Completed(()));
        assert_eq!(client.config().client_id.as_deref(), Some("tpl-client"));
        assert!(client.config().client_secret.is_none());
        assert!(client.config().redirect_uri.is_none());

        // Saved as received, null secret included
        let saved = store.load().unwrap().unwrap();
        assert_eq!(Value::Object(saved.to_json()), response);

        assert!(matches!(client.register(), Err(OidcError::AlreadyRegistered)));
        assert_eq!(transport.requests_to(REGISTER).len(), 1);
    }

    #[test]
    fn construction_loads_persisted_client() {
        let registered: RegisteredClient =
            serde_json::from_value(registration_response()).unwrap();
        let mut config = config();
        config.client_id = Some("manual".into());
        let client = OidcClient::with_parts(
            config,
            InMemoryTransport::new(),
            InMemoryRegistrationStore::with_client(registered),
        )
        .unwrap();

        assert_eq!(client.config().client_id.as_deref(), Some("dyn-client"));
        assert_eq!(
            client.config().redirect_uri.as_deref(),
            Some("http://localhost:5443/callback")
        );
    }

    #[test]
    fn unreadable_store_is_reported_not_raised() {
        let mut config = config();
        config.client_id = Some("manual".into());
        let mut client =
            OidcClient::with_parts(config, InMemoryTransport::new(), BrokenStore).unwrap();

        assert!(matches!(
            client.read_credentials_from_file(),
            Outcome::Skipped(SkipReason::Unreadable(_))
        ));
        assert_eq!(client.config().client_id.as_deref(), Some("manual"));
        assert!(client.get_client_data().is_none());
    }

    #[test]
    fn client_data_masks_secret() {
        let registered: RegisteredClient =
            serde_json::from_value(registration_response()).unwrap();
        let mut client = OidcClient::with_parts(
            config(),
            InMemoryTransport::new(),
            InMemoryRegistrationStore::with_client(registered),
        )
        .unwrap();

        let data = client.get_client_data().unwrap();
        assert_eq!(data["client_secret"], MASKED_SECRET);
        assert_eq!(data["client_id"], "dyn-client");
        assert_eq!(data["client_id_issued_at"], 1700000000);
        // The real secret stays usable
        assert_eq!(client.config().client_secret.as_deref(), Some("dyn-secret"));
    }

    #[test]
    fn clean_registration_resets_config() {
        let transport = InMemoryTransport::new();
        transport.respond_json(REGISTER, registration_response());
        let store = SharedStore::default();
        let mut client = OidcClient::with_parts(config(), transport, store.clone()).unwrap();
        client.register().unwrap();

        let mut fresh = config();
        fresh.client_id = Some("stale".into());
        fresh.client_secret = Some("stale".into());
        client.clean_registration(fresh).unwrap();

        assert!(client.config().client_id.is_none());
        assert!(client.config().client_secret.is_none());
        assert!(store.load().unwrap().is_none());
        assert!(client.get_client_data().is_none());
    }

    #[test]
    fn clean_registration_without_record_fails() {
        let mut client =
            OidcClient::with_parts(config(), InMemoryTransport::new(), SharedStore::default())
                .unwrap();
        let before = client.config().clone();

        let err = client.clean_registration(config()).unwrap_err();
        assert!(matches!(err, OidcError::Persistence(StoreError::NotFound(_))));
        assert_eq!(client.config(), &before);
    }
}
