//! Command-line front end for the OpenID Connect demo client

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use oidc_client::storage::REGISTERED_CLIENT_FILENAME;
use oidc_client::{
    AuthnRequest, ClientConfig, FileRegistrationStore, OidcClient, Outcome, ReqwestTransport,
};

#[derive(Parser, Debug)]
#[command(name = "oidc-client")]
#[command(about = "OpenID Connect demo client")]
struct Cli {
    /// Path to the JSON settings file
    #[arg(long, short, default_value = "settings.json", env = "OIDC_SETTINGS")]
    settings: PathBuf,

    /// Where the dynamically registered client is stored
    #[arg(long, default_value = REGISTERED_CLIENT_FILENAME, env = "OIDC_REGISTERED_CLIENT")]
    registration_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration after discovery
    Discover,

    /// Register this client at the authorization server
    Register,

    /// Print the registered client with its secret masked
    Client,

    /// Build an authorization request URL
    AuthorizeUrl {
        /// Requested authentication context class
        #[arg(long)]
        acr: Option<String>,

        /// Force the user to authenticate again
        #[arg(long)]
        force_authn: bool,

        /// Force the consent screen
        #[arg(long)]
        force_consent: bool,

        /// Allow deselecting consent options (with --force-consent)
        #[arg(long)]
        allow_deselection: bool,

        /// Scope to request (default: configured scope)
        #[arg(long)]
        scope: Option<String>,

        #[arg(long, default_value = "code")]
        response_type: String,
    },

    /// Exchange an authorization code for tokens
    Token { code: String, code_verifier: String },

    /// Refresh tokens
    Refresh { refresh_token: String },

    /// Revoke a token
    Revoke {
        token: String,

        #[arg(long, default_value = "access_token")]
        hint: String,
    },

    /// Remove the registered client
    Clean,
}

#[derive(Serialize)]
struct AuthorizeOutput {
    url: String,
    session: BTreeMap<String, String>,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report<T>(outcome: Outcome<T>) {
    if let Outcome::Skipped(reason) = outcome {
        tracing::warn!("Nothing done: {}", reason);
    }
}

const INFO_FILTER: &str = "oidc_client=info";
const DEBUG_FILTER: &str = "oidc_client=debug";

/// Switch to debug logging when the settings ask for it. An explicit
/// `RUST_LOG` always wins.
fn apply_debug_setting<S>(
    handle: &reload::Handle<EnvFilter, S>,
    debug: bool,
    from_env: bool,
) -> anyhow::Result<()> {
    if debug && !from_env {
        handle.reload(EnvFilter::new(DEBUG_FILTER))?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging is up before the settings are read so their load is reported
    let env_filter = EnvFilter::try_from_default_env();
    let from_env = env_filter.is_ok();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|_| INFO_FILTER.into()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::load(&cli.settings)?;
    apply_debug_setting(&filter_handle, config.debug, from_env)?;

    let transport = ReqwestTransport::from_config(&config)?;
    let store = FileRegistrationStore::new(&cli.registration_file);
    let mut client = OidcClient::with_parts(config.clone(), transport, store)
        .context("Failed to initialize client")?;

    match cli.command {
        Command::Discover => print_json(client.config())?,
        Command::Register => {
            report(client.register()?);
            if let Some(data) = client.get_client_data() {
                print_json(&data)?;
            }
        }
        Command::Client => match client.get_client_data() {
            Some(data) => print_json(&data)?,
            None => tracing::warn!("Client is not registered"),
        },
        Command::AuthorizeUrl {
            acr,
            force_authn,
            force_consent,
            allow_deselection,
            scope,
            response_type,
        } => {
            let request = AuthnRequest {
                acr,
                force_authn,
                scope,
                force_consent,
                allow_consent_option_deselection: allow_deselection,
                response_type,
            };
            let mut session = BTreeMap::new();
            let url = client.get_authn_req_url(&mut session, &request)?;
            print_json(&AuthorizeOutput { url, session })?;
        }
        Command::Token {
            code,
            code_verifier,
        } => print_json(&client.get_token(&code, &code_verifier)?)?,
        Command::Refresh { refresh_token } => print_json(&client.refresh(&refresh_token)?)?,
        Command::Revoke { token, hint } => report(client.revoke(&token, &hint)?),
        Command::Clean => client
            .clean_registration(config)
            .context("Failed to remove registration")?,
    }

    Ok(())
}
