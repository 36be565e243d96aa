use actix_cors::Cors;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use core_types::Account;
use nostr_engine::{RelayPublisher, WsRelayConnector};
use pay_engine::{AccountStore, ConnectorFactory, PayEngine, PayEngineSettings};
use serde::{Deserialize, Serialize};
use slog as log;
use utils::xlogging::{init_log, LoggingSettings};

use std::io;
use std::sync::Arc;

pub mod routes;
pub mod store;

use store::ConfigAccountStore;

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Serialize, Deserialize, Clone)]
pub struct ApiSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Comma separated. With several domains the request host picks one.
    pub domain: String,
    pub logging: LoggingSettings,
    #[serde(default)]
    pub pay_engine: PayEngineSettings,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

pub struct AppState {
    pub engine: PayEngine,
    pub store: Arc<dyn AccountStore>,
    pub domains: Vec<String>,
}

pub type WebState = Data<AppState>;

pub fn parse_domains(domains: &str) -> Vec<String> {
    domains
        .split(',')
        .map(|domain| domain.trim().to_lowercase())
        .filter(|domain| !domain.is_empty())
        .collect()
}

/// A single configured domain is served whatever the host, otherwise the
/// host (port stripped) has to be one of them.
pub fn resolve_domain(domains: &[String], host: &str) -> Option<String> {
    if let [domain] = domains {
        return Some(domain.clone());
    }
    let host = host.split(':').next().unwrap_or_default().to_lowercase();
    domains.iter().find(|domain| **domain == host).cloned()
}

pub async fn start(settings: ApiSettings) -> io::Result<()> {
    let logger = init_log(&settings.logging)?;
    let keys = settings
        .pay_engine
        .server_keys()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid nostr private key: {err}")))?;
    if keys.is_none() {
        log::warn!(logger, "No nostr private key configured, zaps are disabled");
    }

    let relay_settings = settings.pay_engine.relays.clone();
    let connector = Arc::new(WsRelayConnector::new(&relay_settings, logger.clone()));
    let publisher = RelayPublisher::new(relay_settings, connector, logger.clone());
    let backends = Arc::new(ConnectorFactory::new(settings.pay_engine.connector.clone(), logger.clone()));
    let engine = PayEngine::new(settings.pay_engine.clone(), keys, backends, publisher, logger.clone());

    let domains = parse_domains(&settings.domain);
    let default_domain = domains.first().cloned().unwrap_or_default();
    let store = Arc::new(ConfigAccountStore::new(settings.accounts.clone(), &default_domain));
    log::info!(
        logger,
        "Serving {} accounts on {} at {}",
        store.len(),
        domains.join(","),
        settings.bind_address
    );

    let state = Data::new(AppState {
        engine,
        store,
        domains,
    });

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(&settings.bind_address)?
    .run()
    .await
}
