pub mod composer;
pub mod pay_request;
pub mod poller;

#[cfg(test)]
mod testing;

use async_trait::async_trait;
use core_types::{Account, DEFAULT_COMMENT_ALLOWED};
use ln_backends::commando::CommandoPool;
use ln_backends::{Backend, BackendConnector, ConnectorSettings, LightningBackend};
use nostr_engine::RelayPublisherSettings;
use nostr_sdk::prelude::{FromSkStr, Keys};
use serde::{Deserialize, Serialize};
use slog::Logger;
use xerror::ln_backend::BackendError;

use std::sync::Arc;

pub use composer::{compose_invoice, InvoiceContext};
pub use pay_request::{PayEngine, PayOutcome, PayRequest};
pub use poller::{spawn_settlement_watch, PaymentSession, PollPhase, SettlementWatcher};

fn default_comment_allowed() -> usize {
    DEFAULT_COMMENT_ALLOWED
}

fn default_notify_nostr_users() -> bool {
    true
}

fn default_poll_attempts() -> u32 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PayEngineSettings {
    /// Hex or nsec. Zaps are only accepted when set.
    #[serde(default)]
    pub nostr_private_key: Option<String>,
    #[serde(default = "default_comment_allowed")]
    pub comment_allowed: usize,
    #[serde(default = "default_notify_nostr_users")]
    pub notify_nostr_users: bool,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub connector: ConnectorSettings,
    #[serde(default)]
    pub relays: RelayPublisherSettings,
}

impl Default for PayEngineSettings {
    fn default() -> Self {
        Self {
            nostr_private_key: None,
            comment_allowed: default_comment_allowed(),
            notify_nostr_users: default_notify_nostr_users(),
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            connector: ConnectorSettings::default(),
            relays: RelayPublisherSettings::default(),
        }
    }
}

impl PayEngineSettings {
    pub fn server_keys(&self) -> Result<Option<Keys>, nostr_sdk::nostr::key::Error> {
        match self.nostr_private_key.as_deref().filter(|key| !key.is_empty()) {
            Some(key) => Keys::from_sk_str(key).map(Some),
            None => Ok(None),
        }
    }
}

/// Read-only view on the account records, keyed by name and domain.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, name: &str, domain: &str) -> Result<Option<Account>, String>;
}

/// Turns an account into something invoices can be created on.
pub trait BackendFactory: Send + Sync {
    fn backend_for(&self, account: &Account) -> Result<Arc<dyn LightningBackend>, BackendError>;
}

/// Builds a [`BackendConnector`] per request, sharing Commando sockets.
pub struct ConnectorFactory {
    settings: ConnectorSettings,
    commando_pool: CommandoPool,
    logger: Logger,
}

impl ConnectorFactory {
    pub fn new(settings: ConnectorSettings, logger: Logger) -> Self {
        Self {
            settings,
            commando_pool: CommandoPool::default(),
            logger,
        }
    }
}

impl BackendFactory for ConnectorFactory {
    fn backend_for(&self, account: &Account) -> Result<Arc<dyn LightningBackend>, BackendError> {
        let connector = BackendConnector::new(
            Backend::from_account(account),
            self.settings.clone(),
            &self.commando_pool,
            self.logger.clone(),
        )?;
        Ok(Arc::new(connector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = serde_json::from_str::<PayEngineSettings>("{}").unwrap();
        assert_eq!(settings.comment_allowed, 500);
        assert_eq!(settings.poll_attempts, 60);
        assert_eq!(settings.poll_interval_ms, 1000);
        assert!(settings.notify_nostr_users);
        assert!(settings.server_keys().unwrap().is_none());
    }

    #[test]
    fn test_server_keys_from_hex() {
        let keys = Keys::generate();
        let settings = PayEngineSettings {
            nostr_private_key: Some(keys.secret_key().unwrap().display_secret().to_string()),
            ..Default::default()
        };
        let parsed = settings.server_keys().unwrap().unwrap();
        assert_eq!(parsed.public_key(), keys.public_key());

        let settings = PayEngineSettings {
            nostr_private_key: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(settings.server_keys().is_err());
    }

    #[tokio::test]
    async fn test_connector_factory_dispatches_on_kind() {
        let factory = ConnectorFactory::new(ConnectorSettings::default(), utils::xlogging::discard());
        let account = Account {
            name: "alice".to_string(),
            domain: "example.com".to_string(),
            kind: "lnbits".to_string(),
            host: "https://legend.lnbits.com".to_string(),
            key: "invoice-key".to_string(),
            ..Default::default()
        };
        let backend = factory.backend_for(&account).unwrap();
        assert_eq!(backend.kind_name(), "lnbits");
        assert!(backend.supports_settlement_check());
    }
}
