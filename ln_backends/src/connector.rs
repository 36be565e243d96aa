use async_trait::async_trait;
use core_types::Msat;
use serde::{Deserialize, Serialize};
use slog as log;
use slog::Logger;
use xerror::ln_backend::BackendError;

use std::sync::Arc;
use std::time::Duration;

use crate::commando::{CommandoClient, CommandoPool};
use crate::descriptor::Backend;
use crate::{eclair, lnbits, lnd, lnpay, sparko, strike};

pub const DEFAULT_TOR_PROXY_URL: &str = "socks5://127.0.0.1:9050";

fn default_request_timeout_secs() -> u64 {
    25
}

fn default_tor_proxy_url() -> String {
    DEFAULT_TOR_PROXY_URL.to_string()
}

fn default_commando_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_lnpay_url() -> String {
    "https://api.lnpay.co".to_string()
}

fn default_strike_url() -> String {
    "https://api.strike.me".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConnectorSettings {
    /// Tor users can be slow.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_tor_proxy_url")]
    pub tor_proxy_url: String,
    /// Asks LND to add route hints for private channels.
    #[serde(default)]
    pub lnd_private_only: bool,
    /// Unused commando clients are dropped after this long.
    #[serde(default = "default_commando_idle_timeout_secs")]
    pub commando_idle_timeout_secs: u64,
    #[serde(default = "default_lnpay_url")]
    pub lnpay_url: String,
    #[serde(default = "default_strike_url")]
    pub strike_url: String,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            tor_proxy_url: default_tor_proxy_url(),
            lnd_private_only: false,
            commando_idle_timeout_secs: default_commando_idle_timeout_secs(),
            lnpay_url: default_lnpay_url(),
            strike_url: default_strike_url(),
        }
    }
}

impl ConnectorSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Either the literal invoice description or the source whose SHA-256 goes
/// into the invoice as its description hash. Never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceDescription {
    Literal(String),
    HashOf(String),
}

impl InvoiceDescription {
    pub fn text(&self) -> &str {
        match self {
            InvoiceDescription::Literal(text) | InvoiceDescription::HashOf(text) => text,
        }
    }

    pub fn use_description_hash(&self) -> bool {
        matches!(self, InvoiceDescription::HashOf(_))
    }

    /// Hex SHA-256 of the hash source.
    pub fn hash_hex(&self) -> Option<String> {
        match self {
            InvoiceDescription::HashOf(source) => Some(sha256::digest(source.as_str())),
            InvoiceDescription::Literal(_) => None,
        }
    }

    pub fn hash_bytes(&self) -> Option<Vec<u8>> {
        self.hash_hex().and_then(|hash| hex::decode(hash).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRequest {
    pub msat: Msat,
    pub description: InvoiceDescription,
    /// Client chosen idempotency key, only sent to CLN based backends.
    pub label: String,
}

#[async_trait]
pub trait LightningBackend: Send + Sync {
    fn kind_name(&self) -> &str;

    fn supports_settlement_check(&self) -> bool;

    /// Returns the bolt11 invoice.
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<String, BackendError>;

    /// Whether the invoice with `payment_hash` (hex) has been paid.
    async fn check_settlement(&self, payment_hash: &str) -> Result<bool, BackendError>;
}

/// Talks to the node described by a [`Backend`].
pub struct BackendConnector {
    backend: Backend,
    settings: ConnectorSettings,
    http: reqwest::Client,
    commando: Option<Arc<CommandoClient>>,
    logger: Logger,
}

impl BackendConnector {
    pub fn new(
        backend: Backend,
        settings: ConnectorSettings,
        commando_pool: &CommandoPool,
        logger: Logger,
    ) -> Result<Self, BackendError> {
        let http = build_http_client(&backend, &settings)?;
        let commando = match &backend {
            Backend::Commando(params) => Some(commando_pool.client(params, &settings, logger.clone())?),
            _ => None,
        };
        Ok(Self {
            backend,
            settings,
            http,
            commando,
            logger,
        })
    }

    fn commando(&self) -> Result<&CommandoClient, BackendError> {
        self.commando
            .as_deref()
            .ok_or_else(|| BackendError::InvalidConfiguration("commando client not initialised".to_string()))
    }
}

fn build_http_client(backend: &Backend, settings: &ConnectorSettings) -> Result<reqwest::Client, BackendError> {
    let mut builder = reqwest::Client::builder().timeout(settings.request_timeout());

    if let Some(cert) = backend.certificate() {
        let cert = reqwest::Certificate::from_pem(cert.as_bytes())
            .map_err(|err| BackendError::InvalidConfiguration(format!("invalid certificate: {err}")))?;
        builder = builder.add_root_certificate(cert);
    } else if backend.is_self_hosted() {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if backend.is_onion() {
        let proxy = reqwest::Proxy::all(&settings.tor_proxy_url)
            .map_err(|err| BackendError::InvalidConfiguration(format!("invalid tor proxy: {err}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|err| BackendError::InvalidConfiguration(err.to_string()))
}

#[async_trait]
impl LightningBackend for BackendConnector {
    fn kind_name(&self) -> &str {
        self.backend.kind_name()
    }

    fn supports_settlement_check(&self) -> bool {
        self.backend.supports_settlement_check()
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<String, BackendError> {
        let kind = self.kind_name().to_string();
        log::debug!(
            self.logger,
            "Creating invoice on {}, msat: {}, description hash: {}",
            kind,
            request.msat,
            request.description.use_description_hash()
        );
        let result = match &self.backend {
            Backend::Lnd(params) => lnd::create_invoice(&self.http, params, request, self.settings.lnd_private_only).await,
            Backend::LnBits(params) => lnbits::create_invoice(&self.http, params, request).await,
            Backend::Sparko(params) => sparko::create_invoice(&self.http, params, request).await,
            Backend::Commando(_) => self.commando()?.create_invoice(request).await,
            Backend::LnPay(params) => lnpay::create_invoice(&self.http, &self.settings.lnpay_url, params, request).await,
            Backend::Eclair(params) => eclair::create_invoice(&self.http, params, request).await,
            Backend::Strike(params) => strike::create_invoice(&self.http, &self.settings.strike_url, params, request).await,
            Backend::Unsupported(kind) => return Err(BackendError::UnsupportedBackend(kind.clone())),
        };
        result.map_err(|err| err.during_invoice_creation(&kind))
    }

    async fn check_settlement(&self, payment_hash: &str) -> Result<bool, BackendError> {
        let kind = self.kind_name().to_string();
        let result = match &self.backend {
            Backend::Lnd(params) => lnd::check_settlement(&self.http, params, payment_hash).await,
            Backend::LnBits(params) => lnbits::check_settlement(&self.http, params, payment_hash).await,
            Backend::Sparko(params) => sparko::check_settlement(&self.http, params, payment_hash).await,
            Backend::Commando(_) => self.commando()?.check_settlement(payment_hash).await,
            Backend::LnPay(_) | Backend::Eclair(_) | Backend::Strike(_) => {
                return Err(BackendError::SettlementCheckUnsupported(kind))
            }
            Backend::Unsupported(kind) => return Err(BackendError::UnsupportedBackend(kind.clone())),
        };
        result.map_err(|err| err.during_status_check(&kind))
    }
}

/// Reads a JSON body, turning non-success statuses into a transport error
/// carrying the start of the body.
pub(crate) async fn json_body(response: reqwest::Response) -> Result<serde_json::Value, BackendError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|err| BackendError::Transport(err.to_string()))?;
    if !status.is_success() {
        let excerpt = text.chars().take(300).collect::<String>();
        return Err(BackendError::Transport(format!("status {status}: {excerpt}")));
    }
    serde_json::from_str(&text).map_err(|err| BackendError::Transport(format!("invalid response: {err}")))
}

pub(crate) fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

pub(crate) fn string_field(body: &serde_json::Value, field: &str) -> Result<String, BackendError> {
    body.get(field)
        .and_then(|value| value.as_str())
        .map(|value| value.to_string())
        .ok_or_else(|| BackendError::Transport(format!("response has no '{field}'")))
}

/// Sat denominated APIs would silently round the amount down, which breaks
/// the amount a zap request commits to.
pub(crate) fn whole_sats(kind: &str, msat: Msat) -> Result<u64, BackendError> {
    if msat % core_types::MSATS_IN_SAT != 0 {
        return Err(BackendError::FractionalAmount(kind.to_string(), msat));
    }
    Ok(core_types::msat_to_sat(msat))
}

pub(crate) fn url(host: &str, path: &str) -> String {
    format!("{}{}", host.trim_end_matches('/'), path)
}
