//! Mocks shared by the pay engine tests.

use async_trait::async_trait;
use core_types::Account;
use ln_backends::{InvoiceRequest, LightningBackend};
use nostr_engine::{RelayConnection, RelayConnector, RelayPublisher, RelayPublisherSettings};
use nostr_sdk::nostr::event::{EventBuilder, Kind, Tag, TagKind};
use nostr_sdk::prelude::{Event, Keys};
use xerror::ln_backend::BackendError;
use xerror::nostr::RelayError;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::BackendFactory;

pub const DEFAULT_RELAY: &str = "wss://default.relay";
pub const ZAP_RELAY: &str = "wss://zap.relay";
pub const OWNER_RELAY: &str = "wss://owner.relay";

pub fn account() -> Account {
    Account {
        name: "alice".to_string(),
        domain: "example.com".to_string(),
        kind: "lnbits".to_string(),
        host: "https://legend.lnbits.com".to_string(),
        key: "invoice-key".to_string(),
        min_sendable: Some(1_000),
        max_sendable: Some(1_000_000_000),
        relays: vec![OWNER_RELAY.to_string()],
        ..Default::default()
    }
}

/// Signed zap request for 21 sats to a fresh recipient, published to
/// [`ZAP_RELAY`].
pub fn zap_request_json(sender: &Keys, content: &str) -> String {
    let tags = vec![
        Tag::PubKey(Keys::generate().public_key(), None),
        Tag::Generic(TagKind::Custom("relays".to_string()), vec![format!("{ZAP_RELAY}/")]),
        Tag::Generic(TagKind::Custom("amount".to_string()), vec!["21000".to_string()]),
    ];
    let request = EventBuilder::new(Kind::Custom(9734), content, &tags)
        .to_event(sender)
        .unwrap();
    serde_json::to_string(&request).unwrap()
}

/// LNbits-like backend signing real invoices over the requested
/// description.
pub struct MockBackend {
    pub settlement_check: bool,
    pub fail_invoices: bool,
    /// Checks at and after this one report the invoice paid.
    pub paid_on_check: Option<usize>,
    /// The first `failing_checks` checks error out.
    pub failing_checks: usize,
    /// Commit the invoice to this instead of the requested description.
    pub committed_source: Option<String>,
    pub requests: Mutex<Vec<InvoiceRequest>>,
    pub checks: AtomicUsize,
}

impl MockBackend {
    pub fn lnbits() -> Self {
        Self {
            settlement_check: true,
            fail_invoices: false,
            paid_on_check: None,
            failing_checks: 0,
            committed_source: None,
            requests: Mutex::new(Vec::new()),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn last_request(&self) -> InvoiceRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    pub fn invoice_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LightningBackend for MockBackend {
    fn kind_name(&self) -> &str {
        "lnbits"
    }

    fn supports_settlement_check(&self) -> bool {
        self.settlement_check
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<String, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_invoices {
            return Err(BackendError::InvoiceCreationFailed(
                "lnbits".to_string(),
                "connection refused".to_string(),
            ));
        }
        let source = self
            .committed_source
            .clone()
            .unwrap_or_else(|| request.description.text().to_string());
        Ok(ln_backends::testing::signed_invoice(request.msat, &source, [9; 32]))
    }

    async fn check_settlement(&self, _payment_hash: &str) -> Result<bool, BackendError> {
        let check = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        if check <= self.failing_checks {
            return Err(BackendError::StatusCheckFailed("lnbits".to_string(), "timed out".to_string()));
        }
        Ok(self.paid_on_check.map_or(false, |paid_on| check >= paid_on))
    }
}

pub struct MockFactory(pub Arc<MockBackend>);

impl BackendFactory for MockFactory {
    fn backend_for(&self, _account: &Account) -> Result<Arc<dyn LightningBackend>, BackendError> {
        let backend: Arc<dyn LightningBackend> = self.0.clone();
        Ok(backend)
    }
}

/// Accepts everything and keeps what was published where.
#[derive(Default)]
pub struct Recorder {
    pub published: Mutex<Vec<(String, Event)>>,
}

impl Recorder {
    pub fn of_kind(&self, kind: u64) -> Vec<(String, Event)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event)| event.kind.as_u64() == kind)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

struct RecordingConnector(Arc<Recorder>);

struct RecordingConnection {
    url: String,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl RelayConnector for RecordingConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn RelayConnection>, RelayError> {
        Ok(Arc::new(RecordingConnection {
            url: url.to_string(),
            recorder: self.0.clone(),
        }))
    }
}

#[async_trait]
impl RelayConnection for RecordingConnection {
    async fn publish(&self, event: &Event) -> Result<(), RelayError> {
        self.recorder
            .published
            .lock()
            .unwrap()
            .push((self.url.clone(), event.clone()));
        Ok(())
    }

    async fn close(&self) {}
}

pub fn recording_publisher() -> (RelayPublisher, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let settings = RelayPublisherSettings {
        default_relays: vec![DEFAULT_RELAY.to_string()],
        ..Default::default()
    };
    let publisher = RelayPublisher::new(
        settings,
        Arc::new(RecordingConnector(recorder.clone())),
        utils::xlogging::discard(),
    );
    (publisher, recorder)
}
