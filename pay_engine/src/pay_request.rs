use core_types::{msat_to_sat, Account, Msat, MSATS_IN_SAT};
use ln_backends::LightningBackend;
use msgs::lnurl::{PayParams, PayValues, PAY_REQUEST_TAG};
use nostr_engine::notify::wants_notification;
use nostr_engine::{Notifier, RelayPublisher};
use nostr_sdk::prelude::Keys;
use slog as log;
use slog::Logger;
use tokio::task::JoinHandle;
use utils::lnurl::Metadata;
use utils::nostr::{check_comment, zap_context, ZapRequest};
use xerror::pay::PayError;

use std::sync::Arc;
use std::time::Duration;

use crate::composer::{compose_invoice, InvoiceContext};
use crate::poller::{spawn_settlement_watch, PaymentSession, PollPhase, SettlementWatcher};
use crate::{BackendFactory, PayEngineSettings};

pub const VERIFICATION_AMOUNT_MSAT: Msat = MSATS_IN_SAT;

/// Second LNURL-pay step, as parsed from the callback query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayRequest {
    pub amount_msat: Msat,
    /// Raw zap request JSON.
    pub nostr: Option<String>,
    pub comment: Option<String>,
    pub payer_data: Option<String>,
}

#[derive(Debug)]
pub struct PayOutcome {
    pub values: PayValues,
    /// Settlement watch, when the payment has to be announced.
    pub watch: Option<JoinHandle<PollPhase>>,
}

#[derive(Clone)]
pub struct PayEngine {
    settings: Arc<PayEngineSettings>,
    backends: Arc<dyn BackendFactory>,
    publisher: RelayPublisher,
    keys: Option<Keys>,
    logger: Logger,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

impl PayEngine {
    pub fn new(
        settings: PayEngineSettings,
        keys: Option<Keys>,
        backends: Arc<dyn BackendFactory>,
        publisher: RelayPublisher,
        logger: Logger,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            backends,
            publisher,
            keys,
            logger,
        }
    }

    pub fn accepts_zaps(&self) -> bool {
        self.keys.is_some()
    }

    pub fn pay_params(&self, account: &Account, callback: &str) -> PayParams {
        let (min_sendable, max_sendable) = account.sendable_bounds();
        let nostr_pubkey = self.keys.as_ref().map(|keys| keys.public_key().to_string());
        PayParams {
            callback: callback.to_string(),
            min_sendable,
            max_sendable,
            metadata: Metadata::for_account(account).encode(),
            comment_allowed: self.settings.comment_allowed,
            tag: PAY_REQUEST_TAG.to_string(),
            allows_nostr: Some(nostr_pubkey.is_some()),
            nostr_pubkey,
        }
    }

    pub async fn handle_pay_request(&self, account: &Account, request: &PayRequest) -> Result<PayOutcome, PayError> {
        let amount = request.amount_msat;
        if !account.is_sendable(amount) {
            let (min, max) = account.sendable_bounds();
            return Err(PayError::AmountOutOfBounds(msat_to_sat(min), msat_to_sat(max)));
        }

        if let Some(payer_data) = non_empty(&request.payer_data) {
            if let Err(err) = serde_json::from_str::<serde_json::Value>(payer_data) {
                log::warn!(self.logger, "Ignoring invalid payer data for {}: {}", account.address(), err);
            }
        }

        let comment = non_empty(&request.comment);
        if let Some(comment) = comment {
            check_comment(comment, self.settings.comment_allowed)?;
            log::debug!(self.logger, "Comment for {}: {}", account.address(), comment);
        }

        let zap = match (non_empty(&request.nostr), self.accepts_zaps()) {
            (Some(raw), true) => {
                let zap = zap_context(raw, comment, amount, self.settings.comment_allowed).map_err(|err| {
                    log::info!(self.logger, "Rejected zap request for {}: {}", account.address(), err);
                    err
                })?;
                log::info!(self.logger, "Accepted zap request {} for {}", zap.event.id.to_hex(), account.address());
                Some(zap)
            }
            (Some(_), false) => {
                log::debug!(self.logger, "No server key, handling zap for {} as plain payment", account.address());
                None
            }
            (None, _) => None,
        };

        let context = zap.clone().map_or(InvoiceContext::Plain, InvoiceContext::Zap);
        let backend = self.backends.backend_for(account)?;
        let bolt11 = compose_invoice(backend.as_ref(), account, amount, &context, &self.logger).await?;

        let watch = self.watch_settlement(account, backend, &bolt11, amount, zap);
        Ok(PayOutcome {
            values: PayValues::new(bolt11),
            watch,
        })
    }

    /// 1 sat invoice showing `pin` to the wallet owner.
    pub async fn verification_invoice(&self, account: &Account, pin: &str) -> Result<String, PayError> {
        let backend = self.backends.backend_for(account)?;
        let context = InvoiceContext::Pin(pin.to_string());
        let bolt11 = compose_invoice(backend.as_ref(), account, VERIFICATION_AMOUNT_MSAT, &context, &self.logger).await?;
        Ok(bolt11)
    }

    fn watch_settlement(
        &self,
        account: &Account,
        backend: Arc<dyn LightningBackend>,
        bolt11: &str,
        amount_msat: Msat,
        zap: Option<ZapRequest>,
    ) -> Option<JoinHandle<PollPhase>> {
        let notifier = match &self.keys {
            Some(keys) if self.settings.notify_nostr_users && wants_notification(account, zap.as_ref()) => Some(
                Notifier::new(keys.clone(), self.publisher.clone(), self.logger.clone()),
            ),
            _ => None,
        };
        if zap.is_none() && notifier.is_none() {
            return None;
        }

        let expected_description_hash = match &zap {
            Some(zap) => zap.description_hash(),
            None => Metadata::for_account(account).description_hash(),
        };
        let session = match PaymentSession::new(
            account.clone(),
            bolt11,
            amount_msat,
            expected_description_hash,
            zap,
            self.settings.poll_attempts,
            Duration::from_millis(self.settings.poll_interval_ms),
        ) {
            Ok(session) => session,
            Err(err) => {
                log::warn!(self.logger, "Not watching invoice for {}: {}", account.address(), err);
                return None;
            }
        };

        let watcher = SettlementWatcher {
            backend,
            publisher: self.publisher.clone(),
            notifier,
            keys: self.keys.clone(),
            logger: self.logger.clone(),
        };
        Some(spawn_settlement_watch(session, watcher))
    }
}
