use core_types::{Account, Msat};
use ln_backends::bolt11::{decode, DecodedInvoice};
use ln_backends::LightningBackend;
use nostr_engine::{Notifier, RelayPublisher};
use nostr_sdk::prelude::Keys;
use slog as log;
use slog::Logger;
use tokio::task::JoinHandle;
use utils::nostr::{build_receipt, ZapRequest};
use xerror::ln_backend::BackendError;

use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Polling,
    Paid,
    /// The attempt budget ran out without settlement.
    TimedOut,
    /// The backend cannot report settlement, nothing was polled.
    Unsupported,
}

impl PollPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollPhase::Polling)
    }
}

/// One invoice being watched. Owned by exactly one task.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub account: Account,
    pub bolt11: String,
    pub invoice: DecodedInvoice,
    pub amount_msat: Msat,
    /// Hex SHA-256 of the description-hash source.
    pub expected_description_hash: String,
    pub zap: Option<ZapRequest>,
    pub attempts: u32,
    pub interval: Duration,
    phase: PollPhase,
}

impl PaymentSession {
    pub fn new(
        account: Account,
        bolt11: &str,
        amount_msat: Msat,
        expected_description_hash: String,
        zap: Option<ZapRequest>,
        attempts: u32,
        interval: Duration,
    ) -> Result<Self, BackendError> {
        let invoice = decode(bolt11)?;
        Ok(Self {
            account,
            bolt11: bolt11.to_string(),
            invoice,
            amount_msat,
            expected_description_hash,
            zap,
            attempts,
            interval,
            phase: PollPhase::Polling,
        })
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// The invoice itself must commit to what this session expects, a
    /// settled status alone is not enough.
    pub fn commitment_matches(&self) -> bool {
        self.invoice.description_hash.as_deref() == Some(self.expected_description_hash.as_str())
    }

    fn transition(&mut self, phase: PollPhase, logger: &Logger) {
        log::info!(
            logger,
            "Invoice {} for {}: {:?} -> {:?}",
            self.invoice.payment_hash,
            self.account.address(),
            self.phase,
            phase
        );
        self.phase = phase;
    }
}

/// What a session needs to check settlement and announce it.
#[derive(Clone)]
pub struct SettlementWatcher {
    pub backend: Arc<dyn LightningBackend>,
    pub publisher: RelayPublisher,
    /// Set when the account owner gets a direct message on payment.
    pub notifier: Option<Notifier>,
    /// Signs zap receipts.
    pub keys: Option<Keys>,
    pub logger: Logger,
}

impl SettlementWatcher {
    pub async fn watch(&self, mut session: PaymentSession) -> PollPhase {
        if !self.backend.supports_settlement_check() {
            log::info!(
                self.logger,
                "{} has no settlement check, not watching {}",
                self.backend.kind_name(),
                session.invoice.payment_hash
            );
            session.transition(PollPhase::Unsupported, &self.logger);
            return session.phase();
        }

        for attempt in 1..=session.attempts {
            tokio::time::sleep(session.interval).await;
            match self.backend.check_settlement(&session.invoice.payment_hash).await {
                Ok(true) if session.commitment_matches() => {
                    session.transition(PollPhase::Paid, &self.logger);
                    self.announce(&session).await;
                    return session.phase();
                }
                Ok(true) => {
                    log::warn!(
                        self.logger,
                        "Invoice {} reported paid but does not commit to {}",
                        session.invoice.payment_hash,
                        session.expected_description_hash
                    );
                }
                Ok(false) => {}
                Err(err) => {
                    log::debug!(self.logger, "Settlement check {}/{} failed: {}", attempt, session.attempts, err);
                }
            }
        }

        session.transition(PollPhase::TimedOut, &self.logger);
        session.phase()
    }

    async fn announce(&self, session: &PaymentSession) {
        if let (Some(zap), Some(keys)) = (&session.zap, &self.keys) {
            match build_receipt(keys, zap, &session.bolt11) {
                Ok(receipt) => {
                    let relays = receipt_relays(&session.account, zap);
                    let report = self.publisher.publish(&receipt, &relays).await;
                    log::info!(
                        self.logger,
                        "Zap receipt {} for {} delivered to {} relays",
                        receipt.id.to_hex(),
                        session.account.address(),
                        report.delivered.len()
                    );
                }
                Err(err) => log::error!(self.logger, "{}", err),
            }
        }

        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier
                .notify_payment(&session.account, session.amount_msat, session.zap.as_ref())
                .await
            {
                log::warn!(self.logger, "Couldn't notify {}: {}", session.account.address(), err);
            }
        }
    }
}

/// Account relays followed by the zap request's own, the publisher adds
/// the defaults.
pub fn receipt_relays(account: &Account, zap: &ZapRequest) -> Vec<String> {
    account.relays.iter().cloned().chain(zap.relays()).collect()
}

/// Detaches the watch. The handle resolves to the terminal phase.
pub fn spawn_settlement_watch(session: PaymentSession, watcher: SettlementWatcher) -> JoinHandle<PollPhase> {
    tokio::spawn(async move { watcher.watch(session).await })
}
