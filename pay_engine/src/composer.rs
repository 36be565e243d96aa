use core_types::{Account, Msat};
use ln_backends::{InvoiceDescription, InvoiceRequest, LightningBackend};
use slog as log;
use slog::Logger;
use utils::lnurl::Metadata;
use utils::nostr::ZapRequest;
use xerror::ln_backend::BackendError;

/// What the invoice description commits to. Passed explicitly through the
/// pay flow so concurrent requests never see each other's zap.
#[derive(Debug, Clone)]
pub enum InvoiceContext {
    /// Account verification, the PIN is shown in the wallet.
    Pin(String),
    Zap(ZapRequest),
    Plain,
}

impl InvoiceContext {
    pub fn description(&self, account: &Account) -> InvoiceDescription {
        match self {
            InvoiceContext::Pin(pin) => InvoiceDescription::Literal(pin_description(account, pin)),
            InvoiceContext::Zap(zap) => InvoiceDescription::HashOf(zap.description.clone()),
            InvoiceContext::Plain => InvoiceDescription::HashOf(Metadata::for_account(account).encode()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InvoiceContext::Pin(_) => "pin",
            InvoiceContext::Zap(_) => "zap",
            InvoiceContext::Plain => "plain",
        }
    }
}

pub fn pin_description(account: &Account, pin: &str) -> String {
    format!(
        "{}'s PIN for '{}' lightning address: {}",
        account.domain,
        account.address(),
        pin
    )
}

pub fn invoice_label(domain: &str, unix_seconds: u64) -> String {
    format!("{domain}/{unix_seconds:x}")
}

pub async fn compose_invoice(
    backend: &dyn LightningBackend,
    account: &Account,
    amount_msat: Msat,
    context: &InvoiceContext,
    logger: &Logger,
) -> Result<String, BackendError> {
    let request = InvoiceRequest {
        msat: amount_msat,
        description: context.description(account),
        label: invoice_label(&account.domain, utils::time::unix_seconds()),
    };
    log::info!(
        logger,
        "Generating {} invoice for {} on {}, msat: {}",
        context.name(),
        account.address(),
        backend.kind_name(),
        amount_msat
    );

    let bolt11 = backend.create_invoice(&request).await;
    if let Err(err) = &bolt11 {
        log::warn!(logger, "Invoice generation for {} failed: {}", account.address(), err);
    }
    bolt11
}
