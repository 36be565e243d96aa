use lightning_invoice::Invoice;
use xerror::ln_backend::BackendError;

use std::str::FromStr;

/// The parts of a bolt11 invoice settlement checks care about, hashes hex
/// encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInvoice {
    pub payment_hash: String,
    pub description_hash: Option<String>,
    pub amount_msat: Option<u64>,
}

pub fn decode(bolt11: &str) -> Result<DecodedInvoice, BackendError> {
    let invoice = Invoice::from_str(bolt11).map_err(|err| BackendError::InvoiceDecodeFailed(err.to_string()))?;
    let description_hash = match invoice.description() {
        lightning_invoice::InvoiceDescription::Hash(hash) => Some(hex::encode(hash.0)),
        lightning_invoice::InvoiceDescription::Direct(_) => None,
    };
    Ok(DecodedInvoice {
        payment_hash: hex::encode(invoice.payment_hash()),
        description_hash,
        amount_msat: invoice.amount_milli_satoshis(),
    })
}
