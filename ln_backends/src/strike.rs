use serde_json::json;
use xerror::ln_backend::BackendError;

use crate::connector::{json_body, string_field, transport, url, InvoiceRequest};
use crate::descriptor::StrikeParams;

const SATS_IN_BTC: u64 = 100_000_000;

/// Strike amounts are decimal strings in the invoice currency.
pub(crate) fn btc_amount(msat: u64) -> String {
    let sat = core_types::msat_to_sat(msat);
    format!("{}.{:08}", sat / SATS_IN_BTC, sat % SATS_IN_BTC)
}

/// Creates a Strike invoice for the handle, then asks for a quote which
/// carries the bolt11.
pub(crate) async fn create_invoice(
    http: &reqwest::Client,
    base_url: &str,
    params: &StrikeParams,
    request: &InvoiceRequest,
) -> Result<String, BackendError> {
    let invoice = http
        .post(url(base_url, &format!("/v1/invoices/handle/{}", params.username)))
        .bearer_auth(&params.key)
        .json(&json!({
            "correlationId": request.label,
            "description": request.description.text(),
            "amount": {"currency": params.currency, "amount": btc_amount(request.msat)},
        }))
        .send()
        .await
        .map_err(transport)?;
    let invoice = json_body(invoice).await?;
    let invoice_id = string_field(&invoice, "invoiceId")?;

    let mut quote_body = json!({});
    if let Some(hash) = request.description.hash_hex() {
        quote_body["descriptionHash"] = json!(hash);
    }
    let quote = http
        .post(url(base_url, &format!("/v1/invoices/{invoice_id}/quote")))
        .bearer_auth(&params.key)
        .json(&quote_body)
        .send()
        .await
        .map_err(transport)?;
    let quote = json_body(quote).await?;
    string_field(&quote, "lnInvoice")
}
