use serde_json::json;
use xerror::ln_backend::BackendError;

use crate::connector::{json_body, string_field, transport, url, InvoiceRequest};
use crate::descriptor::SparkoParams;

/// CLN `invoice` parameters shared by the Sparko and Commando dialects.
pub(crate) fn cln_invoice_params(request: &InvoiceRequest) -> serde_json::Value {
    json!({
        "amount_msat": request.msat,
        "label": request.label,
        "description": request.description.text(),
        "deschashonly": request.description.use_description_hash(),
    })
}

/// Reads the `listinvoices` result for a single payment hash.
pub(crate) fn cln_invoice_paid(result: &serde_json::Value) -> bool {
    result
        .get("invoices")
        .and_then(|invoices| invoices.as_array())
        .and_then(|invoices| invoices.first())
        .and_then(|invoice| invoice.get("status"))
        .and_then(|status| status.as_str())
        .map_or(false, |status| status == "paid")
}

async fn call(
    http: &reqwest::Client,
    params: &SparkoParams,
    method: &str,
    rpc_params: serde_json::Value,
) -> Result<serde_json::Value, BackendError> {
    let response = http
        .post(url(&params.host, "/rpc"))
        .header("X-Access", &params.key)
        .json(&json!({"method": method, "params": rpc_params}))
        .send()
        .await
        .map_err(transport)?;
    json_body(response).await
}

pub(crate) async fn create_invoice(
    http: &reqwest::Client,
    params: &SparkoParams,
    request: &InvoiceRequest,
) -> Result<String, BackendError> {
    let result = call(http, params, "invoice", cln_invoice_params(request)).await?;
    string_field(&result, "bolt11")
}

pub(crate) async fn check_settlement(
    http: &reqwest::Client,
    params: &SparkoParams,
    payment_hash: &str,
) -> Result<bool, BackendError> {
    let result = call(http, params, "listinvoices", json!({ "payment_hash": payment_hash })).await?;
    Ok(cln_invoice_paid(&result))
}
