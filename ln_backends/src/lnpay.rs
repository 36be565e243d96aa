use serde_json::json;
use xerror::ln_backend::BackendError;

use crate::connector::{json_body, string_field, transport, url, whole_sats, InvoiceRequest};
use crate::descriptor::LnPayParams;

// LNPay has no settlement lookup wired in, see `Backend::supports_settlement_check`.
pub(crate) async fn create_invoice(
    http: &reqwest::Client,
    base_url: &str,
    params: &LnPayParams,
    request: &InvoiceRequest,
) -> Result<String, BackendError> {
    let mut body = json!({ "num_satoshis": whole_sats("lnpay", request.msat)? });
    match request.description.hash_bytes() {
        Some(hash) => body["description_hash"] = json!(base64::encode(hash)),
        None => body["memo"] = json!(request.description.text()),
    }

    let response = http
        .post(url(base_url, &format!("/v1/wallet/{}/invoice", params.wallet_invoice_key)))
        .header("X-Api-Key", &params.public_access_key)
        .json(&body)
        .send()
        .await
        .map_err(transport)?;
    let body = json_body(response).await?;
    string_field(&body, "payment_request")
}
