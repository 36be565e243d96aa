use serde_json::json;
use xerror::ln_backend::BackendError;

use crate::connector::{json_body, string_field, transport, url, whole_sats, InvoiceRequest};
use crate::descriptor::LnBitsParams;

const API_KEY_HEADER: &str = "X-Api-Key";

pub(crate) fn invoice_body(request: &InvoiceRequest) -> Result<serde_json::Value, BackendError> {
    let mut body = json!({
        "out": false,
        "amount": whole_sats("lnbits", request.msat)?,
    });
    match request.description.hash_hex() {
        Some(hash) => {
            body["description_hash"] = json!(hash);
            body["unhashed_description"] = json!(hex::encode(request.description.text()));
        }
        None => body["memo"] = json!(request.description.text()),
    }
    Ok(body)
}

pub(crate) async fn create_invoice(
    http: &reqwest::Client,
    params: &LnBitsParams,
    request: &InvoiceRequest,
) -> Result<String, BackendError> {
    let body = invoice_body(request)?;
    let response = http
        .post(url(&params.host, "/api/v1/payments"))
        .header(API_KEY_HEADER, &params.key)
        .json(&body)
        .send()
        .await
        .map_err(transport)?;
    let body = json_body(response).await?;
    string_field(&body, "payment_request")
}

pub(crate) async fn check_settlement(
    http: &reqwest::Client,
    params: &LnBitsParams,
    payment_hash: &str,
) -> Result<bool, BackendError> {
    let response = http
        .get(url(&params.host, &format!("/api/v1/payments/{payment_hash}")))
        .header(API_KEY_HEADER, &params.key)
        .send()
        .await
        .map_err(transport)?;
    let body = json_body(response).await?;
    Ok(body.get("paid").and_then(|paid| paid.as_bool()).unwrap_or(false))
}
