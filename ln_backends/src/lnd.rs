use serde_json::json;
use xerror::ln_backend::BackendError;

use crate::connector::{json_body, string_field, transport, url, InvoiceRequest};
use crate::descriptor::LndParams;

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

pub(crate) fn invoice_body(request: &InvoiceRequest, private: bool) -> serde_json::Value {
    let mut body = json!({
        "value_msat": request.msat.to_string(),
        "private": private,
    });
    match request.description.hash_bytes() {
        Some(hash) => body["description_hash"] = json!(base64::encode(hash)),
        None => body["memo"] = json!(request.description.text()),
    }
    body
}

pub(crate) async fn create_invoice(
    http: &reqwest::Client,
    params: &LndParams,
    request: &InvoiceRequest,
    private: bool,
) -> Result<String, BackendError> {
    let response = http
        .post(url(&params.host, "/v1/invoices"))
        .header(MACAROON_HEADER, &params.macaroon)
        .json(&invoice_body(request, private))
        .send()
        .await
        .map_err(transport)?;
    let body = json_body(response).await?;
    string_field(&body, "payment_request")
}

pub(crate) async fn check_settlement(
    http: &reqwest::Client,
    params: &LndParams,
    payment_hash: &str,
) -> Result<bool, BackendError> {
    let response = http
        .get(url(&params.host, &format!("/v1/invoice/{payment_hash}")))
        .header(MACAROON_HEADER, &params.macaroon)
        .send()
        .await
        .map_err(transport)?;
    let body = json_body(response).await?;
    Ok(body.get("settled").and_then(|settled| settled.as_bool()).unwrap_or(false))
}
