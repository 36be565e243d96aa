use xerror::ln_backend::BackendError;

use crate::connector::{json_body, string_field, transport, url, InvoiceRequest};
use crate::descriptor::EclairParams;

pub(crate) fn invoice_form(request: &InvoiceRequest) -> Vec<(&'static str, String)> {
    let mut form = vec![("amountMsat", request.msat.to_string())];
    match request.description.hash_hex() {
        Some(hash) => form.push(("descriptionHash", hash)),
        None => form.push(("description", request.description.text().to_string())),
    }
    form
}

pub(crate) async fn create_invoice(
    http: &reqwest::Client,
    params: &EclairParams,
    request: &InvoiceRequest,
) -> Result<String, BackendError> {
    let response = http
        .post(url(&params.host, "/createinvoice"))
        .basic_auth("", Some(&params.password))
        .form(&invoice_form(request))
        .send()
        .await
        .map_err(transport)?;
    let body = json_body(response).await?;
    string_field(&body, "serialized")
}
