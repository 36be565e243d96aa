use actix_web::{get, web::Path, web::Query, HttpRequest, HttpResponse};
use core_types::Msat;
use pay_engine::PayRequest;
use serde::Deserialize;
use xerror::api::ApiError;

use crate::{resolve_domain, WebState};

#[derive(Deserialize, Debug, Default)]
pub struct LnurlPayParams {
    amount: Option<String>,
    /// Zap request event JSON.
    nostr: Option<String>,
    comment: Option<String>,
    payerdata: Option<String>,
}

fn parse_amount(amount: &str) -> Result<Msat, ApiError> {
    amount.trim().parse::<Msat>().map_err(|_| ApiError::InvalidAmount)
}

/// Both LNURL-pay steps: pay parameters without `amount`, an invoice with.
#[get("/.well-known/lnurlp/{username}")]
pub async fn lnurl_pay(
    req: HttpRequest,
    path: Path<String>,
    query: Query<LnurlPayParams>,
    state: WebState,
) -> Result<HttpResponse, ApiError> {
    let username = path.into_inner().to_lowercase();
    let host = req.connection_info().host().to_string();
    let domain = resolve_domain(&state.domains, &host).ok_or(ApiError::UnknownDomain(host))?;

    let account = state
        .store
        .get_account(&username, &domain)
        .await
        .map_err(ApiError::AccountStore)?
        .ok_or_else(|| ApiError::AccountNotFound(username.clone()))?;

    let params = query.into_inner();
    let amount_msat = match params.amount.as_deref().filter(|amount| !amount.is_empty()) {
        Some(amount) => parse_amount(amount)?,
        None => {
            let callback = format!("https://{domain}/.well-known/lnurlp/{username}");
            return Ok(HttpResponse::Ok().json(state.engine.pay_params(&account, &callback)));
        }
    };

    let request = PayRequest {
        amount_msat,
        nostr: params.nostr,
        comment: params.comment,
        payer_data: params.payerdata,
    };
    let outcome = state.engine.handle_pay_request(&account, &request).await?;
    Ok(HttpResponse::Ok().json(outcome.values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ConfigAccountStore;
    use crate::{parse_domains, AppState};
    use actix_web::http::StatusCode;
    use actix_web::web::Data;
    use actix_web::{test, App};
    use core_types::Account;
    use nostr_engine::{RelayPublisher, RelayPublisherSettings, WsRelayConnector};
    use pay_engine::{ConnectorFactory, PayEngine, PayEngineSettings};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn state(domains: &str) -> Data<AppState> {
        let logger = utils::xlogging::discard();
        let relay_settings = RelayPublisherSettings::default();
        let publisher = RelayPublisher::new(
            relay_settings.clone(),
            Arc::new(WsRelayConnector::new(&relay_settings, logger.clone())),
            logger.clone(),
        );
        let settings = PayEngineSettings::default();
        let backends = Arc::new(ConnectorFactory::new(settings.connector.clone(), logger.clone()));
        let engine = PayEngine::new(settings, None, backends, publisher, logger);

        let domains = parse_domains(domains);
        let account = Account {
            name: "alice".to_string(),
            kind: "phoenixd".to_string(),
            min_sendable: Some(1_000),
            max_sendable: Some(1_000_000_000),
            ..Default::default()
        };
        let store = Arc::new(ConfigAccountStore::new(vec![account], &domains[0]));
        Data::new(AppState {
            engine,
            store,
            domains,
        })
    }

    async fn get(domains: &str, uri: &str) -> (StatusCode, Value) {
        let app = test::init_service(
            App::new()
                .app_data(state(domains))
                .configure(crate::routes::configure),
        )
        .await;
        let req = test::TestRequest::get()
            .uri(uri)
            .insert_header(("host", "example.com"))
            .to_request();
        let response = test::call_service(&app, req).await;
        let status = response.status();
        let body: Value = test::read_body_json(response).await;
        (status, body)
    }

    #[actix_web::test]
    async fn test_pay_params_without_amount() {
        let (status, body) = get("example.com", "/.well-known/lnurlp/Alice").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tag"], "payRequest");
        assert_eq!(body["callback"], "https://example.com/.well-known/lnurlp/alice");
        assert_eq!(body["minSendable"], 1_000);
        assert_eq!(body["maxSendable"], 1_000_000_000);
        assert_eq!(body["commentAllowed"], 500);
        assert_eq!(body["allowsNostr"], false);
        assert!(body.get("nostrPubkey").is_none());
        assert_eq!(
            body["metadata"],
            r#"[["text/plain","Pay to alice@example.com"],["text/identifier","alice@example.com"]]"#
        );
    }

    #[actix_web::test]
    async fn test_amount_out_of_bounds_is_lnurl_error() {
        let (status, body) = get("example.com", "/.well-known/lnurlp/alice?amount=500").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "ERROR", "reason": "Amount out of bounds (min: 1 sat, max: 1000000 sat)."})
        );
    }

    #[actix_web::test]
    async fn test_amount_must_be_an_integer() {
        let (status, body) = get("example.com", "/.well-known/lnurlp/alice?amount=1.5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "Amount is not integer.");
    }

    #[actix_web::test]
    async fn test_unknown_account() {
        let (status, body) = get("example.com", "/.well-known/lnurlp/bob").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["reason"], "Failed to get name bob.");
    }

    #[actix_web::test]
    async fn test_unknown_domain() {
        let (status, body) = get("sats.example.org,zaps.example.net", "/.well-known/lnurlp/alice").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "ERROR");
    }

    #[actix_web::test]
    async fn test_unsupported_backend_fails_invoice_creation() {
        let (status, body) = get("example.com", "/.well-known/lnurlp/alice?amount=21000&comment=gm").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ERROR", "reason": "Couldn't create invoice."}));
    }
}
