use core_types::Msat;
use serde::{Deserialize, Serialize};

pub const PAY_REQUEST_TAG: &str = "payRequest";
pub const PAYMENT_RECEIVED: &str = "Payment Received!";

/// First LNURL-pay step, served when no amount is given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PayParams {
    pub callback: String,
    pub min_sendable: Msat,
    pub max_sendable: Msat,
    /// JSON encoded metadata document. Wallets hash this exact string.
    pub metadata: String,
    pub comment_allowed: usize,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allows_nostr: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nostr_pubkey: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessAction {
    pub tag: String,
    pub message: String,
}

impl SuccessAction {
    pub fn message(message: &str) -> Self {
        Self {
            tag: "message".to_string(),
            message: message.to_string(),
        }
    }
}

/// Second LNURL-pay step, the invoice handed to the payer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayValues {
    pub status: String,
    pub pr: String,
    pub routes: Vec<serde_json::Value>,
    pub success_action: SuccessAction,
}

impl PayValues {
    pub fn new(pr: String) -> Self {
        Self {
            status: "OK".to_string(),
            pr,
            routes: Vec::new(),
            success_action: SuccessAction::message(PAYMENT_RECEIVED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pay_values_wire_shape() {
        let values = PayValues::new("lnbc1".to_string());
        assert_eq!(
            serde_json::to_value(&values).unwrap(),
            json!({
                "status": "OK",
                "pr": "lnbc1",
                "routes": [],
                "successAction": {"tag": "message", "message": "Payment Received!"}
            })
        );
    }

    #[test]
    fn test_pay_params_without_nostr() {
        let params = PayParams {
            callback: "https://example.com/.well-known/lnurlp/alice".to_string(),
            min_sendable: 1000,
            max_sendable: 1_000_000_000,
            metadata: "[]".to_string(),
            comment_allowed: 500,
            tag: PAY_REQUEST_TAG.to_string(),
            allows_nostr: None,
            nostr_pubkey: None,
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["minSendable"], json!(1000));
        assert_eq!(value["commentAllowed"], json!(500));
        assert!(value.get("allowsNostr").is_none());
        assert!(value.get("nostrPubkey").is_none());
    }
}
