use err_derive::Error;
use serde::Serialize;
use serde_json::json;

use actix_web::{error, http::StatusCode, HttpResponse};

use crate::pay::PayError;

#[derive(Debug, Error, Serialize)]
pub enum ApiError {
    #[error(display = "Unknown domain {}.", _0)]
    UnknownDomain(String),
    #[error(display = "Failed to get name {}.", _0)]
    AccountNotFound(String),
    #[error(display = "Amount is not integer.")]
    InvalidAmount,
    #[error(display = "Couldn't load account.")]
    AccountStore(String),
    #[error(display = "{}", _0)]
    Pay(PayError),
}

impl From<PayError> for ApiError {
    fn from(err: PayError) -> Self {
        ApiError::Pay(err)
    }
}

impl error::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "status": "ERROR",
            "reason": self.to_string(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::UnknownDomain(_) => StatusCode::NOT_FOUND,
            ApiError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidAmount => StatusCode::BAD_REQUEST,
            ApiError::AccountStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // LNURL wallets read the reason from the body, so protocol
            // level failures keep a 200 status.
            ApiError::Pay(_) => StatusCode::OK,
        }
    }
}
