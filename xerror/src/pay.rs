use err_derive::Error;
use serde::Serialize;

use crate::ln_backend::BackendError;
use crate::nostr::ZapError;

/// Everything a payer can be told about a failed pay request. The display
/// string is the LNURL `reason`.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum PayError {
    #[error(display = "Amount out of bounds (min: {} sat, max: {} sat).", _0, _1)]
    AmountOutOfBounds(u64, u64),
    #[error(display = "{}", _0)]
    Zap(ZapError),
    #[error(display = "Couldn't create invoice.")]
    Backend(BackendError),
    #[error(display = "Couldn't serialize zap event.")]
    Serialization(String),
}

impl From<ZapError> for PayError {
    fn from(err: ZapError) -> Self {
        match err {
            ZapError::SerializationFailed => PayError::Serialization(err.to_string()),
            other => PayError::Zap(other),
        }
    }
}

impl From<BackendError> for PayError {
    fn from(err: BackendError) -> Self {
        PayError::Backend(err)
    }
}
