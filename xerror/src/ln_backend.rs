use err_derive::Error;
use serde::Serialize;

/// Failures of a Lightning node backend. The first field always names the
/// backend kind the call was dispatched to.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum BackendError {
    #[error(display = "Backend kind '{}' is not supported.", _0)]
    UnsupportedBackend(String),
    #[error(display = "Invoice creation on {} failed: {}", _0, _1)]
    InvoiceCreationFailed(String, String),
    #[error(display = "Settlement check on {} failed: {}", _0, _1)]
    StatusCheckFailed(String, String),
    #[error(display = "Settlement checks are not implemented for {}.", _0)]
    SettlementCheckUnsupported(String),
    #[error(display = "{} only invoices whole satoshis, got {} msat.", _0, _1)]
    FractionalAmount(String, u64),
    #[error(display = "Invalid backend configuration: {}", _0)]
    InvalidConfiguration(String),
    #[error(display = "Could not decode invoice: {}", _0)]
    InvoiceDecodeFailed(String),
    #[error(display = "Transport error: {}", _0)]
    Transport(String),
}

impl BackendError {
    /// Re-labels a transport level failure as a failure of the given call.
    pub fn during_invoice_creation(self, kind: &str) -> Self {
        match self {
            BackendError::Transport(cause) => BackendError::InvoiceCreationFailed(kind.to_string(), cause),
            other => other,
        }
    }

    pub fn during_status_check(self, kind: &str) -> Self {
        match self {
            BackendError::Transport(cause) => BackendError::StatusCheckFailed(kind.to_string(), cause),
            other => other,
        }
    }
}
