use err_derive::Error;
use serde::Serialize;

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum ZapError {
    #[error(display = "Couldn't parse nostr event.")]
    MalformedZapEvent,
    #[error(display = "Nostr NIP-57 zap event signature invalid.")]
    InvalidSignature,
    #[error(display = "Nostr event is not a zap request.")]
    WrongKind,
    #[error(display = "Nostr NIP-57 zap event is missing the '{}' tag.", _0)]
    MissingRequiredTag(String),
    #[error(display = "Nostr NIP-57 zap event has more than one '{}' tag.", _0)]
    InvalidTagCount(String),
    #[error(display = "Zap request amount does not match the requested amount.")]
    AmountMismatch,
    #[error(display = "Comment is too long (max: {} characters).", _0)]
    CommentTooLong(usize),
    #[error(display = "Couldn't serialize zap event.")]
    SerializationFailed,
    #[error(display = "Couldn't sign zap receipt.")]
    ReceiptSigningFailed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum RelayError {
    #[error(display = "Relay {} is being ignored.", _0)]
    Ignored(String),
    #[error(display = "Error connecting to relay {}: {}", _0, _1)]
    ConnectionFailed(String, String),
    #[error(display = "Connection to relay {} is broken: {}", _0, _1)]
    ConnectionBroken(String, String),
    #[error(display = "Error publishing to relay {}: {}", _0, _1)]
    PublishFailed(String, String),
    #[error(display = "Relay {} rejected the event: {}", _0, _1)]
    Rejected(String, String),
    #[error(display = "Relay {} did not acknowledge the event in time.", _0)]
    AckTimeout(String),
}

impl RelayError {
    /// Transient failures are retried on a freshly opened connection.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::ConnectionBroken(_, _))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum NotifyError {
    #[error(display = "Invalid notification recipient {}.", _0)]
    InvalidRecipient(String),
    #[error(display = "Couldn't encrypt direct message: {}", _0)]
    EncryptionFailed(String),
}
