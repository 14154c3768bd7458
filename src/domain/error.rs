//! Transfer Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::UserId;

/// Machine-checkable error kind reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    InsufficientFunds,
    UnknownRecipient,
    IdempotencyConflict,
    Aborted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::UnknownRecipient => "unknown_recipient",
            ErrorKind::IdempotencyConflict => "idempotency_conflict",
            ErrorKind::Aborted => "aborted",
        }
    }
}

/// Failure of a transfer request.
///
/// Everything except `Aborted` is detected before any mutation and carries
/// no side effects. `Aborted` is reported only after the atomic scope has
/// been rolled back, so it is always safe to retry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransferError {
    /// Malformed input: missing recipient, bad amount, self-transfer, bad note
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Sender balance below the requested amount
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    /// Receiver has no account
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(UserId),

    /// Idempotency key reused for a different request
    #[error("Idempotency key {0} was already used for a different transfer")]
    IdempotencyConflict(String),

    /// Storage fault, lost commit race or deadline; nothing was applied
    #[error("Transfer aborted: {0}")]
    Aborted(String),
}

impl TransferError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::Aborted(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::UnknownRecipient(_) => ErrorKind::UnknownRecipient,
            Self::IdempotencyConflict(_) => ErrorKind::IdempotencyConflict,
            Self::Aborted(_) => ErrorKind::Aborted,
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Aborted(_))
    }

    /// Check if retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}
