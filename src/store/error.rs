//! Store Errors
//!
//! Error types for account and ledger store operations.

use crate::domain::UserId;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the account and ledger stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No account for this user
    #[error("Account not found: {0}")]
    AccountNotFound(UserId),

    /// Account already provisioned
    #[error("Account already exists: {0}")]
    AccountExists(UserId),

    /// Adjustment would take the balance below zero
    #[error("Insufficient funds on {user_id}: available {available}, delta {delta}")]
    InsufficientFunds {
        user_id: UserId,
        available: i64,
        delta: i64,
    },

    /// Adjustment would exceed the balance cap
    #[error("Balance overflow on {0}")]
    BalanceOverflow(UserId),

    /// Optimistic version mismatch, serialization failure or deadlock
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    /// Another transfer with the same sender and idempotency key committed first
    #[error("Idempotency key already used: {0}")]
    DuplicateIdempotencyKey(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Stored row could not be mapped back into domain types
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Fault raised by the in-memory backend on request
    #[error("Injected fault: {0}")]
    Injected(&'static str),
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";
const IDEMPOTENCY_INDEX: &str = "transfers_sender_idempotency_key";
const BALANCE_RANGE_CHECK: &str = "accounts_balance_range";

impl StoreError {
    /// Map a failed balance update on `user_id`. Negative results never reach
    /// the range check, so a violation there means the cap was exceeded.
    pub(crate) fn from_adjust(err: sqlx::Error, user_id: &UserId) -> Self {
        match &err {
            sqlx::Error::Database(db)
                if db.code().as_deref() == Some(CHECK_VIOLATION)
                    && db.constraint() == Some(BALANCE_RANGE_CHECK) =>
            {
                StoreError::BalanceOverflow(user_id.clone())
            }
            _ => StoreError::from(err),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    return StoreError::Conflict(db.message().to_string());
                }
                Some(UNIQUE_VIOLATION) if db.constraint() == Some(IDEMPOTENCY_INDEX) => {
                    return StoreError::DuplicateIdempotencyKey(db.message().to_string());
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}
