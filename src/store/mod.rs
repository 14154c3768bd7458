//! Store module
//!
//! Ports for the Account Store and the Ledger Store, plus the atomic scope
//! that lets one transfer enrol its balance adjustments and its ledger append
//! in a single all-or-nothing unit.
//!
//! Backends:
//! - [`PgStorage`]: PostgreSQL, row-level locking inside one transaction
//! - [`InMemoryStorage`]: per-account optimistic versions, used for tests
//!   and the `memory` backend

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Balance, NewTransfer, TransferRecord, UserId};

pub use error::{StoreError, StoreResult};
pub use memory::{Fault, InMemoryStorage};
pub use postgres::PgStorage;

/// Durable mapping from user id to balance.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Current committed balance, or `AccountNotFound`.
    async fn get_balance(&self, user_id: &UserId) -> StoreResult<Balance>;

    /// Provision an account with a starting balance.
    async fn open_account(&self, user_id: &UserId, initial: Balance) -> StoreResult<()>;
}

/// Durable append-only log of transfer records.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Records where `user_id` is sender or receiver, newest first.
    async fn query_by_participant(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> StoreResult<Vec<TransferRecord>>;

    /// Look up one record by id.
    async fn get_transfer(&self, id: Uuid) -> StoreResult<Option<TransferRecord>>;

    /// Look up the record a sender committed under an idempotency key.
    async fn find_by_idempotency_key(
        &self,
        sender_id: &UserId,
        key: &str,
    ) -> StoreResult<Option<TransferRecord>>;
}

/// A unit of work spanning both stores.
///
/// Nothing done through a scope is visible to other callers until
/// [`AtomicScope::commit`] succeeds. Dropping a scope without committing
/// discards everything it did.
#[async_trait]
pub trait AtomicScope: Send {
    /// Add `delta` to the balance of `user_id`, failing with
    /// `InsufficientFunds` if the result would be negative.
    async fn atomic_adjust(&mut self, user_id: &UserId, delta: i64) -> StoreResult<Balance>;

    /// Append a transfer record; `created_at` is assigned by the store.
    async fn append(&mut self, transfer: NewTransfer) -> StoreResult<TransferRecord>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Both stores behind one handle, able to open an atomic scope.
#[async_trait]
pub trait Storage: AccountStore + LedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn AtomicScope>>;

    /// Single adjustment committed on its own.
    async fn atomic_adjust(&self, user_id: &UserId, delta: i64) -> StoreResult<Balance> {
        let mut scope = self.begin().await?;
        match scope.atomic_adjust(user_id, delta).await {
            Ok(balance) => {
                scope.commit().await?;
                Ok(balance)
            }
            Err(e) => {
                if let Err(rollback_err) = scope.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback after failed adjustment failed");
                }
                Err(e)
            }
        }
    }

    /// Release backend resources (connection pool, etc.)
    async fn close(&self) {}
}
