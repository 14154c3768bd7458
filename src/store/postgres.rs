//! PostgreSQL storage backend
//!
//! One atomic scope is one database transaction. Balance adjustments are
//! conditional `UPDATE`s, so the row lock taken by the first adjustment of an
//! account serializes every other transfer touching that account until
//! commit; the non-negative check and the decrement happen in the same
//! statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{Amount, Balance, NewTransfer, Note, TransferRecord, UserId};

use super::{AccountStore, AtomicScope, LedgerStore, Storage, StoreError, StoreResult};

type TransferRow = (
    Uuid,
    UserId,
    UserId,
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

const TRANSFER_COLUMNS: &str = r#"
    id, sender_id, receiver_id, amount, note,
    sender_name, receiver_name, idempotency_key, request_hash, created_at
"#;

fn into_record(row: TransferRow) -> StoreResult<TransferRecord> {
    let (
        id,
        sender_id,
        receiver_id,
        amount,
        note,
        sender_name,
        receiver_name,
        idempotency_key,
        request_hash,
        created_at,
    ) = row;

    Ok(TransferRecord {
        id,
        sender_id,
        receiver_id,
        amount: Amount::new(amount).map_err(|e| StoreError::CorruptRow(e.to_string()))?,
        note: Note::new(note).map_err(StoreError::CorruptRow)?,
        sender_name,
        receiver_name,
        idempotency_key,
        request_hash,
        created_at,
    })
}

fn into_balance(units: i64) -> StoreResult<Balance> {
    Balance::new(units).map_err(|e| StoreError::CorruptRow(e.to_string()))
}

/// PostgreSQL-backed Account Store + Ledger Store
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Create a new PgStorage with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccountStore for PgStorage {
    async fn get_balance(&self, user_id: &UserId) -> StoreResult<Balance> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        match balance {
            Some(units) => into_balance(units),
            None => Err(StoreError::AccountNotFound(user_id.clone())),
        }
    }

    async fn open_account(&self, user_id: &UserId, initial: Balance) -> StoreResult<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (user_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(initial.units())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(StoreError::AccountExists(user_id.clone()));
        }

        tracing::info!(user_id = %user_id, balance = initial.units(), "Account opened");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgStorage {
    async fn query_by_participant(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> StoreResult<Vec<TransferRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            r#"
            SELECT {TRANSFER_COLUMNS}
            FROM transfers
            WHERE sender_id = $1 OR receiver_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2
            "#
        );

        let rows: Vec<TransferRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(into_record).collect()
    }

    async fn get_transfer(&self, id: Uuid) -> StoreResult<Option<TransferRecord>> {
        let sql = format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1");
        let row: Option<TransferRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(into_record).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        sender_id: &UserId,
        key: &str,
    ) -> StoreResult<Option<TransferRecord>> {
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE sender_id = $1 AND idempotency_key = $2"
        );
        let row: Option<TransferRow> = sqlx::query_as(&sql)
            .bind(sender_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(into_record).transpose()
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin(&self) -> StoreResult<Box<dyn AtomicScope>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgScope { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Atomic scope backed by one PostgreSQL transaction.
/// Dropping it without commit rolls the transaction back.
struct PgScope {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AtomicScope for PgScope {
    async fn atomic_adjust(&mut self, user_id: &UserId, delta: i64) -> StoreResult<Balance> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET balance = balance + $2,
                version = version + 1,
                updated_at = NOW()
            WHERE user_id = $1 AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_adjust(e, user_id))?;

        if let Some(units) = updated {
            return into_balance(units);
        }

        // No row updated: either the account is missing or the result would
        // be negative. The row is not locked by us here, so `available` is
        // informational only.
        let available: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&mut *self.tx)
                .await?;

        match available {
            Some(available) => Err(StoreError::InsufficientFunds {
                user_id: user_id.clone(),
                available,
                delta,
            }),
            None => Err(StoreError::AccountNotFound(user_id.clone())),
        }
    }

    async fn append(&mut self, transfer: NewTransfer) -> StoreResult<TransferRecord> {
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO transfers (
                id, sender_id, receiver_id, amount, note,
                sender_name, receiver_name, idempotency_key, request_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING created_at
            "#,
        )
        .bind(transfer.id)
        .bind(&transfer.sender_id)
        .bind(&transfer.receiver_id)
        .bind(transfer.amount.units())
        .bind(transfer.note.as_str())
        .bind(&transfer.sender_name)
        .bind(&transfer.receiver_name)
        .bind(&transfer.idempotency_key)
        .bind(&transfer.request_hash)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(transfer.into_record(created_at))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
