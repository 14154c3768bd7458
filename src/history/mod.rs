//! History Query
//!
//! Read side of the ledger: a participant's transfers, newest first,
//! classified as sent or received and decorated with counterparty names.
//! Never mutates either store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Amount, Note, TransferRecord, UserId};
use crate::identity::IdentityResolver;
use crate::store::{LedgerStore, StoreResult};

/// Default and maximum number of entries returned
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Direction of a transfer relative to the querying user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
    /// Record does not involve the user; only possible with a misbehaving store
    Unknown,
}

/// One row of a user's transaction history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub direction: Direction,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub sender_name: String,
    pub receiver_name: String,
    pub counterparty_id: UserId,
    pub counterparty_name: String,
    pub amount: Amount,
    pub note: Note,
    pub created_at: DateTime<Utc>,
}

pub struct HistoryQuery {
    ledger: Arc<dyn LedgerStore>,
    resolver: Arc<dyn IdentityResolver>,
}

impl HistoryQuery {
    pub fn new(ledger: Arc<dyn LedgerStore>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { ledger, resolver }
    }

    /// Transfers involving `user_id`, newest first.
    ///
    /// `limit` defaults to [`MAX_HISTORY_LIMIT`] and is clamped to
    /// `1..=MAX_HISTORY_LIMIT`.
    pub async fn history(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let limit = clamp_limit(limit);
        let records = self.ledger.query_by_participant(user_id, limit).await?;

        let live_names = self.live_names(user_id, &records).await;

        let entries: Vec<HistoryEntry> = records
            .into_iter()
            .map(|record| to_entry(user_id, record, &live_names))
            .collect();

        tracing::debug!(user_id = %user_id, limit, count = entries.len(), "History loaded");
        Ok(entries)
    }

    /// Current display names for every participant in `records`.
    /// Empty on resolver failure.
    async fn live_names(
        &self,
        user_id: &UserId,
        records: &[TransferRecord],
    ) -> HashMap<UserId, String> {
        if records.is_empty() {
            return HashMap::new();
        }

        let mut ids: Vec<UserId> = records
            .iter()
            .flat_map(|r| [r.sender_id.clone(), r.receiver_id.clone()])
            .collect();
        ids.sort();
        ids.dedup();

        match self.resolver.resolve_many(&ids).await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Live name lookup failed, using snapshots"
                );
                HashMap::new()
            }
        }
    }
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(MAX_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

/// Live name, then a non-empty snapshot, then the raw id
fn display_name(id: &UserId, snapshot: &str, live: &HashMap<UserId, String>) -> String {
    match live.get(id) {
        Some(name) if !name.is_empty() => name.clone(),
        _ if !snapshot.is_empty() => snapshot.to_string(),
        _ => id.to_string(),
    }
}

fn to_entry(user_id: &UserId, record: TransferRecord, live: &HashMap<UserId, String>) -> HistoryEntry {
    let direction = if &record.sender_id == user_id {
        Direction::Sent
    } else if &record.receiver_id == user_id {
        Direction::Received
    } else {
        Direction::Unknown
    };

    let sender_name = display_name(&record.sender_id, &record.sender_name, live);
    let receiver_name = display_name(&record.receiver_id, &record.receiver_name, live);

    let (counterparty_id, counterparty_name) = match direction {
        Direction::Sent => (record.receiver_id.clone(), receiver_name.clone()),
        Direction::Received | Direction::Unknown => {
            (record.sender_id.clone(), sender_name.clone())
        }
    };

    HistoryEntry {
        id: record.id,
        direction,
        sender_id: record.sender_id,
        receiver_id: record.receiver_id,
        sender_name,
        receiver_name,
        counterparty_id,
        counterparty_name,
        amount: record.amount,
        note: record.note,
        created_at: record.created_at,
    }
}
