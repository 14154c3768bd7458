//! Transfer records
//!
//! A `TransferRecord` is a historical fact: created exactly once, atomically
//! with the balance movement it describes, and never edited afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Amount, UserId};

/// Maximum note length, in characters
pub const MAX_NOTE_LEN: usize = 280;

/// Free-text annotation attached to a transfer (may be empty)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Note(String);

impl Note {
    pub fn new(text: impl Into<String>) -> Result<Self, String> {
        let text = text.into();
        let len = text.chars().count();
        if len > MAX_NOTE_LEN {
            return Err(format!(
                "Note is {} characters, maximum is {}",
                len, MAX_NOTE_LEN
            ));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A committed transfer, as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Amount,
    pub note: Note,
    /// Display name of the sender at creation time (empty if unresolved)
    pub sender_name: String,
    /// Display name of the receiver at creation time (empty if unresolved)
    pub receiver_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip)]
    pub request_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Whether `user_id` is the sender or the receiver of this transfer
    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.sender_id == user_id || &self.receiver_id == user_id
    }
}

/// A transfer about to be appended; the store assigns `created_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Amount,
    pub note: Note,
    pub sender_name: String,
    pub receiver_name: String,
    pub idempotency_key: Option<String>,
    pub request_hash: Option<String>,
}

impl NewTransfer {
    pub fn into_record(self, created_at: DateTime<Utc>) -> TransferRecord {
        TransferRecord {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            amount: self.amount,
            note: self.note,
            sender_name: self.sender_name,
            receiver_name: self.receiver_name,
            idempotency_key: self.idempotency_key,
            request_hash: self.request_hash,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_length_bound() {
        assert!(Note::new("rent").is_ok());
        assert!(Note::new("é".repeat(MAX_NOTE_LEN)).is_ok());
        assert!(Note::new("x".repeat(MAX_NOTE_LEN + 1)).is_err());
        assert!(Note::default().is_empty());
    }

    #[test]
    fn test_record_involves_participants_only() {
        let record = NewTransfer {
            id: Uuid::new_v4(),
            sender_id: UserId::parse("alice").unwrap(),
            receiver_id: UserId::parse("bob").unwrap(),
            amount: Amount::new(10).unwrap(),
            note: Note::default(),
            sender_name: String::new(),
            receiver_name: String::new(),
            idempotency_key: None,
            request_hash: None,
        }
        .into_record(Utc::now());

        assert!(record.involves(&UserId::parse("alice").unwrap()));
        assert!(record.involves(&UserId::parse("bob").unwrap()));
        assert!(!record.involves(&UserId::parse("carol").unwrap()));
    }
}
