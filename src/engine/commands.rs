//! Command definitions
//!
//! Commands represent intentions to change the system state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Amount, TransferRecord, UserId};

// =========================================================================
// TransferCommand
// =========================================================================

/// Command to move funds from the authenticated sender to a receiver.
///
/// Fields are kept raw here; the engine validates them.
#[derive(Debug, Clone)]
pub struct TransferCommand {
    /// Authenticated sender
    pub sender_id: UserId,
    /// Recipient as supplied by the caller (may be blank)
    pub receiver_id: String,
    /// Requested amount, floored to minor units during validation
    pub amount: Decimal,
    /// Optional note
    pub note: Option<String>,
    /// Optional client-supplied idempotency key
    pub idempotency_key: Option<String>,
    /// Overrides the engine's default deadline
    pub deadline: Option<Duration>,
}

impl TransferCommand {
    pub fn new(sender_id: UserId, receiver_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            sender_id,
            receiver_id: receiver_id.into(),
            amount,
            note: None,
            idempotency_key: None,
            deadline: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Result of a successful transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub transfer_id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Amount,
    pub status: String,
    /// True when an earlier transfer with the same idempotency key was returned
    pub replayed: bool,
    pub created_at: DateTime<Utc>,
}

impl TransferResult {
    pub(crate) fn from_record(record: &TransferRecord, replayed: bool) -> Self {
        Self {
            transfer_id: record.id,
            sender_id: record.sender_id.clone(),
            receiver_id: record.receiver_id.clone(),
            amount: record.amount,
            status: "completed".to_string(),
            replayed,
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transfer_command_defaults() {
        let alice = UserId::parse("alice").unwrap();
        let cmd = TransferCommand::new(alice.clone(), "bob", dec!(100.50));

        assert_eq!(cmd.sender_id, alice);
        assert_eq!(cmd.receiver_id, "bob");
        assert_eq!(cmd.amount, dec!(100.50));
        assert!(cmd.note.is_none());
        assert!(cmd.idempotency_key.is_none());
        assert!(cmd.deadline.is_none());
    }

    #[test]
    fn test_transfer_command_builders() {
        let cmd = TransferCommand::new(UserId::parse("alice").unwrap(), "bob", dec!(5))
            .with_note("Payment for services")
            .with_idempotency_key("order-17")
            .with_deadline(Duration::from_millis(250));

        assert_eq!(cmd.note.as_deref(), Some("Payment for services"));
        assert_eq!(cmd.idempotency_key.as_deref(), Some("order-17"));
        assert_eq!(cmd.deadline, Some(Duration::from_millis(250)));
    }
}
