//! Transfer State Machine
//!
//! `Validating → Reserving → Committing → Done`, with the terminal failure
//! exits `Rejected` (client error) and `Aborted` (system error). Neither
//! failure exit leaves side effects behind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transfer FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Checking the request shape; no store access yet
    Validating,
    /// Checking sender funds and receiver existence
    Reserving,
    /// Inside the atomic scope
    Committing,
    /// Scope committed
    Done,
    /// Client error, nothing applied
    Rejected,
    /// System error or deadline, scope rolled back
    Aborted,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Validating => "validating",
            TransferState::Reserving => "reserving",
            TransferState::Committing => "committing",
            TransferState::Done => "done",
            TransferState::Rejected => "rejected",
            TransferState::Aborted => "aborted",
        }
    }

    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Done | TransferState::Rejected | TransferState::Aborted
        )
    }

    /// Whether `next` is a legal successor of this state.
    ///
    /// Any state before `Committing` may jump to `Done` when an earlier
    /// transfer with the same idempotency key is found. `Committing →
    /// Reserving` is a retry after a lost commit race.
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Validating, Reserving | Done | Rejected | Aborted) => true,
            (Reserving, Committing | Done | Rejected | Aborted) => true,
            (Committing, Done | Reserving | Rejected | Aborted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
