//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod context;
pub mod error;
pub mod ids;
pub mod record;

pub use amount::{Amount, AmountError, Balance, MAX_AMOUNT};
pub use context::OperationContext;
pub use error::{ErrorKind, TransferError};
pub use ids::{IdError, UserId};
pub use record::{NewTransfer, Note, TransferRecord, MAX_NOTE_LEN};
