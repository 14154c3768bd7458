//! peerpay Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod domain;
pub mod engine;
pub mod history;
pub mod idempotency;
pub mod identity;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{Amount, AmountError, Balance, OperationContext, TransferError, UserId};
pub use engine::{TransferCommand, TransferEngine, TransferResult};
pub use history::{HistoryEntry, HistoryQuery};
