//! Transfer Engine module
//!
//! The write side: one call moves funds between two accounts and records the
//! transfer as a single all-or-nothing unit.

mod commands;
mod state;
mod transfer;


pub use commands::{TransferCommand, TransferResult};
pub use state::TransferState;
pub use transfer::{EngineOptions, TransferEngine};
