//! Idempotency module
//!
//! Prevents duplicate transfers when clients retry with the same key.

mod key;

pub use key::{request_fingerprint, IdempotencyError, IdempotencyKey, MAX_KEY_LEN};
