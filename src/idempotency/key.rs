//! Idempotency keys
//!
//! A client may tag a transfer with a key so that retrying an `Aborted`
//! (or unanswered) request cannot move funds twice. Keys are scoped to the
//! sender; the stored request fingerprint detects reuse of a key for a
//! different request.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::domain::{Amount, Note, UserId};

/// Maximum key length
pub const MAX_KEY_LEN: usize = 64;

/// Validated client-supplied idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdempotencyError {
    #[error("Idempotency key must be 1..={MAX_KEY_LEN} characters")]
    BadLength,

    #[error("Idempotency key may only contain letters, digits, '-' and '_'")]
    BadCharacters,
}

impl IdempotencyKey {
    pub fn parse(raw: &str) -> Result<Self, IdempotencyError> {
        if raw.is_empty() || raw.len() > MAX_KEY_LEN {
            return Err(IdempotencyError::BadLength);
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(IdempotencyError::BadCharacters);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute SHA-256 over the fields that define a transfer request, for
/// conflict detection on key reuse.
pub fn request_fingerprint(receiver_id: &UserId, amount: &Amount, note: &Note) -> String {
    let mut hasher = Sha256::new();
    hasher.update(receiver_id.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(amount.units().to_be_bytes());
    hasher.update([0u8]);
    hasher.update(note.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        assert!(IdempotencyKey::parse("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(IdempotencyKey::parse("retry_1").is_ok());
        assert_eq!(IdempotencyKey::parse(""), Err(IdempotencyError::BadLength));
        assert_eq!(
            IdempotencyKey::parse(&"k".repeat(MAX_KEY_LEN + 1)),
            Err(IdempotencyError::BadLength)
        );
        assert_eq!(
            IdempotencyKey::parse("has space"),
            Err(IdempotencyError::BadCharacters)
        );
    }

    #[test]
    fn test_fingerprint() {
        let bob = UserId::parse("bob").unwrap();
        let carol = UserId::parse("carol").unwrap();
        let amount = Amount::new(200).unwrap();
        let rent = Note::new("rent").unwrap();

        let hash = request_fingerprint(&bob, &amount, &rent);

        // Hash should be 64 hex characters (SHA-256)
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, request_fingerprint(&bob, &amount, &rent));

        assert_ne!(hash, request_fingerprint(&carol, &amount, &rent));
        assert_ne!(hash, request_fingerprint(&bob, &Amount::new(201).unwrap(), &rent));
        assert_ne!(hash, request_fingerprint(&bob, &amount, &Note::default()));
    }
}
