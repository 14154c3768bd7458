//! Amount and Balance types
//!
//! Domain primitives for monetary values, held as integer minor units.
//! All amounts are validated at construction time, ensuring invalid values
//! cannot exist in the system.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum single amount and maximum balance (1 trillion minor units)
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Amount represents a validated transfer value in minor units.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum value is [`MAX_AMOUNT`]
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use peerpay::domain::Amount;
///
/// let amount = Amount::from_decimal_floor(Decimal::new(997, 1)).unwrap();
/// assert_eq!(amount.units(), 99);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount or Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount {0} is below the smallest currency unit")]
    BelowMinimumUnit(Decimal),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Balance cannot be negative (got {0})")]
    NegativeBalance(i64),

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount from minor units.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if units <= 0
    /// - `AmountError::Overflow` if units > [`MAX_AMOUNT`]
    pub fn new(units: i64) -> Result<Self, AmountError> {
        if units <= 0 {
            return Err(AmountError::NotPositive(Decimal::from(units)));
        }
        if units > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }
        Ok(Self(units))
    }

    /// Floor a caller-supplied decimal to whole minor units.
    ///
    /// The raw value must be positive; a value that floors to zero
    /// (e.g. `0.5`) is rejected with `BelowMinimumUnit`.
    pub fn from_decimal_floor(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        let floored = value.floor();
        if floored <= Decimal::ZERO {
            return Err(AmountError::BelowMinimumUnit(value));
        }

        let units = floored.to_i64().ok_or(AmountError::Overflow)?;
        Self::new(units)
    }

    /// Get the value in minor units.
    pub fn units(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::from_decimal_floor(decimal)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance represents an account balance in minor units.
/// Unlike Amount, Balance can be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Balance(i64);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(units: i64) -> Result<Self, AmountError> {
        if units < 0 {
            return Err(AmountError::NegativeBalance(units));
        }
        if units > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }
        Ok(Self(units))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(0)
    }

    /// Get the value in minor units
    pub fn units(&self) -> i64 {
        self.0
    }

    /// Check if balance is sufficient for withdrawal
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.units()
    }

    /// Apply a signed delta, rejecting results below zero or above the cap.
    pub fn adjust(&self, delta: i64) -> Result<Balance, AmountError> {
        let next = self.0.checked_add(delta).ok_or(AmountError::Overflow)?;
        Balance::new(next)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<i64> for Balance {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Balance::new(value)
    }
}

impl From<Balance> for i64 {
    fn from(balance: Balance) -> Self {
        balance.0
    }
}
