//! Payment types and data structures
//!
//! Amounts travel as integer minor units (kopecks) everywhere: on the wire to
//! and from the gateway, and in the ledger. `MinorUnits` is the only place that
//! converts between major and minor units.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Non-negative amount in minor currency units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MinorUnits(i64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount '{0}' is not a valid decimal number")]
    Invalid(String),

    #[error("amount '{0}' is out of range")]
    OutOfRange(String),
}

impl MinorUnits {
    pub const PER_MAJOR: i64 = 100;
    pub const ZERO: MinorUnits = MinorUnits(0);

    pub fn new(value: i64) -> Option<Self> {
        (value >= 0).then_some(Self(value))
    }

    pub fn from_major(major: i64) -> Option<Self> {
        major.checked_mul(Self::PER_MAJOR).and_then(Self::new)
    }

    /// Parse a major-unit amount as typed into the payment form ("500", "5.00").
    ///
    /// The fractional part is validated and then dropped: the form only ever
    /// charges whole major units.
    pub fn from_major_str(input: &str) -> Result<Self, AmountError> {
        let trimmed = input.trim();
        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };

        let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !digits_only(whole) || !digits_only(fraction) {
            return Err(AmountError::Invalid(input.to_string()));
        }

        let major: i64 = whole
            .parse()
            .map_err(|_| AmountError::OutOfRange(input.to_string()))?;
        Self::from_major(major).ok_or_else(|| AmountError::OutOfRange(input.to_string()))
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn whole_major(self) -> i64 {
        self.0 / Self::PER_MAJOR
    }

    /// Human-readable major-unit rendering, e.g. `500.00`
    pub fn major_display(self) -> String {
        format!("{}.{:02}", self.0 / Self::PER_MAJOR, self.0 % Self::PER_MAJOR)
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment status reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Authorized,
    Confirmed,
    Other(String),
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "AUTHORIZED" => Self::Authorized,
            "CONFIRMED" => Self::Confirmed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Authorized => "AUTHORIZED",
            Self::Confirmed => "CONFIRMED",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to open a payment session with the gateway
#[derive(Debug, Clone)]
pub struct InitPaymentRequest {
    pub user_id: i64,
    pub amount: MinorUnits,
    pub order_id: String,
}

/// Gateway answer to an Init request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitPaymentResponse {
    /// Customer should be redirected to the hosted payment page
    Redirect { payment_url: String },
    /// Gateway refused to create the payment
    Rejected { message: String },
}
