//! Order identifiers of the form `{user_id}_{unix_seconds}`

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderIdError {
    #[error("order id '{0}' has no numeric user prefix")]
    MalformedOrderToken(String),

    #[error("user id '{0}' is not a valid integer")]
    NonNumericUserId(String),
}

fn user_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)_").expect("static pattern compiles"))
}

pub fn encode(user_id: i64, issued_at: DateTime<Utc>) -> String {
    format!("{}_{}", user_id, issued_at.timestamp())
}

/// Extract the user id from an order id.
///
/// Only the prefix is checked; the timestamp suffix just keeps concurrent
/// orders of one user apart.
pub fn decode(order_id: &str) -> Result<i64, OrderIdError> {
    let captures = user_prefix()
        .captures(order_id)
        .ok_or_else(|| OrderIdError::MalformedOrderToken(order_id.to_string()))?;

    let prefix = &captures[1];
    prefix
        .parse::<i64>()
        .map_err(|_| OrderIdError::NonNumericUserId(prefix.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encode_format() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(encode(6343, at), "6343_1700000000");
    }

    #[test]
    fn test_decode_roundtrip() {
        for (uid, ts) in [(1, 0), (6343, 1_700_000_000), (i64::MAX, 4_102_444_800)] {
            let at = Utc.timestamp_opt(ts, 0).unwrap();
            assert_eq!(decode(&encode(uid, at)), Ok(uid));
        }
    }

    #[test]
    fn test_decode_ignores_suffix() {
        assert_eq!(decode("42_anything-goes"), Ok(42));
        assert_eq!(decode("42_"), Ok(42));
    }

    #[test]
    fn test_decode_malformed() {
        for bad in ["", "abc_123", "_123", "123", " 12_3", "x12_3"] {
            assert_eq!(
                decode(bad),
                Err(OrderIdError::MalformedOrderToken(bad.to_string())),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_decode_non_numeric_user_id() {
        assert_eq!(
            decode("99999999999999999999_1"),
            Err(OrderIdError::NonNumericUserId("99999999999999999999".to_string()))
        );
        // Unicode digits satisfy the pattern but are not an integer
        assert_eq!(
            decode("١٢_1"),
            Err(OrderIdError::NonNumericUserId("١٢".to_string()))
        );
    }
}
