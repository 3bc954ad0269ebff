//! Request token signing for the gateway API
//!
//! The gateway authenticates requests with a SHA-256 token over the values of
//! the request fields plus the terminal password, concatenated in key order.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Key under which the shared secret joins the signing set
pub const SECRET_KEY: &str = "Password";
/// Key carrying the token itself; never part of the signing set
pub const TOKEN_KEY: &str = "Token";

const MASK: &str = "***";

/// Compute the hex token for `fields` signed with `secret`
pub fn sign(fields: &BTreeMap<String, String>, secret: &str) -> String {
    let mut hasher = Sha256::new();
    let mut secret_pending = true;

    // BTreeMap iterates in byte order, which is the gateway's key order.
    for (key, value) in fields {
        if key.as_str() == SECRET_KEY {
            continue;
        }
        if secret_pending && key.as_str() > SECRET_KEY {
            hasher.update(secret.as_bytes());
            secret_pending = false;
        }
        hasher.update(value.as_bytes());
    }
    if secret_pending {
        hasher.update(secret.as_bytes());
    }

    hex::encode(hasher.finalize())
}

/// Check a presented token against the one computed for `fields`
pub fn verify(fields: &BTreeMap<String, String>, secret: &str, presented: &str) -> bool {
    let computed = sign(fields, secret);
    constant_time_eq(computed.as_bytes(), presented.trim().as_bytes())
}

/// Copy of the signing set that is safe to log
pub fn masked(fields: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut masked = fields.clone();
    masked.insert(SECRET_KEY.to_string(), MASK.to_string());
    masked
}

/// Signing set of an inbound notification: every top-level scalar except the token
pub fn notification_fields(payload: &Value) -> BTreeMap<String, String> {
    let Some(object) = payload.as_object() else {
        return BTreeMap::new();
    };

    object
        .iter()
        .filter(|(key, _)| key.as_str() != TOKEN_KEY)
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key.clone(), rendered))
        })
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}
