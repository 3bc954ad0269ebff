//! Gateway notification authentication
//!
//! A notification moves through the checkpoints of [`CallbackStage`] in order
//! and stops at the first failed check. Only an accepted notification yields
//! an [`AcceptedPayment`] for the ledger; everything downstream works on the
//! typed [`CallbackEvent`] and never touches the raw payload again.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use http::HeaderMap;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{AppError, AuthenticationError, ValidationError};
use crate::ledger::{audit_comment, CreditRequest};
use crate::payments::network::{resolve_client_ip, AllowList};
use crate::payments::order_id;
use crate::payments::signature;
use crate::payments::types::{MinorUnits, PaymentStatus};

const REQUIRED_FIELDS: [&str; 3] = ["Status", "OrderId", "Amount"];

/// Last checkpoint a notification passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CallbackStage {
    Received,
    SourceChecked,
    SchemaChecked,
    IdentityChecked,
    StatusChecked,
    Accepted,
}

#[derive(Clone)]
pub struct AuthenticatorConfig {
    pub terminal_key: String,
    pub password: String,
    pub allowed_networks: AllowList,
    /// Peers whose `X-Real-Ip`/`X-Forwarded-For` headers are believed
    pub trusted_proxies: AllowList,
    pub success_statuses: Vec<PaymentStatus>,
    pub require_terminal_key: bool,
    pub require_token: bool,
}

impl fmt::Debug for AuthenticatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatorConfig")
            .field("terminal_key", &self.terminal_key)
            .field("password", &"***")
            .field("allowed_networks", &self.allowed_networks)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("success_statuses", &self.success_statuses)
            .field("require_terminal_key", &self.require_terminal_key)
            .field("require_token", &self.require_token)
            .finish()
    }
}

/// Typed view of a notification that passed the schema check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub terminal_key: Option<String>,
    pub order_id: String,
    pub status: PaymentStatus,
    pub amount: MinorUnits,
    pub payment_id: Option<String>,
    pub card_id: Option<String>,
    pub token: Option<String>,
    signed_fields: BTreeMap<String, String>,
}

/// Confirmed payment ready to be credited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedPayment {
    pub user_id: i64,
    pub amount: MinorUnits,
    pub order_id: String,
    pub payment_id: Option<String>,
    pub card_id: Option<String>,
}

impl AcceptedPayment {
    pub fn credit_request(&self) -> CreditRequest {
        CreditRequest {
            user_id: self.user_id,
            amount: self.amount,
            order_id: self.order_id.clone(),
            comment: audit_comment(
                &self.order_id,
                self.payment_id.as_deref(),
                self.amount,
                self.card_id.as_deref(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackDecision {
    Accepted(AcceptedPayment),
    /// Authentic notification for a status we do not act on
    Ignored { status: PaymentStatus },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRejection {
    /// Last checkpoint passed before the failure
    pub stage: CallbackStage,
    pub error: AppError,
}

impl From<CallbackRejection> for AppError {
    fn from(rejection: CallbackRejection) -> Self {
        rejection.error
    }
}

pub struct CallbackAuthenticator {
    config: AuthenticatorConfig,
}

impl CallbackAuthenticator {
    pub fn new(config: AuthenticatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AuthenticatorConfig {
        &self.config
    }

    pub fn authenticate(
        &self,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
        body: &[u8],
    ) -> Result<CallbackDecision, CallbackRejection> {
        let mut stage = CallbackStage::Received;
        let reject = |stage: CallbackStage, error: AppError| {
            warn!(?stage, code = error.code(), "Notification rejected: {}", error);
            CallbackRejection { stage, error }
        };

        self.check_source(headers, peer).map_err(|e| reject(stage, e))?;
        stage = CallbackStage::SourceChecked;

        let (payload, event) = parse_event(body).map_err(|e| reject(stage, e))?;
        debug!(%payload, "Notification payload");
        stage = CallbackStage::SchemaChecked;

        self.check_identity(&event).map_err(|e| reject(stage, e))?;
        stage = CallbackStage::IdentityChecked;

        if !self.config.success_statuses.contains(&event.status) {
            info!(
                order_id = %event.order_id,
                status = %event.status,
                ?stage,
                "Ignoring notification status"
            );
            return Ok(CallbackDecision::Ignored {
                status: event.status,
            });
        }
        stage = CallbackStage::StatusChecked;

        let user_id = order_id::decode(&event.order_id).map_err(|e| reject(stage, e.into()))?;

        info!(
            order_id = %event.order_id,
            user_id,
            amount = event.amount.value(),
            status = %event.status,
            stage = ?CallbackStage::Accepted,
            "Payment notification accepted"
        );

        Ok(CallbackDecision::Accepted(AcceptedPayment {
            user_id,
            amount: event.amount,
            order_id: event.order_id,
            payment_id: event.payment_id,
            card_id: event.card_id,
        }))
    }

    fn check_source(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Result<(), AppError> {
        match resolve_client_ip(headers, peer, &self.config.trusted_proxies) {
            Some(ip) if self.config.allowed_networks.allows(ip) => {
                debug!(%ip, "Notification source allowed");
                Ok(())
            }
            Some(ip) => Err(AuthenticationError::ForbiddenSource { ip: ip.to_string() }.into()),
            None => Err(AuthenticationError::ForbiddenSource {
                ip: "unknown".to_string(),
            }
            .into()),
        }
    }

    fn check_identity(&self, event: &CallbackEvent) -> Result<(), AppError> {
        match event.terminal_key.as_deref() {
            Some(key) if key == self.config.terminal_key => {}
            Some(key) => {
                warn!(presented = key, "Terminal key mismatch");
                return Err(AuthenticationError::TerminalMismatch.into());
            }
            None if self.config.require_terminal_key => {
                return Err(AuthenticationError::TerminalMismatch.into());
            }
            None => {}
        }

        match event.token.as_deref() {
            Some(token) => {
                if !signature::verify(&event.signed_fields, &self.config.password, token) {
                    return Err(AuthenticationError::InvalidToken.into());
                }
            }
            None if self.config.require_token => {
                return Err(AuthenticationError::InvalidToken.into());
            }
            None => {}
        }

        Ok(())
    }
}

/// Schema check: JSON object with the required fields and a valid amount
pub fn parse_event(body: &[u8]) -> Result<(Value, CallbackEvent), AppError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|_| AppError::from(ValidationError::MissingPayload))?;

    let object = match payload.as_object() {
        Some(object) if !object.is_empty() => object,
        _ => return Err(ValidationError::MissingPayload.into()),
    };

    if let Some(&field) = REQUIRED_FIELDS.iter().find(|f| !object.contains_key(**f)) {
        return Err(ValidationError::MissingField { field }.into());
    }

    let amount = object
        .get("Amount")
        .and_then(wire_amount)
        .ok_or_else(|| ValidationError::InvalidAmount {
            message: "Amount must be a non-negative integer".to_string(),
        })?;

    let event = CallbackEvent {
        terminal_key: text_field(object, "TerminalKey"),
        order_id: text_field(object, "OrderId").unwrap_or_default(),
        status: PaymentStatus::parse(&text_field(object, "Status").unwrap_or_default()),
        amount,
        payment_id: text_field(object, "PaymentId"),
        card_id: text_field(object, "CardId"),
        token: text_field(object, signature::TOKEN_KEY),
        signed_fields: signature::notification_fields(&payload),
    };

    Ok((payload, event))
}

/// Gateway amounts arrive as JSON integers or numeric strings
fn wire_amount(value: &Value) -> Option<MinorUnits> {
    match value {
        Value::Number(n) => n.as_i64().and_then(MinorUnits::new),
        Value::String(s) => s.trim().parse::<i64>().ok().and_then(MinorUnits::new),
        _ => None,
    }
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
