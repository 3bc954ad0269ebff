//! Application error taxonomy
//!
//! Every failure on the HTTP boundary is an [`AppError`]. The kind decides the
//! status code and the machine-readable `code` the gateway sees; the message
//! of a server-side failure is never echoed to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::payments::order_id::OrderIdError;

pub type AppResult<T> = Result<T, AppError>;

/// Caller could not be trusted. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    #[error("source address {ip} is not in the gateway allow-list")]
    ForbiddenSource { ip: String },

    #[error("terminal key does not match the configured terminal")]
    TerminalMismatch,

    #[error("notification token is missing or invalid")]
    InvalidToken,
}

/// Request was malformed. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing JSON data")]
    MissingPayload,

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("order id '{order_id}' has an invalid format")]
    InvalidOrderId { order_id: String },

    #[error("user id '{uid}' is not numeric")]
    InvalidUid { uid: String },

    #[error("invalid form input: {message}")]
    InvalidForm { message: String },
}

/// Well-formed request the business rules refuse
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusinessError {
    #[error("user {user_id} not found")]
    UserNotFound { user_id: i64 },

    #[error("payment {order_id} is already in progress")]
    PaymentInProgress { order_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    #[error("{provider} error: {message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InfrastructureError {
    #[error("store still failing after {attempts} attempts: {message}")]
    TransientStore { attempts: u32, message: String },

    #[error("store error: {message}")]
    FatalStore { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppErrorKind {
    #[error(transparent)]
    Authentication(AuthenticationError),
    #[error(transparent)]
    Validation(ValidationError),
    #[error(transparent)]
    Business(BusinessError),
    #[error(transparent)]
    External(ExternalError),
    #[error(transparent)]
    Infrastructure(InfrastructureError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

/// JSON body returned to the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            AppErrorKind::Authentication(_) => StatusCode::FORBIDDEN,
            AppErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::Business(BusinessError::UserNotFound { .. }) => StatusCode::NOT_FOUND,
            AppErrorKind::Business(BusinessError::PaymentInProgress { .. }) => StatusCode::CONFLICT,
            AppErrorKind::External(_) | AppErrorKind::Infrastructure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match &self.kind {
            AppErrorKind::Authentication(e) => match e {
                AuthenticationError::ForbiddenSource { .. } => "FORBIDDEN",
                AuthenticationError::TerminalMismatch => "TERMINAL_MISMATCH",
                AuthenticationError::InvalidToken => "INVALID_TOKEN",
            },
            AppErrorKind::Validation(e) => match e {
                ValidationError::MissingPayload | ValidationError::InvalidForm { .. } => {
                    "BAD_REQUEST"
                }
                ValidationError::MissingField { .. } | ValidationError::InvalidAmount { .. } => {
                    "INVALID_DATA"
                }
                ValidationError::InvalidOrderId { .. } => "INVALID_ORDER_ID",
                ValidationError::InvalidUid { .. } => "INVALID_UID",
            },
            AppErrorKind::Business(BusinessError::UserNotFound { .. }) => "USER_NOT_FOUND",
            AppErrorKind::Business(BusinessError::PaymentInProgress { .. }) => "PAYMENT_IN_PROGRESS",
            AppErrorKind::External(_) => "GATEWAY_ERROR",
            AppErrorKind::Infrastructure(_) => "SERVER_ERROR",
        }
    }

    /// Message safe to return over HTTP
    pub fn public_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Authentication(AuthenticationError::ForbiddenSource { .. }) => {
                "Access denied".to_string()
            }
            AppErrorKind::Authentication(e) => e.to_string(),
            AppErrorKind::Validation(ValidationError::MissingField { field }) => {
                format!("Missing required field: {}", field)
            }
            AppErrorKind::Validation(e) => e.to_string(),
            AppErrorKind::Business(e) => e.to_string(),
            AppErrorKind::External(_) => "Payment gateway is unavailable".to_string(),
            AppErrorKind::Infrastructure(_) => "Internal server error".to_string(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.public_message(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.kind, context),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

impl From<AuthenticationError> for AppError {
    fn from(err: AuthenticationError) -> Self {
        Self::new(AppErrorKind::Authentication(err))
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }
}

impl From<OrderIdError> for AppError {
    fn from(err: OrderIdError) -> Self {
        match err {
            OrderIdError::MalformedOrderToken(order_id) => {
                ValidationError::InvalidOrderId { order_id }.into()
            }
            OrderIdError::NonNumericUserId(uid) => ValidationError::InvalidUid { uid }.into(),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let kind = match err {
            LedgerError::UserNotFound { user_id } => {
                AppErrorKind::Business(BusinessError::UserNotFound { user_id })
            }
            LedgerError::ServerError { attempts, source } => {
                AppErrorKind::Infrastructure(InfrastructureError::TransientStore {
                    attempts,
                    message: source.to_string(),
                })
            }
            LedgerError::Fatal(source) => {
                AppErrorKind::Infrastructure(InfrastructureError::FatalStore {
                    message: source.to_string(),
                })
            }
        };
        Self::new(kind)
    }
}
