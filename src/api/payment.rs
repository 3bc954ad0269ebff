//! Payment initiation form and the gateway's success return

use super::AppState;
use crate::error::{AppError, AppErrorKind, BusinessError, ValidationError};
use crate::ledger::PaymentOrder;
use crate::payments::order_id;
use crate::payments::types::{InitPaymentRequest, InitPaymentResponse, MinorUnits, PaymentStatus};
use axum::{
    body::Bytes,
    extract::{rejection::FormRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

/// Amount charged when the form leaves it out, in major units
pub const DEFAULT_AMOUNT: &str = "1000";

#[derive(Debug, Deserialize)]
pub struct PaymentForm {
    pub uid: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitiationError {
    pub error: String,
}

fn initiation_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(InitiationError {
            error: message.into(),
        }),
    )
        .into_response()
}

fn initiation_failure(err: AppError) -> Response {
    initiation_error(err.status_code(), err.public_message())
}

fn parse_form(form: PaymentForm) -> Result<InitPaymentRequest, AppError> {
    let uid = form.uid.ok_or(ValidationError::MissingField { field: "uid" })?;
    let trimmed = uid.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidUid { uid }.into());
    }
    let user_id: i64 = trimmed
        .parse()
        .map_err(|_| ValidationError::InvalidUid { uid: uid.clone() })?;

    let raw_amount = form.amount.unwrap_or_else(|| DEFAULT_AMOUNT.to_string());
    let amount = MinorUnits::from_major_str(&raw_amount).map_err(|e| ValidationError::InvalidAmount {
        message: e.to_string(),
    })?;
    if amount == MinorUnits::ZERO {
        return Err(ValidationError::InvalidAmount {
            message: "amount must be greater than zero".to_string(),
        }
        .into());
    }

    Ok(InitPaymentRequest {
        user_id,
        amount,
        order_id: order_id::encode(user_id, Utc::now()),
    })
}

/// `POST /`: open a payment session and send the customer to the gateway
pub async fn create_payment(
    State(state): State<AppState>,
    form: Result<Form<PaymentForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            warn!("Rejected payment form: {}", rejection);
            return initiation_failure(
                ValidationError::InvalidForm {
                    message: rejection.body_text(),
                }
                .into(),
            );
        }
    };

    let request = match parse_form(form) {
        Ok(request) => request,
        Err(e) => {
            warn!(code = e.code(), "Invalid payment form: {}", e);
            return initiation_failure(e);
        }
    };

    info!(
        order_id = %request.order_id,
        user_id = request.user_id,
        amount = request.amount.value(),
        "Payment requested"
    );

    let order = PaymentOrder {
        order_id: request.order_id.clone(),
        user_id: request.user_id,
        amount: request.amount,
        created_at: Utc::now(),
    };
    if let Err(e) = state.store().record_order(&order).await {
        if e.is_constraint_violation() {
            warn!(order_id = %order.order_id, "Payment order already recorded");
            return initiation_failure(AppError::new(AppErrorKind::Business(
                BusinessError::PaymentInProgress {
                    order_id: order.order_id,
                },
            )));
        }
        error!(order_id = %order.order_id, "Failed to record payment order: {}", e);
        return initiation_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    }

    match state.provider.initiate_payment(request).await {
        Ok(InitPaymentResponse::Redirect { payment_url }) => Redirect::to(&payment_url).into_response(),
        Ok(InitPaymentResponse::Rejected { message }) => {
            initiation_error(StatusCode::BAD_REQUEST, message)
        }
        Err(e) => {
            error!(provider = state.provider.name(), "Payment initiation failed: {}", e);
            initiation_failure(e)
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessConfirmation {
    pub uid: i64,
    pub amount: i64,
    pub status: String,
}

/// `POST /success/:uid/:amount`: check the gateway's return notification
pub async fn payment_success(
    State(state): State<AppState>,
    Path((uid, amount)): Path<(i64, i64)>,
    body: Bytes,
) -> Response {
    let data = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(map)) if !map.is_empty() => map,
        _ => {
            warn!(uid, "Success return without a JSON body");
            return (StatusCode::BAD_REQUEST, "Invalid request").into_response();
        }
    };

    let terminal_key = data.get("TerminalKey").and_then(Value::as_str);
    if terminal_key != Some(state.authenticator.config().terminal_key.as_str()) {
        warn!(uid, presented = ?terminal_key, "Terminal key mismatch on success return");
        return (StatusCode::FORBIDDEN, "Terminal key mismatch").into_response();
    }

    let status = data
        .get("Status")
        .and_then(Value::as_str)
        .map(PaymentStatus::parse);
    if status != Some(PaymentStatus::Confirmed) {
        info!(uid, status = ?status, "Success return for unconfirmed payment");
        return (StatusCode::OK, "Payment status is not CONFIRMED").into_response();
    }

    Json(SuccessConfirmation {
        uid,
        amount,
        status: PaymentStatus::Confirmed.to_string(),
    })
    .into_response()
}
