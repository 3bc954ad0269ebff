//! Gateway notification endpoint

use super::AppState;
use crate::error::AppError;
use crate::ledger::CreditOutcome;
use crate::payments::callback::CallbackDecision;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Acknowledgement body; errors use the same `{code, message}` shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallbackReply {
    pub code: String,
    pub message: String,
}

impl CallbackReply {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

pub async fn payment_callback(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let peer_ip = peer.map(|ConnectInfo(addr)| addr.ip());

    let accepted = match state.authenticator.authenticate(&headers, peer_ip, &body) {
        Ok(CallbackDecision::Accepted(accepted)) => accepted,
        Ok(CallbackDecision::Ignored { status }) => {
            let reply = CallbackReply::new(
                "UNSUPPORTED_STATUS",
                format!("Status {} is not processed", status),
            );
            return (StatusCode::OK, Json(reply)).into_response();
        }
        Err(rejection) => return AppError::from(rejection).into_response(),
    };

    // Outcomes are logged by the ledger updater
    let credit = accepted.credit_request();
    match state.ledger.apply_credit(&credit).await {
        Ok(CreditOutcome::Applied { .. }) => {
            (StatusCode::OK, Json(CallbackReply::new("SUCCESS", "Payment processed"))).into_response()
        }
        Ok(CreditOutcome::Duplicate) => (
            StatusCode::OK,
            Json(CallbackReply::new("SUCCESS", "Payment already processed")),
        )
            .into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}
