//! T-Bank (Tinkoff) acquiring API client
//!
//! Only the `Init` call is used: it registers an order with the gateway and
//! returns the hosted payment page URL. The gateway reports the outcome later
//! through the notification URL.

use crate::error::{AppError, AppErrorKind, AppResult, ExternalError, InfrastructureError};
use crate::payments::signature;
use crate::payments::traits::PaymentProvider;
use crate::payments::types::{InitPaymentRequest, InitPaymentResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{error, info};

const PROVIDER: &str = "T-Bank";

#[derive(Clone)]
pub struct TBankConfig {
    pub terminal_key: String,
    pub password: String,
    /// API root, e.g. `https://securepay.tinkoff.ru/v2`
    pub api_url: String,
    /// Public base URL of this service, used for notification and return URLs
    pub public_base_url: String,
    pub timeout_secs: u64,
}

impl Default for TBankConfig {
    fn default() -> Self {
        Self {
            terminal_key: String::new(),
            password: String::new(),
            api_url: "https://securepay.tinkoff.ru/v2".to_string(),
            public_base_url: String::new(),
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for TBankConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TBankConfig")
            .field("terminal_key", &self.terminal_key)
            .field("password", &"***")
            .field("api_url", &self.api_url)
            .field("public_base_url", &self.public_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Body of the `Init` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitPayload {
    pub terminal_key: String,
    pub amount: i64,
    pub order_id: String,
    #[serde(rename = "NotificationURL")]
    pub notification_url: String,
    #[serde(rename = "SuccessURL")]
    pub success_url: String,
    pub token: String,
}

impl InitPayload {
    fn signing_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("TerminalKey".to_string(), self.terminal_key.clone()),
            ("Amount".to_string(), self.amount.to_string()),
            ("OrderId".to_string(), self.order_id.clone()),
            ("NotificationURL".to_string(), self.notification_url.clone()),
            ("SuccessURL".to_string(), self.success_url.clone()),
        ])
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitResponse {
    success: bool,
    #[serde(rename = "PaymentURL", default)]
    payment_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

pub struct TBankProvider {
    config: TBankConfig,
    client: Client,
}

impl TBankProvider {
    pub fn new(config: TBankConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Configuration {
                    message: format!("failed to create HTTP client: {}", e),
                }))
            })?;

        Ok(Self { config, client })
    }

    pub fn notification_url(&self) -> String {
        format!("{}/payment_callback", self.config.public_base_url.trim_end_matches('/'))
    }

    pub fn success_url(&self, request: &InitPaymentRequest) -> String {
        format!(
            "{}/success/{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            request.user_id,
            request.amount.whole_major()
        )
    }

    /// Build and sign the `Init` body
    pub fn build_init_payload(&self, request: &InitPaymentRequest) -> InitPayload {
        let mut payload = InitPayload {
            terminal_key: self.config.terminal_key.clone(),
            amount: request.amount.value(),
            order_id: request.order_id.clone(),
            notification_url: self.notification_url(),
            success_url: self.success_url(request),
            token: String::new(),
        };

        let fields = payload.signing_fields();
        info!(fields = ?signature::masked(&fields), "Signing Init request");
        payload.token = signature::sign(&fields, &self.config.password);
        payload
    }

    fn provider_error(message: String, is_retryable: bool) -> AppError {
        AppError::new(AppErrorKind::External(ExternalError::PaymentProvider {
            provider: PROVIDER.to_string(),
            message,
            is_retryable,
        }))
    }
}

#[async_trait]
impl PaymentProvider for TBankProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn initiate_payment(&self, request: InitPaymentRequest) -> AppResult<InitPaymentResponse> {
        let payload = self.build_init_payload(&request);
        let url = format!("{}/Init", self.config.api_url.trim_end_matches('/'));

        info!(
            order_id = %payload.order_id,
            amount = payload.amount,
            "Sending Init request to {}",
            PROVIDER
        );

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(order_id = %payload.order_id, "Init request failed: {}", e);
                Self::provider_error(format!("request failed: {}", e), true)
            })?;

        let status = response.status();
        let body: InitResponse = response.json().await.map_err(|e| {
            error!(order_id = %payload.order_id, %status, "Unreadable Init response: {}", e);
            Self::provider_error(format!("invalid response (HTTP {}): {}", status, e), status.is_server_error())
        })?;

        match (body.success, body.payment_url) {
            (true, Some(payment_url)) => {
                info!(order_id = %payload.order_id, "Payment session created");
                Ok(InitPaymentResponse::Redirect { payment_url })
            }
            (_, _) => {
                let message = body
                    .message
                    .or(body.details)
                    .unwrap_or_else(|| "Payment creation failed".to_string());
                error!(
                    order_id = %payload.order_id,
                    error_code = body.error_code.as_deref().unwrap_or("-"),
                    "Gateway rejected Init: {}",
                    message
                );
                Ok(InitPaymentResponse::Rejected { message })
            }
        }
    }
}
