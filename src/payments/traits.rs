//! Payment provider trait definitions

use crate::error::AppResult;
use crate::payments::types::{InitPaymentRequest, InitPaymentResponse};
use async_trait::async_trait;

/// Outbound side of a payment gateway integration
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Provider name used in logs and errors
    fn name(&self) -> &str;

    /// Open a payment session with the gateway
    ///
    /// A gateway refusal is a normal [`InitPaymentResponse::Rejected`]; only
    /// transport and protocol failures are errors.
    async fn initiate_payment(&self, request: InitPaymentRequest) -> AppResult<InitPaymentResponse>;
}
