use super::retry::RetryPolicy;
use super::store::{CreditAttempt, CreditRequest, PaymentStore};
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Applied { journal_id: i64 },
    /// The order was credited by an earlier delivery
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("user {user_id} not found")]
    UserNotFound { user_id: i64 },

    #[error("store unavailable after {attempts} attempts: {source}")]
    ServerError { attempts: u32, source: DatabaseError },

    #[error("store rejected the credit: {0}")]
    Fatal(DatabaseError),
}

/// Applies gateway credits to user balances with retry and dedup
pub struct LedgerUpdater {
    store: Arc<dyn PaymentStore>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl LedgerUpdater {
    pub fn new(store: Arc<dyn PaymentStore>, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            store,
            policy,
            attempt_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        &self.store
    }

    pub async fn apply_credit(&self, credit: &CreditRequest) -> Result<CreditOutcome, LedgerError> {
        let result = self
            .policy
            .run(
                |attempt| async move {
                    debug!(
                        order_id = %credit.order_id,
                        user_id = credit.user_id,
                        attempt,
                        "Applying balance credit"
                    );
                    self.attempt(credit).await
                },
                DatabaseError::is_retryable,
            )
            .await;

        match result {
            Ok(CreditAttempt::Applied { journal_id }) => {
                info!(
                    order_id = %credit.order_id,
                    user_id = credit.user_id,
                    amount = credit.amount.value(),
                    journal_id,
                    "Balance credited"
                );
                Ok(CreditOutcome::Applied { journal_id })
            }
            Ok(CreditAttempt::Duplicate) => {
                info!(
                    order_id = %credit.order_id,
                    user_id = credit.user_id,
                    "Order already credited, skipping redelivery"
                );
                Ok(CreditOutcome::Duplicate)
            }
            Ok(CreditAttempt::UserNotFound) => {
                warn!(
                    order_id = %credit.order_id,
                    user_id = credit.user_id,
                    "User not found, credit rolled back"
                );
                Err(LedgerError::UserNotFound {
                    user_id: credit.user_id,
                })
            }
            Err(failure) if failure.exhausted => {
                error!(
                    order_id = %credit.order_id,
                    attempts = failure.attempts,
                    "Store still failing after retries: {}",
                    failure.error
                );
                Err(LedgerError::ServerError {
                    attempts: failure.attempts,
                    source: failure.error,
                })
            }
            Err(failure) => {
                error!(
                    order_id = %credit.order_id,
                    "Store rejected credit: {}",
                    failure.error
                );
                Err(LedgerError::Fatal(failure.error))
            }
        }
    }

    async fn attempt(&self, credit: &CreditRequest) -> Result<CreditAttempt, DatabaseError> {
        match tokio::time::timeout(self.attempt_timeout, self.store.apply_credit_once(credit)).await {
            Ok(result) => result,
            Err(_) => Err(DatabaseError::new(DatabaseErrorKind::ConnectionTimeout)
                .with_context(format!("credit attempt exceeded {:?}", self.attempt_timeout))),
        }
    }
}
