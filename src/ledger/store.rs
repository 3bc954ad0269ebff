use crate::database::error::DbResult;
use crate::payments::types::MinorUnits;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Payment session opened with the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOrder {
    pub order_id: String,
    pub user_id: i64,
    pub amount: MinorUnits,
    pub created_at: DateTime<Utc>,
}

/// One balance credit, keyed by the gateway order id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRequest {
    pub user_id: i64,
    pub amount: MinorUnits,
    pub order_id: String,
    pub comment: String,
}

/// Audit row written together with a credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct JournalEntry {
    pub journal_id: i64,
    pub reference_id: String,
    pub comment: String,
    pub source_system: String,
    pub user_id: i64,
    pub amount_minor_units: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of a single credit transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditAttempt {
    /// Balance and journal committed
    Applied { journal_id: i64 },
    /// A journal row for this order already exists; nothing changed
    Duplicate,
    /// No account row for the user; rolled back
    UserNotFound,
}

/// Durable state behind the notification processor.
///
/// `apply_credit_once` must increment the balance and append the journal row
/// in one transaction, and must be a no-op for an order id that already has a
/// journal row, including when two calls for it race.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn record_order(&self, order: &PaymentOrder) -> DbResult<()>;

    async fn apply_credit_once(&self, credit: &CreditRequest) -> DbResult<CreditAttempt>;

    async fn find_journal_entry(&self, reference_id: &str) -> DbResult<Option<JournalEntry>>;

    /// Reachability probe for health checks
    async fn ping(&self) -> DbResult<()>;
}
