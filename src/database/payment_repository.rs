use crate::database::error::{DatabaseError, DbResult};
use crate::database::transaction::DatabaseTransaction;
use crate::ledger::store::{CreditAttempt, CreditRequest, JournalEntry, PaymentOrder, PaymentStore};
use crate::ledger::SOURCE_SYSTEM;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

/// PostgreSQL-backed payment store.
///
/// The journal insert runs first and is guarded by the unique index on
/// `reference_id`: a concurrent delivery of the same order blocks on that
/// index until the first transaction finishes, then sees the conflict.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current balance of a user, if the account exists
    pub async fn find_balance(&self, user_id: i64) -> DbResult<Option<i64>> {
        sqlx::query_scalar("SELECT balance_minor_units FROM user_accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn record_order(&self, order: &PaymentOrder) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO payment_orders (order_id, user_id, amount_minor_units, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&order.order_id)
        .bind(order.user_id)
        .bind(order.amount.value())
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e).with_context(format!("order {}", order.order_id)))?;

        Ok(())
    }

    async fn apply_credit_once(&self, credit: &CreditRequest) -> DbResult<CreditAttempt> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;

        let journal_id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO ledger_journal (reference_id, comment, source_system, user_id, amount_minor_units)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (reference_id) DO NOTHING
             RETURNING journal_id",
        )
        .bind(&credit.order_id)
        .bind(&credit.comment)
        .bind(SOURCE_SYSTEM)
        .bind(credit.user_id)
        .bind(credit.amount.value())
        .fetch_optional(tx.conn()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(journal_id) = journal_id else {
            debug!(order_id = %credit.order_id, "Journal row exists, rolling back");
            tx.rollback().await?;
            return Ok(CreditAttempt::Duplicate);
        };

        let updated = sqlx::query(
            "UPDATE user_accounts
             SET balance_minor_units = balance_minor_units + $1
             WHERE user_id = $2",
        )
        .bind(credit.amount.value())
        .bind(credit.user_id)
        .execute(tx.conn()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CreditAttempt::UserNotFound);
        }

        tx.commit().await?;
        Ok(CreditAttempt::Applied { journal_id })
    }

    async fn find_journal_entry(&self, reference_id: &str) -> DbResult<Option<JournalEntry>> {
        sqlx::query_as::<_, JournalEntry>(
            "SELECT journal_id, reference_id, comment, source_system, user_id, amount_minor_units, created_at
             FROM ledger_journal WHERE reference_id = $1",
        )
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn ping(&self) -> DbResult<()> {
        super::health_check(&self.pool).await?;
        debug!(stats = ?super::get_pool_stats(&self.pool), "Ledger store reachable");
        Ok(())
    }
}
