use crate::database::error::{DatabaseError, DatabaseErrorKind};
use sqlx::Transaction as SqlxTransaction;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::{debug, error as log_error};

/// Database transaction wrapper for atomic operations.
///
/// Dropping an uncommitted wrapper rolls the transaction back and returns the
/// connection to the pool, so early returns and cancelled futures never leak
/// a half-applied credit.
pub struct DatabaseTransaction {
    transaction: Option<SqlxTransaction<'static, Postgres>>,
}

impl DatabaseTransaction {
    /// Begin a new transaction
    pub async fn begin(pool: &PgPool) -> Result<Self, DatabaseError> {
        debug!("Beginning database transaction");

        let transaction = pool.begin().await.map_err(|e| {
            log_error!("Failed to begin transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        Ok(Self {
            transaction: Some(transaction),
        })
    }

    /// Commit the transaction
    pub async fn commit(mut self) -> Result<(), DatabaseError> {
        let tx = self.take()?;
        debug!("Committing transaction");

        tx.commit().await.map_err(|e| {
            log_error!("Failed to commit transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })
    }

    /// Rollback the transaction
    pub async fn rollback(mut self) -> Result<(), DatabaseError> {
        let tx = self.take()?;
        debug!("Rolling back transaction");

        tx.rollback().await.map_err(|e| {
            log_error!("Failed to rollback transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })
    }

    /// Connection bound to this transaction, for executing queries
    pub fn conn(&mut self) -> Result<&mut PgConnection, DatabaseError> {
        self.transaction
            .as_deref_mut()
            .ok_or_else(Self::completed_error)
    }

    fn take(&mut self) -> Result<SqlxTransaction<'static, Postgres>, DatabaseError> {
        self.transaction.take().ok_or_else(Self::completed_error)
    }

    fn completed_error() -> DatabaseError {
        DatabaseError::new(DatabaseErrorKind::TransactionError {
            message: "Transaction already completed".to_string(),
        })
    }
}
