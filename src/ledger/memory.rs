//! In-process payment store for tests and local runs without PostgreSQL

use super::store::{CreditAttempt, CreditRequest, JournalEntry, PaymentOrder, PaymentStore};
use super::SOURCE_SYSTEM;
use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<i64, i64>,
    journal: Vec<JournalEntry>,
    orders: HashMap<String, PaymentOrder>,
}

#[derive(Debug, Default)]
pub struct MemoryPaymentStore {
    state: Mutex<MemoryState>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `(user_id, balance_minor_units)` accounts
    pub fn with_accounts<I>(accounts: I) -> Self
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        let store = Self::new();
        store.lock().accounts.extend(accounts);
        store
    }

    pub fn balance(&self, user_id: i64) -> Option<i64> {
        self.lock().accounts.get(&user_id).copied()
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock().journal.clone()
    }

    pub fn order(&self, order_id: &str) -> Option<PaymentOrder> {
        self.lock().orders.get(order_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn record_order(&self, order: &PaymentOrder) -> DbResult<()> {
        let mut state = self.lock();
        if state.orders.contains_key(&order.order_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueConstraintViolation {
                constraint: "payment_orders_pkey".to_string(),
            }));
        }
        state.orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn apply_credit_once(&self, credit: &CreditRequest) -> DbResult<CreditAttempt> {
        let mut state = self.lock();

        if state
            .journal
            .iter()
            .any(|entry| entry.reference_id == credit.order_id)
        {
            return Ok(CreditAttempt::Duplicate);
        }

        let Some(balance) = state.accounts.get_mut(&credit.user_id) else {
            return Ok(CreditAttempt::UserNotFound);
        };
        *balance = balance.checked_add(credit.amount.value()).ok_or_else(|| {
            DatabaseError::new(DatabaseErrorKind::QueryError {
                message: "bigint out of range".to_string(),
            })
        })?;

        let journal_id = state.journal.len() as i64 + 1;
        state.journal.push(JournalEntry {
            journal_id,
            reference_id: credit.order_id.clone(),
            comment: credit.comment.clone(),
            source_system: SOURCE_SYSTEM.to_string(),
            user_id: credit.user_id,
            amount_minor_units: credit.amount.value(),
            created_at: Utc::now(),
        });

        Ok(CreditAttempt::Applied { journal_id })
    }

    async fn find_journal_entry(&self, reference_id: &str) -> DbResult<Option<JournalEntry>> {
        Ok(self
            .lock()
            .journal
            .iter()
            .find(|entry| entry.reference_id == reference_id)
            .cloned())
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}
