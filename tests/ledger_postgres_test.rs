//! Integration tests for the PostgreSQL payment store
//!
//! These tests require a running PostgreSQL instance.
//! Run with: DATABASE_URL=postgres://... cargo test --test ledger_postgres_test -- --ignored

use chrono::Utc;
use paygate_backend::database::{
    init_pool, payment_repository::PaymentRepository, run_migrations, PoolConfig,
};
use paygate_backend::ledger::{
    CreditOutcome, CreditRequest, LedgerError, LedgerUpdater, PaymentOrder, PaymentStore,
    RetryPolicy,
};
use paygate_backend::payments::types::MinorUnits;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_USER: AtomicI64 = AtomicI64::new(0);

async fn setup_db() -> sqlx::PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = init_pool(&database_url, Some(PoolConfig::default()))
        .await
        .expect("Failed to init DB pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

/// Fresh account with a user id unlikely to collide across runs
async fn create_account(pool: &sqlx::PgPool) -> i64 {
    let user_id = Utc::now().timestamp_micros() * 10 + NEXT_USER.fetch_add(1, Ordering::SeqCst);
    sqlx::query("INSERT INTO user_accounts (user_id, balance_minor_units) VALUES ($1, 0)")
        .bind(user_id)
        .execute(pool)
        .await
        .expect("Failed to create account");
    user_id
}

fn credit(user_id: i64, minor: i64) -> CreditRequest {
    let order_id = format!("{}_{}", user_id, Utc::now().timestamp());
    CreditRequest {
        user_id,
        amount: MinorUnits::new(minor).unwrap(),
        comment: format!("orderId-{}", order_id),
        order_id,
    }
}

fn updater(repo: PaymentRepository) -> LedgerUpdater {
    LedgerUpdater::new(
        Arc::new(repo),
        RetryPolicy::new(3, Duration::from_millis(10)),
        Duration::from_secs(10),
    )
}

#[tokio::test]
#[ignore]
async fn test_credit_applied_once() {
    let pool = setup_db().await;
    let user_id = create_account(&pool).await;
    let repo = PaymentRepository::new(pool.clone());
    let ledger = updater(repo.clone());
    let request = credit(user_id, 50_000);

    let first = ledger.apply_credit(&request).await.unwrap();
    assert!(matches!(first, CreditOutcome::Applied { .. }));
    assert_eq!(
        ledger.apply_credit(&request).await.unwrap(),
        CreditOutcome::Duplicate
    );

    assert_eq!(repo.find_balance(user_id).await.unwrap(), Some(50_000));
    let entry = repo
        .find_journal_entry(&request.order_id)
        .await
        .unwrap()
        .expect("journal row should exist");
    assert_eq!(entry.user_id, user_id);
    assert_eq!(entry.amount_minor_units, 50_000);
    assert_eq!(entry.source_system, "gateway_payment");
}

#[tokio::test]
#[ignore]
async fn test_unknown_user_leaves_no_journal_row() {
    let pool = setup_db().await;
    let repo = PaymentRepository::new(pool);
    let ledger = updater(repo.clone());
    let request = credit(-1, 10_000);

    assert_eq!(
        ledger.apply_credit(&request).await.unwrap_err(),
        LedgerError::UserNotFound { user_id: -1 }
    );
    assert!(repo
        .find_journal_entry(&request.order_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore]
async fn test_concurrent_deliveries_commit_one_credit() {
    let pool = setup_db().await;
    let user_id = create_account(&pool).await;
    let repo = PaymentRepository::new(pool.clone());
    let ledger = Arc::new(updater(repo.clone()));
    let request = credit(user_id, 25_000);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = ledger.clone();
            let request = request.clone();
            tokio::spawn(async move { ledger.apply_credit(&request).await })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        if let CreditOutcome::Applied { .. } = handle.await.unwrap().unwrap() {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(repo.find_balance(user_id).await.unwrap(), Some(25_000));
}

#[tokio::test]
#[ignore]
async fn test_record_order() {
    let pool = setup_db().await;
    let user_id = create_account(&pool).await;
    let repo = PaymentRepository::new(pool.clone());
    let order = PaymentOrder {
        order_id: format!("{}_{}", user_id, Utc::now().timestamp()),
        user_id,
        amount: MinorUnits::from_major(500).unwrap(),
        created_at: Utc::now(),
    };

    repo.record_order(&order).await.unwrap();
    assert!(repo.record_order(&order).await.is_err());

    let stored: i64 =
        sqlx::query_scalar("SELECT amount_minor_units FROM payment_orders WHERE order_id = $1")
            .bind(&order.order_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored, 50_000);
}
