//! Idempotent balance credits for confirmed gateway payments
//!
//! A credit is keyed by the gateway order id. The store guarantees that the
//! balance change and its journal row commit together, and that an order id
//! is credited at most once no matter how often the gateway redelivers.

pub mod memory;
pub mod retry;
pub mod store;
pub mod updater;

pub use memory::MemoryPaymentStore;
pub use retry::RetryPolicy;
pub use store::{CreditAttempt, CreditRequest, JournalEntry, PaymentOrder, PaymentStore};
pub use updater::{CreditOutcome, LedgerError, LedgerUpdater};

use crate::payments::types::MinorUnits;

/// `source_system` of every journal row written for gateway payments
pub const SOURCE_SYSTEM: &str = "gateway_payment";

/// Free-text journal comment for a credited payment
pub fn audit_comment(
    order_id: &str,
    payment_id: Option<&str>,
    amount: MinorUnits,
    card_id: Option<&str>,
) -> String {
    format!(
        "orderId-{}_paymentId-{}_amount-{}_cardId-{}",
        order_id,
        payment_id.unwrap_or("none"),
        amount.major_display(),
        card_id.unwrap_or("none"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_comment() {
        let amount = MinorUnits::new(50_000).unwrap();
        assert_eq!(
            audit_comment("6343_1700000000", Some("P1"), amount, None),
            "orderId-6343_1700000000_paymentId-P1_amount-500.00_cardId-none"
        );
    }
}
