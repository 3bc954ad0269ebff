//! Payment provider implementations
//!
//! Concrete implementations of the PaymentProvider trait.

pub mod tbank;

pub use tbank::{TBankConfig, TBankProvider};
