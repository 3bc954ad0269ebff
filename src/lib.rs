//! Payment gateway notification processor
//!
//! Opens payment sessions with the gateway, authenticates its asynchronous
//! notifications and credits confirmed payments to user balances exactly once.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod payments;
