//! Payment gateway integration
//!
//! Outbound payment initiation, request signing, order identifiers, and
//! authentication of the gateway's asynchronous notifications.

pub mod callback;
pub mod network;
pub mod order_id;
pub mod providers;
pub mod signature;
pub mod traits;
pub mod types;
