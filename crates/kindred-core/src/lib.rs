//! Campaign lifecycle and refund workflow rules.
//!
//! The engines here never touch a database or the network directly: they read
//! and write through [`store::CampaignStore`] / [`store::RefundStore`] and call
//! out through [`gateway::PaymentGateway`]. Callers decide how those are backed
//! and which transaction each operation runs in.

pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod refund;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{CampaignError, ErrorClass, RefundError};
pub use gateway::{GatewayError, PaymentGateway};
pub use store::{CampaignStore, RefundStore};
