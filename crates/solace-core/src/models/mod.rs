//! Domain models for Solace Billing
//!
//! This module contains all the core domain models used throughout the application.

pub mod funding;
pub mod payment;
pub mod plan;
pub mod settlement;
pub mod wallet;

pub use funding::{FundingDecision, FundingSource};
pub use payment::{
    CheckoutOrder, CreditEntry, CreditOutcome, GatewayPayment, GatewayPaymentStatus, PaymentNotes,
    ProcessedPayment, Purchase,
};
pub use plan::{ActivePlan, ServiceKind};
pub use settlement::{CallSettlement, ChatDeduction, ListenerEarning};
pub use wallet::Wallet;
