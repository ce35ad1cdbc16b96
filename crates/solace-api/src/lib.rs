//! API layer for Solace Billing
//!
//! HTTP API handlers for the settlement surface, wallet reads, and payment
//! crediting.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;

// Re-export DTOs (common types)
pub use dto::ApiResponse;

// Re-export handler configuration functions
pub use handlers::{configure_payments, configure_sessions, configure_wallet};
