//! Business logic services for Solace Billing
//!
//! This crate contains the reconciliation engine proper: funding selection,
//! session metering and orchestration, server-authoritative settlement, and
//! exactly-once payment crediting.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service owns its dependencies behind trait seams
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Comprehensive error handling with AppError
//!
//! # Services
//!
//! - `plan_selector` - Pure funding decision at session start
//! - `settlement` - Atomic, idempotent balance deduction (PgSettlementService)
//! - `payment_credit` - Exactly-once crediting of gateway payments
//! - `session` - Session state machine, meters, and orchestrator
//! - `gateway` - Payment gateway HTTP client and webhook verification
//! - `room_token` - Balance-gated transport room token issuance
//! - `memory` - In-memory store for tests and local development

pub mod balance_feed;
pub mod catalog;
pub mod gateway;
pub mod memory;
pub mod payment_credit;
pub mod plan_selector;
pub mod room_token;
pub mod session;
pub mod settlement;

pub use balance_feed::BalanceFeed;
pub use memory::MemoryStore;
pub use payment_credit::{PaymentCreditProcessor, PgCreditStore};
pub use plan_selector::select_funding_source;
pub use room_token::RoomTokenIssuer;
pub use settlement::PgSettlementService;
