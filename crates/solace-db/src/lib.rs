//! Solace Billing Database Layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for the Solace balance reconciliation engine. It includes:
//!
//! - Connection pool management with sqlx
//! - The wallet repository (Balance Store) with single-row snapshot reads
//! - Row-lock and persist helpers used inside settlement transactions
//! - Append-only listener earning storage

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use solace_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
