//! Solace Billing Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Solace balance reconciliation engine. It includes:
//!
//! - Domain models (Wallet, ActivePlan, FundingSource, payment records)
//! - The configurable rate policy used by selection and settlement
//! - Common traits for the wallet store, settlement, and gateway seams
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod policy;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;
pub use policy::RatePolicy;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
