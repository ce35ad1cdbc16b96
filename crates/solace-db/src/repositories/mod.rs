//! Repository implementations
//!
//! PostgreSQL-backed repositories for the Balance Store and earning records.

pub mod earning_repo;
pub mod wallet_repo;

pub use earning_repo::PgEarningRepository;
pub use wallet_repo::{PgWalletRepository, WalletRow};
