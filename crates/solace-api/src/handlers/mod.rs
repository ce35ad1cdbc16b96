//! HTTP request handlers

pub mod payment;
pub mod settlement;
pub mod wallet;

pub use payment::configure as configure_payments;
pub use settlement::configure as configure_sessions;
pub use wallet::configure as configure_wallet;
