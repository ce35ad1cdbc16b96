//! Common traits for the wallet store, settlement, and gateway seams
//!
//! The reconciliation core has no static or global coupling: every external
//! collaborator sits behind one of these traits so the services are
//! unit-testable in isolation.

use crate::error::AppError;
use crate::models::{
    CallSettlement, ChatDeduction, CheckoutOrder, CreditOutcome, FundingSource, GatewayPayment,
    Purchase, Wallet,
};
use async_trait::async_trait;

/// Read access to the Balance Store
///
/// Writes for consumption and crediting go exclusively through
/// [`SettlementService`] and the payment processor; nothing else mutates a
/// wallet.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Fetch a wallet snapshot
    async fn fetch(&self, user_id: &str) -> Result<Option<Wallet>, AppError>;

    /// Fetch a wallet, creating an empty one with the signup grant if missing
    async fn ensure(&self, user_id: &str) -> Result<Wallet, AppError>;
}

/// Server-authoritative settlement operations
///
/// The only component trusted to mutate the Balance Store for consumption.
/// Each operation is a single atomic transaction against the wallet record;
/// concurrent sessions for the same user serialize through it.
#[async_trait]
pub trait SettlementService: Send + Sync {
    /// Settle a finished call
    ///
    /// Idempotent under at-least-once delivery: a repeated call with the
    /// same `settlement_key` returns the stored receipt without deducting
    /// again. Consumption at or below the minimum billable threshold commits
    /// a zero receipt.
    async fn finalize_call(
        &self,
        user_id: &str,
        listener_id: &str,
        funding: &FundingSource,
        consumed_secs: i64,
        settlement_key: &str,
    ) -> Result<CallSettlement, AppError>;

    /// Deduct for outbound chat messages, called before each send
    ///
    /// Atomic read-modify-write; a typed `InsufficientBalance` failure means
    /// the message must not be transmitted.
    async fn deduct_chat_usage(
        &self,
        user_id: &str,
        funding: &FundingSource,
        message_count: u32,
    ) -> Result<ChatDeduction, AppError>;

    /// Consume one message from the free signup grant
    ///
    /// Never touches tokens or plans; returns the remaining grant.
    async fn use_free_message(&self, user_id: &str) -> Result<i32, AppError>;

    /// Record the listener earning for a finished chat session
    ///
    /// Message deductions already happened per message; this only writes the
    /// listener-side earning record.
    async fn close_chat_session(
        &self,
        user_id: &str,
        listener_id: &str,
        consumed_messages: u32,
    ) -> Result<(), AppError>;
}

/// Exactly-once credit application against the Balance Store
///
/// The processed-payment record and the balance mutation commit together;
/// an existing record makes the whole call a no-op success.
#[async_trait]
pub trait CreditStore: Send + Sync {
    /// Apply a captured payment's purchase exactly once
    async fn apply_credit(
        &self,
        payment_id: &str,
        user_id: &str,
        purchase: &Purchase,
    ) -> Result<CreditOutcome, AppError>;
}

/// Payment gateway collaborator (opaque)
///
/// Only two obligations: create an order carrying purchase metadata, and
/// report a payment's status plus that metadata back.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a gateway order for the given purchase, attaching the buyer
    /// and purchase details as order notes
    async fn create_order(
        &self,
        user_id: &str,
        purchase: &Purchase,
    ) -> Result<CheckoutOrder, AppError>;

    /// Fetch a payment's status and notes by gateway payment id
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, AppError>;
}

/// Exactly-once payment crediting
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a checkout order for an authenticated buyer
    async fn create_order(
        &self,
        user_id: &str,
        purchase: Purchase,
    ) -> Result<CheckoutOrder, AppError>;

    /// Fetch the payment from the gateway, validate it is captured, and
    /// credit it exactly once
    async fn verify_and_credit(
        &self,
        user_id: &str,
        payment_id: &str,
    ) -> Result<CreditOutcome, AppError>;

    /// Handle a signed gateway webhook delivery (raw body + signature)
    async fn handle_webhook(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<CreditOutcome, AppError>;
}
