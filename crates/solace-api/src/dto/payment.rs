//! Payment DTOs
//!
//! Request and response types for order creation and payment verification.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solace_core::models::{CheckoutOrder, CreditOutcome};
use validator::Validate;

/// Order creation request
///
/// The tier code is resolved server-side against the catalog; the client
/// never supplies quantities or prices.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    /// Catalog tier code (e.g., "call-10", "chat-30", "mt-50")
    #[validate(length(min = 1, max = 32, message = "Tier code is required"))]
    pub tier_code: String,
}

/// Order creation response
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    /// Gateway order id
    pub order_id: String,

    /// Token the client hands to the checkout widget
    pub checkout_token: String,

    /// Order amount
    pub amount: Decimal,

    /// ISO 4217 currency code
    pub currency: String,
}

impl From<CheckoutOrder> for OrderResponse {
    fn from(order: CheckoutOrder) -> Self {
        Self {
            order_id: order.order_id,
            checkout_token: order.checkout_token,
            amount: order.amount,
            currency: order.currency,
        }
    }
}

/// Payment verification request (client fallback racing the webhook)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    /// Gateway payment id
    #[validate(length(min = 1, max = 64, message = "Payment id is required"))]
    pub payment_id: String,
}

/// Payment verification / webhook response
#[derive(Debug, Clone, Serialize)]
pub struct CreditResponse {
    /// Whether this call applied the credit or found it already applied
    pub outcome: CreditOutcome,
}
