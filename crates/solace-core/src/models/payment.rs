//! Payment and crediting models
//!
//! Records for the exactly-once payment crediting path: the purchase
//! description attached to a gateway order, the gateway's view of a payment,
//! and the processed-payment idempotency guard.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::plan::ServiceKind;

/// What a payment buys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Purchase {
    /// Fungible tokens
    Tokens {
        /// Token quantity to credit
        quantity: Decimal,
        /// Price paid
        price: Decimal,
    },
    /// A fixed-allotment plan
    Plan {
        /// What the plan funds
        service: ServiceKind,
        /// Tier display name
        name: String,
        /// Price paid
        price: Decimal,
        /// Minutes (call) or messages (chat)
        allotment: Decimal,
    },
}

impl Purchase {
    /// Price the buyer is charged
    pub fn price(&self) -> Decimal {
        match self {
            Purchase::Tokens { price, .. } => *price,
            Purchase::Plan { price, .. } => *price,
        }
    }
}

/// Gateway-reported payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    /// Order created, not yet paid
    Created,
    /// Authorized but not captured
    Authorized,
    /// Funds captured; the only status that may be credited
    Captured,
    /// Payment failed
    Failed,
    /// Payment refunded
    Refunded,
}

impl GatewayPaymentStatus {
    /// Parse from the gateway's status string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(GatewayPaymentStatus::Created),
            "authorized" => Some(GatewayPaymentStatus::Authorized),
            "captured" => Some(GatewayPaymentStatus::Captured),
            "failed" => Some(GatewayPaymentStatus::Failed),
            "refunded" => Some(GatewayPaymentStatus::Refunded),
            _ => None,
        }
    }

    /// Only captured payments may be credited
    pub fn is_captured(&self) -> bool {
        matches!(self, GatewayPaymentStatus::Captured)
    }
}

impl fmt::Display for GatewayPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayPaymentStatus::Created => write!(f, "created"),
            GatewayPaymentStatus::Authorized => write!(f, "authorized"),
            GatewayPaymentStatus::Captured => write!(f, "captured"),
            GatewayPaymentStatus::Failed => write!(f, "failed"),
            GatewayPaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

/// Metadata attached to a gateway order at creation time and echoed back in
/// webhook/verification payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotes {
    /// Buyer's user id
    pub user_id: String,

    /// What the payment buys
    pub purchase: Purchase,
}

/// A payment as reported by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayment {
    /// Gateway's unique payment id; the idempotency key for crediting
    pub id: String,

    /// Reported status
    pub status: GatewayPaymentStatus,

    /// Order metadata attached at creation
    pub notes: PaymentNotes,
}

/// Checkout order handed back to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutOrder {
    /// Gateway order id
    pub order_id: String,

    /// Token the client hands to the checkout widget
    pub checkout_token: String,

    /// Order amount
    pub amount: Decimal,

    /// ISO 4217 currency code
    pub currency: String,
}

/// Processed payment record: existence means the credit was applied
///
/// Created once inside the crediting transaction, never mutated, never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedPayment {
    /// Gateway payment id
    pub payment_id: String,

    /// Credited user
    pub user_id: String,

    /// When the credit was applied
    pub processed_at: DateTime<Utc>,
}

/// Outcome of a crediting attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditOutcome {
    /// Balance was credited by this call
    Applied,
    /// A processed-payment record already existed; nothing changed
    AlreadyProcessed,
}

/// Append-only audit entry for an applied credit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditEntry {
    /// Credited user
    pub user_id: String,

    /// Gateway payment id
    pub payment_id: String,

    /// What was bought
    pub purchase: Purchase,

    /// When the credit was applied
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            GatewayPaymentStatus::from_str("Captured"),
            Some(GatewayPaymentStatus::Captured)
        );
        assert_eq!(GatewayPaymentStatus::from_str("bogus"), None);
        assert!(GatewayPaymentStatus::Captured.is_captured());
        assert!(!GatewayPaymentStatus::Authorized.is_captured());
    }

    #[test]
    fn test_purchase_price() {
        let tokens = Purchase::Tokens {
            quantity: dec!(50),
            price: dec!(250),
        };
        assert_eq!(tokens.price(), dec!(250));

        let plan = Purchase::Plan {
            service: ServiceKind::Call,
            name: "Silver Pack".to_string(),
            price: dec!(100),
            allotment: dec!(10),
        };
        assert_eq!(plan.price(), dec!(100));
    }

    #[test]
    fn test_notes_round_trip() {
        let notes = PaymentNotes {
            user_id: "user-1".to_string(),
            purchase: Purchase::Tokens {
                quantity: dec!(20),
                price: dec!(100),
            },
        };

        let json = serde_json::to_string(&notes).unwrap();
        let back: PaymentNotes = serde_json::from_str(&json).unwrap();
        assert_eq!(back.user_id, "user-1");
        assert_eq!(back.purchase, notes.purchase);
    }
}
