//! Payment gateway client
//!
//! HTTP client for the payment gateway collaborator plus webhook signature
//! verification. The gateway is opaque: the engine only creates orders with
//! attached purchase metadata and reads payment status plus that metadata
//! back.

use async_trait::async_trait;
use ring::hmac;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use solace_core::{
    models::{CheckoutOrder, GatewayPayment, GatewayPaymentStatus, PaymentNotes, Purchase},
    traits::PaymentGateway,
    AppError, AppResult,
};
use tracing::{debug, error, instrument, warn};

/// HTTP implementation of the payment gateway collaborator
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    currency: String,
}

impl HttpPaymentGateway {
    /// Create a new gateway client
    pub fn new(base_url: &str, key_id: &str, key_secret: &str, currency: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
            currency: currency.to_string(),
        }
    }

    fn map_http_error(context: &str, e: reqwest::Error) -> AppError {
        error!("{}: {}", context, e);
        AppError::Gateway(format!("{}: {}", context, e))
    }
}

/// Order as returned by the gateway
#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
}

/// Payment as returned by the gateway
#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    status: String,
    notes: PaymentNotes,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, purchase))]
    async fn create_order(&self, user_id: &str, purchase: &Purchase) -> AppResult<CheckoutOrder> {
        let notes = PaymentNotes {
            user_id: user_id.to_string(),
            purchase: purchase.clone(),
        };

        // Gateway amounts are in the smallest currency unit.
        let amount_minor = (purchase.price() * Decimal::ONE_HUNDRED).trunc();

        debug!("Creating gateway order for user {}: {}", user_id, amount_minor);

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount_minor,
                "currency": self.currency,
                "notes": notes,
            }))
            .send()
            .await
            .map_err(|e| Self::map_http_error("Order creation request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Gateway rejected order: {} {}", status, body);
            return Err(AppError::Gateway(format!(
                "Order creation rejected: {}",
                status
            )));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| Self::map_http_error("Invalid order response", e))?;

        Ok(CheckoutOrder {
            checkout_token: order.id.clone(),
            order_id: order.id,
            amount: Decimal::from(order.amount) / Decimal::ONE_HUNDRED,
            currency: self.currency.clone(),
        })
    }

    #[instrument(skip(self))]
    async fn fetch_payment(&self, payment_id: &str) -> AppResult<GatewayPayment> {
        debug!("Fetching payment {}", payment_id);

        let response = self
            .client
            .get(format!("{}/payments/{}", self.base_url, payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| Self::map_http_error("Payment fetch request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("Gateway payment lookup failed: {}", status);
            return Err(AppError::Gateway(format!(
                "Payment lookup failed: {}",
                status
            )));
        }

        let payment: PaymentResponse = response
            .json()
            .await
            .map_err(|e| Self::map_http_error("Invalid payment response", e))?;

        let status = GatewayPaymentStatus::from_str(&payment.status).ok_or_else(|| {
            AppError::Gateway(format!("Unknown payment status: {}", payment.status))
        })?;

        Ok(GatewayPayment {
            id: payment.id,
            status,
            notes: payment.notes,
        })
    }
}

// ==================== Webhook verification and parsing ====================

/// Verify the gateway's HMAC-SHA256 webhook signature over the raw body
///
/// The signature header carries the hex-encoded digest.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> AppResult<()> {
    let expected = decode_hex(signature).ok_or(AppError::InvalidSignature)?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, body, &expected).map_err(|_| {
        warn!("Webhook signature mismatch");
        AppError::InvalidSignature
    })
}

/// Compute the hex signature for a body; used by tests and the simulator
pub fn sign_webhook(secret: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, body);
    encode_hex(tag.as_ref())
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Webhook event names the engine reacts to
pub const EVENT_PAYMENT_CAPTURED: &str = "payment.captured";

/// Parsed webhook delivery
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    /// Event name (e.g., "payment.captured")
    pub event: String,

    /// Event payload
    pub payload: WebhookPayload,
}

/// Webhook payload wrapper
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Payment wrapper
    pub payment: WebhookPaymentWrapper,
}

/// Payment entity wrapper
#[derive(Debug, Deserialize)]
pub struct WebhookPaymentWrapper {
    /// The payment entity
    pub entity: WebhookPaymentEntity,
}

/// Payment entity carried in a webhook
#[derive(Debug, Deserialize)]
pub struct WebhookPaymentEntity {
    /// Gateway payment id
    pub id: String,

    /// Payment status string
    pub status: String,

    /// Order metadata attached at creation
    pub notes: PaymentNotes,
}

/// Parse a webhook body
pub fn parse_webhook_event(body: &[u8]) -> AppResult<WebhookEvent> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("Malformed webhook body: {}", e)))
}
