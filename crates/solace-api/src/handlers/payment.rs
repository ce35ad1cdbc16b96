//! Payment handlers
//!
//! Order creation, the client-side verification fallback, and the gateway
//! webhook. The webhook carries no bearer token; it is authenticated by its
//! HMAC signature over the raw body.

use crate::dto::{
    ApiResponse, CreateOrderRequest, CreditResponse, OrderResponse, VerifyPaymentRequest,
};
use actix_web::{web, HttpRequest, HttpResponse};
use solace_auth::AuthenticatedUser;
use solace_core::traits::PaymentProcessor;
use solace_core::AppError;
use solace_services::catalog;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Signature header on webhook deliveries
const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Create a gateway checkout order for a catalog tier
///
/// POST /api/v1/payments/order
#[instrument(skip(processor, user, req))]
pub async fn create_order(
    processor: web::Data<Arc<dyn PaymentProcessor>>,
    user: AuthenticatedUser,
    req: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;

    let purchase = catalog::resolve(&req.tier_code)
        .ok_or_else(|| AppError::UnknownTier(req.tier_code.clone()))?;

    info!(user_id = %user.user_id, tier = %req.tier_code, "Creating checkout order");

    let order = processor.create_order(&user.user_id, purchase).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(OrderResponse::from(order))))
}

/// Verify a payment with the gateway and credit it
///
/// POST /api/v1/payments/verify
///
/// Fallback path racing the webhook; crediting is idempotent so whichever
/// arrives second is a no-op.
#[instrument(skip(processor, user, req))]
pub async fn verify_payment(
    processor: web::Data<Arc<dyn PaymentProcessor>>,
    user: AuthenticatedUser,
    req: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;

    debug!(user_id = %user.user_id, payment_id = %req.payment_id, "Verifying payment");

    let outcome = processor
        .verify_and_credit(&user.user_id, &req.payment_id)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(CreditResponse { outcome })))
}

/// Gateway webhook endpoint
///
/// POST /api/v1/payments/webhook
#[instrument(skip(processor, request, body))]
pub async fn webhook(
    processor: web::Data<Arc<dyn PaymentProcessor>>,
    request: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;

    let outcome = match processor.handle_webhook(&body, signature).await {
        Ok(outcome) => outcome,
        Err(e @ AppError::InvalidSignature) => {
            warn!("Webhook delivery with bad signature rejected");
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(CreditResponse { outcome })))
}

/// Configure payment routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .route("/order", web::post().to(create_order))
            .route("/verify", web::post().to(verify_payment))
            .route("/webhook", web::post().to(webhook)),
    );
}
