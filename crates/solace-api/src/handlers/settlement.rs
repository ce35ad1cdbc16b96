//! Settlement handlers
//!
//! The server-authoritative deduction surface the client-side orchestrator
//! calls. Every operation requires the caller's token subject to match the
//! user id being mutated; a mismatch is fatal for the request only.

use crate::dto::{
    ApiResponse, CloseChatRequest, DeductChatRequest, DeductChatResponse, FinalizeCallRequest,
    FinalizeCallResponse, FreeMessageRequest, FreeMessageResponse, RoomTokenRequest,
    RoomTokenResponse,
};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use solace_auth::AuthenticatedUser;
use solace_core::traits::{SettlementService, WalletStore};
use solace_core::AppError;
use solace_services::RoomTokenIssuer;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Issue a transport room token for a session the caller can still fund
///
/// POST /api/v1/sessions/room-token
#[instrument(skip(store, issuer, user, req))]
pub async fn room_token(
    store: web::Data<Arc<dyn WalletStore>>,
    issuer: web::Data<Arc<RoomTokenIssuer>>,
    user: AuthenticatedUser,
    req: web::Json<RoomTokenRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;

    let wallet = store
        .fetch(&user.user_id)
        .await?
        .ok_or_else(|| AppError::WalletNotFound(user.user_id.clone()))?;

    let token = issuer.authorize_and_issue(&wallet, &req.room_id, Utc::now())?;

    debug!(user_id = %user.user_id, room = %req.room_id, "Issued room token");
    Ok(HttpResponse::Ok().json(ApiResponse::success(RoomTokenResponse { token })))
}

/// Finalize a finished call
///
/// POST /api/v1/sessions/finalize-call
#[instrument(skip(settlement, user, req))]
pub async fn finalize_call(
    settlement: web::Data<Arc<dyn SettlementService>>,
    user: AuthenticatedUser,
    req: web::Json<FinalizeCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;
    user.ensure_owns(&req.user_id)?;

    info!(
        user_id = %req.user_id,
        consumed_secs = req.consumed_secs,
        "Finalizing call"
    );

    let result = settlement
        .finalize_call(
            &req.user_id,
            &req.listener_id,
            &req.funding,
            req.consumed_secs,
            &req.settlement_key,
        )
        .await?;

    // Fail-closed settlement: the plan was gone and tokens could not cover
    // it. The receipt and listener earning are committed; the user sees a
    // recharge prompt.
    if !result.collected() {
        warn!(
            user_id = %req.user_id,
            settlement_key = %req.settlement_key,
            "Call settlement uncollected"
        );
        return Err(AppError::InsufficientBalance {
            required: format!("{} minutes", result.billed_minutes),
            available: "0".to_string(),
        });
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(FinalizeCallResponse::from(result))))
}

/// Deduct for chat messages before they are sent
///
/// POST /api/v1/sessions/deduct-chat
#[instrument(skip(settlement, user, req))]
pub async fn deduct_chat(
    settlement: web::Data<Arc<dyn SettlementService>>,
    user: AuthenticatedUser,
    req: web::Json<DeductChatRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;
    user.ensure_owns(&req.user_id)?;

    let deduction = settlement
        .deduct_chat_usage(&req.user_id, &req.funding, req.message_count)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(DeductChatResponse::from(deduction))))
}

/// Spend one message from the signup grant
///
/// POST /api/v1/sessions/free-message
#[instrument(skip(settlement, user, req))]
pub async fn free_message(
    settlement: web::Data<Arc<dyn SettlementService>>,
    user: AuthenticatedUser,
    req: web::Json<FreeMessageRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;
    user.ensure_owns(&req.user_id)?;

    let remaining = settlement.use_free_message(&req.user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(FreeMessageResponse { remaining })))
}

/// Close a chat session, recording the listener earning
///
/// POST /api/v1/sessions/close-chat
#[instrument(skip(settlement, user, req))]
pub async fn close_chat(
    settlement: web::Data<Arc<dyn SettlementService>>,
    user: AuthenticatedUser,
    req: web::Json<CloseChatRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;
    user.ensure_owns(&req.user_id)?;

    settlement
        .close_chat_session(&req.user_id, &req.listener_id, req.consumed_messages)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message((), "chat session closed")))
}

/// Configure session settlement routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/sessions")
            .route("/room-token", web::post().to(room_token))
            .route("/finalize-call", web::post().to(finalize_call))
            .route("/deduct-chat", web::post().to(deduct_chat))
            .route("/free-message", web::post().to(free_message))
            .route("/close-chat", web::post().to(close_chat)),
    );
}
