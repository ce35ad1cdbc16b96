//! Wallet handlers
//!
//! Read-only balance endpoints. Clients only ever read balance here;
//! mutation goes through the settlement and payment endpoints.

use crate::dto::{ApiResponse, WalletResponse};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use solace_auth::AuthenticatedUser;
use solace_core::traits::WalletStore;
use solace_core::AppError;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Get the caller's wallet snapshot
///
/// GET /api/v1/wallet
#[instrument(skip(store, user))]
pub async fn get_wallet(
    store: web::Data<Arc<dyn WalletStore>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    debug!(user_id = %user.user_id, "Fetching wallet");

    // First read creates the wallet with the signup grant.
    let wallet = store.ensure(&user.user_id).await?;
    let response = WalletResponse::from_wallet(&wallet, Utc::now());

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

/// Configure wallet routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/wallet").route("", web::get().to(get_wallet)));
}
