//! Actix-web authentication middleware and request extractors
//!
//! Provides the extractor for authenticated callers. Every balance-mutating
//! handler matches the token subject against the user id being mutated; a
//! mismatch is fatal for the request, never for the session.

use crate::claims::Claims;
use crate::jwt::JwtService;
use actix_web::{dev::Payload, error::ErrorUnauthorized, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use solace_core::error::AppError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extract JWT token from request
///
/// Checks for token in the following order:
/// 1. Authorization header (Bearer token)
/// 2. Cookie named "token"
fn extract_token_from_request(req: &HttpRequest) -> Option<String> {
    // Try Authorization header first
    if let Some(auth_header) = req.headers().get("Authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    // Try cookie
    if let Some(cookie) = req.cookie("token") {
        return Some(cookie.value().to_string());
    }

    None
}

/// Authenticated caller extractor
///
/// Extracts and validates the JWT token from a request, providing access to
/// the caller's identity.
///
/// # Examples
///
/// ```no_run
/// use actix_web::HttpResponse;
/// use solace_auth::middleware::AuthenticatedUser;
///
/// async fn wallet_handler(user: AuthenticatedUser) -> HttpResponse {
///     HttpResponse::Ok().json(serde_json::json!({
///         "user_id": user.user_id,
///     }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// User id of the authenticated caller
    pub user_id: String,

    /// Full claims from the JWT token
    pub claims: Claims,
}

impl AuthenticatedUser {
    /// Reject the request unless the caller owns the given wallet
    ///
    /// The service must refuse calls attempting to mutate another user's
    /// balance.
    pub fn ensure_owns(&self, user_id: &str) -> Result<(), AppError> {
        if self.user_id != user_id {
            warn!(
                caller = %self.user_id,
                target = %user_id,
                "Caller attempted to touch another user's wallet"
            );
            return Err(AppError::Unauthorized(
                "Caller identity does not match target user".to_string(),
            ));
        }
        Ok(())
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        // Extract JWT service from app data
        let jwt_service = match req.app_data::<web::Data<Arc<JwtService>>>() {
            Some(service) => service.get_ref().clone(),
            None => {
                warn!("JwtService not found in app data");
                return ready(Err(ErrorUnauthorized(AppError::Unauthorized(
                    "Authentication service not configured".to_string(),
                ))));
            }
        };

        // Extract token from request
        let token = match extract_token_from_request(req) {
            Some(t) => t,
            None => {
                debug!("No authentication token found in request");
                return ready(Err(ErrorUnauthorized(AppError::Unauthorized(
                    "No authentication token provided".to_string(),
                ))));
            }
        };

        // Validate token and extract claims
        match jwt_service.validate_token(&token) {
            Ok(claims) => {
                debug!(user_id = %claims.sub, "Caller authenticated successfully");

                ready(Ok(AuthenticatedUser {
                    user_id: claims.sub.clone(),
                    claims,
                }))
            }
            Err(e) => {
                warn!(error = %e, "Token validation failed");
                ready(Err(ErrorUnauthorized(e)))
            }
        }
    }
}
