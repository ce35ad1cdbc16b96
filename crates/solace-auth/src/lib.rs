//! Authentication and caller identity for Solace Billing
//!
//! This crate provides JWT-based caller identity and the Actix-web extractor
//! used by every balance-touching endpoint. Login itself (phone OTP / Google
//! sign-in) happens outside this service; callers arrive with a bearer token
//! whose subject is their user id.
//!
//! # Examples
//!
//! ## Creating a JWT token
//!
//! ```no_run
//! use solace_auth::{claims::UserRole, Claims, JwtService};
//!
//! let jwt_service = JwtService::new("your-secret-key", 3600);
//! let claims = Claims::new("user-1", UserRole::User);
//! let token = jwt_service.create_token(&claims)?;
//! # Ok::<(), solace_core::error::AppError>(())
//! ```
//!
//! ## Using the extractor in Actix-web
//!
//! ```no_run
//! use actix_web::HttpResponse;
//! use solace_auth::middleware::AuthenticatedUser;
//!
//! async fn protected_route(user: AuthenticatedUser) -> HttpResponse {
//!     HttpResponse::Ok().json(serde_json::json!({ "user_id": user.user_id }))
//! }
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::AuthenticatedUser;
