//! Unified error handling for Solace Billing
//!
//! This module provides a comprehensive error type that covers all possible
//! failure scenarios in the application, with automatic HTTP response mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Authentication Errors ====================
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: insufficient permissions")]
    Forbidden,

    // ==================== Balance Errors ====================
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Plan expired: {0}")]
    PlanExpired(String),

    #[error("No free messages remaining")]
    FreeMessagesExhausted,

    // ==================== Payment Errors ====================
    #[error("Payment not captured: {0}")]
    PaymentNotCaptured(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Unknown plan tier: {0}")]
    UnknownTier(String),

    // ==================== Session Errors ====================
    #[error("Transport connection failure: {0}")]
    TransportConnection(String),

    #[error("Settlement unreachable: {0}")]
    SettlementUnreachable(String),

    #[error("Session already settled: {0}")]
    AlreadySettled(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_)
            | AppError::InvalidInput(_)
            | AppError::MissingField(_)
            | AppError::InvalidSignature
            | AppError::UnknownTier(_)
            | AppError::PaymentNotCaptured(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::InvalidToken(_) | AppError::TokenExpired => StatusCode::UNAUTHORIZED,

            // 402 Payment Required
            AppError::InsufficientBalance { .. } | AppError::FreeMessagesExhausted => {
                StatusCode::PAYMENT_REQUIRED
            }

            // 403 Forbidden
            AppError::Forbidden | AppError::Unauthorized(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::WalletNotFound(_)
            | AppError::PlanNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_) | AppError::AlreadySettled(_) => StatusCode::CONFLICT,

            // 410 Gone
            AppError::PlanExpired(_) => StatusCode::GONE,

            // 502 Bad Gateway
            AppError::Gateway(_) | AppError::SettlementUnreachable(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::TokenExpired => "token_expired",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::WalletNotFound(_) => "wallet_not_found",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::PlanNotFound(_) => "plan_not_found",
            AppError::PlanExpired(_) => "plan_expired",
            AppError::FreeMessagesExhausted => "free_messages_exhausted",
            AppError::PaymentNotCaptured(_) => "payment_not_captured",
            AppError::Gateway(_) => "gateway_error",
            AppError::InvalidSignature => "invalid_signature",
            AppError::UnknownTier(_) => "unknown_tier",
            AppError::TransportConnection(_) => "transport_connection_failure",
            AppError::SettlementUnreachable(_) => "settlement_unreachable",
            AppError::AlreadySettled(_) => "already_settled",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::MissingField(_) => "missing_field",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// User-facing prompt for recoverable balance errors
    ///
    /// Balance-affecting errors are translated into plain prompts rather than
    /// raw error codes; everything else keeps the error message.
    pub fn user_message(&self) -> String {
        match self {
            AppError::InsufficientBalance { .. } | AppError::FreeMessagesExhausted => {
                "Insufficient balance, please recharge to continue.".to_string()
            }
            AppError::PlanExpired(_) => {
                "This plan has expired, please purchase a new one.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.user_message(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
