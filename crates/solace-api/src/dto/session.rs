//! Session settlement DTOs
//!
//! Request and response types for the settlement endpoints the client-side
//! orchestrator calls: room token issuance, call finalization, per-message
//! chat deduction, and the free message grant.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solace_core::models::{CallSettlement, ChatDeduction, FundingSource};
use validator::Validate;

/// Room token request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RoomTokenRequest {
    /// Room id from the funding decision (plan id or minted token-room id)
    #[validate(length(min = 1, max = 128, message = "Room id is required"))]
    pub room_id: String,
}

/// Room token response
#[derive(Debug, Clone, Serialize)]
pub struct RoomTokenResponse {
    /// Signed token the client hands to the transport
    pub token: String,
}

/// Call finalization request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FinalizeCallRequest {
    /// User whose balance settles the call
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,

    /// Listener who took the call
    #[validate(length(min = 1, message = "Listener id is required"))]
    pub listener_id: String,

    /// Funding source chosen at session start
    pub funding: FundingSource,

    /// Connected seconds accrued
    #[validate(range(min = 0, message = "Consumed seconds must be non-negative"))]
    pub consumed_secs: i64,

    /// Per-session-termination idempotency key
    #[validate(length(min = 1, max = 128, message = "Settlement key is required"))]
    pub settlement_key: String,
}

/// Call finalization response
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeCallResponse {
    /// Whole minutes billed
    pub billed_minutes: u32,

    /// Minutes taken from the plan
    pub plan_minutes_deducted: Decimal,

    /// Tokens taken from the pool
    pub tokens_deducted: Decimal,

    /// True when this was a duplicate delivery
    pub already_applied: bool,
}

impl From<CallSettlement> for FinalizeCallResponse {
    fn from(s: CallSettlement) -> Self {
        Self {
            billed_minutes: s.billed_minutes,
            plan_minutes_deducted: s.plan_minutes_deducted,
            tokens_deducted: s.tokens_deducted,
            already_applied: s.already_applied,
        }
    }
}

/// Chat deduction request (pre-flight, usually one message)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeductChatRequest {
    /// User whose balance funds the messages
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,

    /// Funding source chosen at session start
    pub funding: FundingSource,

    /// Messages to deduct
    #[validate(range(min = 1, max = 50, message = "Message count must be 1-50"))]
    pub message_count: u32,
}

/// Chat deduction response
#[derive(Debug, Clone, Serialize)]
pub struct DeductChatResponse {
    /// The source that actually funded the messages
    pub resolved: FundingSource,

    /// Remaining allotment on the resolved source
    pub remaining: Decimal,
}

impl From<ChatDeduction> for DeductChatResponse {
    fn from(d: ChatDeduction) -> Self {
        Self {
            resolved: d.resolved,
            remaining: d.remaining,
        }
    }
}

/// Free message request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FreeMessageRequest {
    /// User spending a free message
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,
}

/// Free message response
#[derive(Debug, Clone, Serialize)]
pub struct FreeMessageResponse {
    /// Messages left in the signup grant
    pub remaining: i32,
}

/// Chat session close request (records the listener earning)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CloseChatRequest {
    /// User who consumed the session
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,

    /// Listener who took the chat
    #[validate(length(min = 1, message = "Listener id is required"))]
    pub listener_id: String,

    /// Messages sent over the session
    pub consumed_messages: u32,
}
