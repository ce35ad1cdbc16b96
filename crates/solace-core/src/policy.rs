//! Billing rate policy
//!
//! The repository's business rules for converting consumption into balance
//! deductions. Every rate lives here as a single configurable object; no
//! component re-derives a ratio on its own.
//!
//! Canonical rates:
//! - Calls: 2 tokens per minute, billed in ceiling minutes (a partial minute
//!   is billed as a whole minute).
//! - Chats: 0.5 token per message (1 token covers 2 messages).
//! - Calls of 5 seconds or less settle to zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rate policy for selection and settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatePolicy {
    /// Token cost per billed call minute
    pub call_tokens_per_minute: Decimal,

    /// Token cost per chat message
    pub chat_tokens_per_message: Decimal,

    /// Calls at or below this duration are not billed
    pub min_billable_call_secs: i64,

    /// Hard ceiling for any call session, independent of balance
    pub call_session_cap_secs: u32,

    /// Hard ceiling for any chat session, independent of balance
    pub chat_session_cap_secs: u32,

    /// Fixed validity window for purchased plans, in days
    pub plan_validity_days: i64,

    /// One-time free message grant on signup
    pub signup_free_messages: i32,

    /// Character cap per message during the free trial
    pub free_trial_char_limit: usize,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            call_tokens_per_minute: Decimal::TWO,
            chat_tokens_per_message: Decimal::new(5, 1), // 0.5
            min_billable_call_secs: 5,
            call_session_cap_secs: 3600,
            chat_session_cap_secs: 10800,
            plan_validity_days: 30,
            signup_free_messages: 5,
            free_trial_char_limit: 75,
        }
    }
}

impl RatePolicy {
    /// Billed minutes for a call: ceiling of consumed seconds over 60
    ///
    /// Durations at or below the minimum billable threshold round to zero.
    pub fn billed_minutes(&self, consumed_secs: i64) -> u32 {
        if consumed_secs <= self.min_billable_call_secs {
            return 0;
        }
        ((consumed_secs + 59) / 60) as u32
    }

    /// Token cost of a call of the given billed minutes
    pub fn call_token_cost(&self, billed_minutes: u32) -> Decimal {
        self.call_tokens_per_minute * Decimal::from(billed_minutes)
    }

    /// Token cost of sending the given number of chat messages
    pub fn chat_token_cost(&self, message_count: u32) -> Decimal {
        self.chat_tokens_per_message * Decimal::from(message_count)
    }

    /// Minimum token balance to start a call (one billable minute)
    pub fn min_call_tokens(&self) -> Decimal {
        self.call_tokens_per_minute
    }

    /// Minimum token balance to send one chat message
    pub fn min_chat_tokens(&self) -> Decimal {
        self.chat_tokens_per_message
    }

    /// Session duration ceiling for the given session kind
    pub fn session_cap_secs(&self, call: bool) -> u32 {
        if call {
            self.call_session_cap_secs
        } else {
            self.chat_session_cap_secs
        }
    }
}
