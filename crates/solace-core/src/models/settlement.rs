//! Settlement result models
//!
//! Committed outcomes of the server-authoritative deduction operations, plus
//! the listener-side earning record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::funding::FundingSource;
use super::plan::ServiceKind;

/// Committed result of a call settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSettlement {
    /// Per-session-termination idempotency key
    pub settlement_key: String,

    /// Whole minutes billed (ceiling of consumed seconds)
    pub billed_minutes: u32,

    /// Minutes taken from the named plan
    pub plan_minutes_deducted: Decimal,

    /// Tokens taken from the pool (token sessions and plan overage)
    pub tokens_deducted: Decimal,

    /// True when this settlement key had already been applied; the stored
    /// receipt is returned and nothing was deducted again
    pub already_applied: bool,
}

impl CallSettlement {
    /// A zero-deduction receipt (below the minimum billable threshold)
    pub fn zero(settlement_key: String) -> Self {
        Self {
            settlement_key,
            billed_minutes: 0,
            plan_minutes_deducted: Decimal::ZERO,
            tokens_deducted: Decimal::ZERO,
            already_applied: false,
        }
    }

    /// Whether the platform collected for this settlement
    ///
    /// False only for the fail-closed case: billable minutes with the plan
    /// gone and tokens insufficient. The listener earning is recorded
    /// regardless.
    pub fn collected(&self) -> bool {
        self.billed_minutes == 0
            || self.plan_minutes_deducted > Decimal::ZERO
            || self.tokens_deducted > Decimal::ZERO
    }
}

/// Committed result of a per-message chat deduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDeduction {
    /// The source that actually funded the messages (the named plan may have
    /// expired between selection and deduction, falling back to tokens)
    pub resolved: FundingSource,

    /// Messages taken from the named plan
    pub plan_messages_deducted: Decimal,

    /// Tokens taken from the pool
    pub tokens_deducted: Decimal,

    /// Remaining allotment on the resolved source, for display
    pub remaining: Decimal,
}

/// Listener earning record
///
/// Written whenever a session settles, including fail-closed settlements
/// where the user-side collection did not succeed: the listener already
/// spent the time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerEarning {
    /// Earning listener
    pub listener_id: String,

    /// User who consumed the session
    pub user_id: String,

    /// Session kind
    pub kind: ServiceKind,

    /// Billed minutes (call) or messages (chat)
    pub units: Decimal,

    /// When the earning was recorded
    pub created_at: DateTime<Utc>,
}

impl ListenerEarning {
    /// Record an earning for a settled session
    pub fn new(listener_id: &str, user_id: &str, kind: ServiceKind, units: Decimal) -> Self {
        Self {
            listener_id: listener_id.to_string(),
            user_id: user_id.to_string(),
            kind,
            units,
            created_at: Utc::now(),
        }
    }
}
