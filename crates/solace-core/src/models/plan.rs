//! Active plan model
//!
//! Purchased DT ("direct time") plans: fixed allotments of call minutes or
//! chat messages that deplete toward zero and expire 30 days after purchase.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Service kind a plan or session is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Voice call, metered in connected seconds, billed in minutes
    #[default]
    Call,
    /// Text chat, metered per outbound message
    Chat,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Call => write!(f, "call"),
            ServiceKind::Chat => write!(f, "chat"),
        }
    }
}

impl ServiceKind {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "call" => Some(ServiceKind::Call),
            "chat" => Some(ServiceKind::Chat),
            _ => None,
        }
    }
}

/// Purchased plan entity
///
/// Embedded in the owning wallet record. `remaining` counts minutes for call
/// plans and whole messages for chat plans; it only moves toward zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivePlan {
    /// Unique within the user; doubles as the session correlation key
    pub id: String,

    /// What this plan funds
    pub kind: ServiceKind,

    /// Display name (e.g., "Silver Pack")
    pub name: String,

    /// Price paid, descriptive only
    pub price: Decimal,

    /// Remaining allotment (minutes or messages)
    pub remaining: Decimal,

    /// Original allotment, for display
    pub total: Decimal,

    /// Purchase timestamp
    pub purchased_at: DateTime<Utc>,

    /// Plan is usable only while `now < expires_at`
    pub expires_at: DateTime<Utc>,
}

impl ActivePlan {
    /// Create a freshly purchased plan with the given validity window
    pub fn new(
        kind: ServiceKind,
        name: String,
        price: Decimal,
        allotment: Decimal,
        purchased_at: DateTime<Utc>,
        validity_days: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            name,
            price,
            remaining: allotment,
            total: allotment,
            purchased_at,
            expires_at: purchased_at + chrono::Duration::days(validity_days),
        }
    }

    /// Check whether the plan has passed its expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Plan qualifies to fund a session: kind matches, unexpired, nonzero allotment
    pub fn qualifies(&self, kind: ServiceKind, now: DateTime<Utc>) -> bool {
        self.kind == kind && !self.is_expired(now) && self.remaining > Decimal::ZERO
    }

    /// Deduct up to `amount` from the remaining allotment, flooring at zero
    ///
    /// Returns the amount actually covered; the caller settles any shortfall
    /// against the token pool.
    pub fn deduct(&mut self, amount: Decimal) -> Decimal {
        let covered = amount.min(self.remaining);
        self.remaining -= covered;
        covered
    }
}
