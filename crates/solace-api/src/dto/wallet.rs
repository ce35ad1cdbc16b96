//! Wallet DTOs
//!
//! Response shapes for balance reads. Expired plans never appear and never
//! count toward totals, even while still stored.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use solace_core::models::{ActivePlan, ServiceKind, Wallet};

/// One active plan as shown to the user
#[derive(Debug, Clone, Serialize)]
pub struct PlanView {
    /// Plan id
    pub id: String,

    /// What the plan funds
    pub kind: ServiceKind,

    /// Tier display name
    pub name: String,

    /// Remaining minutes or messages
    pub remaining: Decimal,

    /// Original allotment
    pub total: Decimal,

    /// Expiry timestamp
    pub expires_at: DateTime<Utc>,
}

impl From<&ActivePlan> for PlanView {
    fn from(plan: &ActivePlan) -> Self {
        Self {
            id: plan.id.clone(),
            kind: plan.kind,
            name: plan.name.clone(),
            remaining: plan.remaining,
            total: plan.total,
            expires_at: plan.expires_at,
        }
    }
}

/// Wallet snapshot response
#[derive(Debug, Clone, Serialize)]
pub struct WalletResponse {
    /// Fungible token balance
    pub tokens: Decimal,

    /// Free signup messages left
    pub free_messages_remaining: i32,

    /// Total remaining call minutes across valid plans (floored for display)
    pub call_minutes: i64,

    /// Total remaining chat messages across valid plans
    pub chat_messages: i64,

    /// Valid (unexpired) plans
    pub active_plans: Vec<PlanView>,
}

impl WalletResponse {
    /// Build the display snapshot from a wallet at the given instant
    pub fn from_wallet(wallet: &Wallet, now: DateTime<Utc>) -> Self {
        let active_plans: Vec<PlanView> = wallet
            .active_plans
            .iter()
            .filter(|p| !p.is_expired(now))
            .map(Into::into)
            .collect();

        Self {
            tokens: wallet.tokens,
            free_messages_remaining: wallet.free_messages_remaining,
            call_minutes: wallet.call_minutes_total(now).floor().to_i64().unwrap_or(0),
            chat_messages: wallet
                .chat_messages_total(now)
                .floor()
                .to_i64()
                .unwrap_or(0),
            active_plans,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_expired_plans_hidden_from_response() {
        let now = Utc::now();
        let valid = ActivePlan::new(
            ServiceKind::Call,
            "Call Pack".to_string(),
            dec!(100),
            dec!(10),
            now - chrono::Duration::days(1),
            30,
        );
        let expired = ActivePlan::new(
            ServiceKind::Call,
            "Old Pack".to_string(),
            dec!(100),
            dec!(99),
            now - chrono::Duration::days(40),
            30,
        );

        let mut wallet = Wallet::new("user-1".to_string(), 5);
        wallet.tokens = dec!(3.5);
        wallet.active_plans = vec![valid, expired];

        let response = WalletResponse::from_wallet(&wallet, now);

        assert_eq!(response.active_plans.len(), 1);
        assert_eq!(response.call_minutes, 10);
        assert_eq!(response.tokens, dec!(3.5));
    }
}
