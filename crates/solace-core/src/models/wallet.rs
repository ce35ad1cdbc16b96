//! Wallet model
//!
//! The per-user balance record and single source of truth: fungible MT
//! tokens, the one-time free message grant, and all purchased plans embedded
//! in the same record so every read is one consistent snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::plan::{ActivePlan, ServiceKind};
use crate::error::AppError;
use crate::AppResult;

/// Per-user balance record
///
/// Invariants at every committed state:
/// - `tokens >= 0`; a deduction that would go negative is rejected
/// - every plan's `remaining >= 0`
/// - `free_messages_remaining >= 0`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Owning user id
    pub user_id: String,

    /// Fungible token balance; fractional (chat costs 0.5 token/message)
    pub tokens: Decimal,

    /// One-time signup grant, decremented per free message
    pub free_messages_remaining: i32,

    /// Purchased plans, embedded; insertion order not significant
    pub active_plans: Vec<ActivePlan>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create an empty wallet with the signup free message grant
    pub fn new(user_id: String, signup_free_messages: i32) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            tokens: Decimal::ZERO,
            free_messages_remaining: signup_free_messages,
            active_plans: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a plan by id
    pub fn plan(&self, id: &str) -> Option<&ActivePlan> {
        self.active_plans.iter().find(|p| p.id == id)
    }

    /// Look up a plan by id, mutably
    pub fn plan_mut(&mut self, id: &str) -> Option<&mut ActivePlan> {
        self.active_plans.iter_mut().find(|p| p.id == id)
    }

    /// Plans that currently qualify to fund a session of the given kind
    pub fn qualifying_plans(&self, kind: ServiceKind, now: DateTime<Utc>) -> Vec<&ActivePlan> {
        self.active_plans
            .iter()
            .filter(|p| p.qualifies(kind, now))
            .collect()
    }

    /// Total remaining call minutes across valid plans (display)
    ///
    /// Expired plans never count toward totals, even with nonzero allotment.
    pub fn call_minutes_total(&self, now: DateTime<Utc>) -> Decimal {
        self.active_plans
            .iter()
            .filter(|p| p.kind == ServiceKind::Call && !p.is_expired(now))
            .map(|p| p.remaining)
            .sum()
    }

    /// Total remaining chat messages across valid plans (display)
    pub fn chat_messages_total(&self, now: DateTime<Utc>) -> Decimal {
        self.active_plans
            .iter()
            .filter(|p| p.kind == ServiceKind::Chat && !p.is_expired(now))
            .map(|p| p.remaining)
            .sum()
    }

    /// Drop expired plans from storage; returns how many were removed
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.active_plans.len();
        self.active_plans.retain(|p| !p.is_expired(now));
        before - self.active_plans.len()
    }

    /// Credit tokens (atomic increment applied by the repository)
    pub fn credit_tokens(&mut self, quantity: Decimal) {
        self.tokens += quantity;
    }

    /// Debit tokens, rejecting any deduction that would go negative
    pub fn debit_tokens(&mut self, quantity: Decimal) -> AppResult<()> {
        if quantity > self.tokens {
            return Err(AppError::InsufficientBalance {
                required: quantity.to_string(),
                available: self.tokens.to_string(),
            });
        }
        self.tokens -= quantity;
        Ok(())
    }

    /// Consume one free message, flooring at zero
    pub fn use_free_message(&mut self) -> AppResult<i32> {
        if self.free_messages_remaining <= 0 {
            return Err(AppError::FreeMessagesExhausted);
        }
        self.free_messages_remaining -= 1;
        Ok(self.free_messages_remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wallet_with(tokens: Decimal, plans: Vec<ActivePlan>) -> Wallet {
        let mut w = Wallet::new("user-1".to_string(), 5);
        w.tokens = tokens;
        w.active_plans = plans;
        w
    }

    fn call_plan(remaining: Decimal, days_ago: i64) -> ActivePlan {
        let purchased = Utc::now() - chrono::Duration::days(days_ago);
        let mut p = ActivePlan::new(
            ServiceKind::Call,
            "Call Pack".to_string(),
            dec!(100),
            dec!(10),
            purchased,
            30,
        );
        p.remaining = remaining;
        p
    }

    #[test]
    fn test_debit_rejects_negative_balance() {
        let mut w = wallet_with(dec!(1.5), vec![]);

        assert!(w.debit_tokens(dec!(2)).is_err());
        assert_eq!(w.tokens, dec!(1.5));

        w.debit_tokens(dec!(1.5)).unwrap();
        assert_eq!(w.tokens, dec!(0));
    }

    #[test]
    fn test_expired_plans_excluded_from_totals() {
        let valid = call_plan(dec!(10), 1);
        let expired = call_plan(dec!(7), 40);
        let w = wallet_with(dec!(0), vec![valid, expired]);

        assert_eq!(w.call_minutes_total(Utc::now()), dec!(10));
    }

    #[test]
    fn test_prune_expired() {
        let mut w = wallet_with(dec!(0), vec![call_plan(dec!(10), 1), call_plan(dec!(3), 40)]);

        assert_eq!(w.prune_expired(Utc::now()), 1);
        assert_eq!(w.active_plans.len(), 1);
    }

    #[test]
    fn test_free_message_floor() {
        let mut w = Wallet::new("user-1".to_string(), 1);

        assert_eq!(w.use_free_message().unwrap(), 0);
        assert!(matches!(
            w.use_free_message(),
            Err(AppError::FreeMessagesExhausted)
        ));
        assert_eq!(w.free_messages_remaining, 0);
    }
}
