//! Funding selection
//!
//! Pure decision function choosing which balance funds a new session.
//! Deterministic priority order:
//!
//! 1. Free trial (chat only, while the signup grant lasts)
//! 2. The oldest qualifying plan by purchase time, so paid allotments are
//!    not wasted by expiry
//! 3. The token pool, when it covers the minimum billable unit
//! 4. Otherwise `InsufficientBalance`: the caller must not start a session
//!    and prompts the user to purchase

use chrono::{DateTime, Utc};
use solace_core::{
    models::{ActivePlan, FundingDecision, ServiceKind, Wallet},
    AppError, AppResult, RatePolicy,
};
use tracing::debug;

/// Choose the funding source for a new session
///
/// Pure and deterministic; `now` is passed in so selection is testable and
/// so one instant is used for every expiry comparison.
pub fn select_funding_source(
    kind: ServiceKind,
    wallet: &Wallet,
    policy: &RatePolicy,
    now: DateTime<Utc>,
) -> AppResult<FundingDecision> {
    let cap_secs = policy.session_cap_secs(kind == ServiceKind::Call);

    // Free trial takes priority over plans and tokens for chat sessions.
    if kind == ServiceKind::Chat && wallet.free_messages_remaining > 0 {
        debug!(
            user_id = %wallet.user_id,
            remaining = wallet.free_messages_remaining,
            "Selected free trial funding"
        );
        return Ok(FundingDecision::free_trial(cap_secs));
    }

    if let Some(plan) = oldest_qualifying_plan(wallet, kind, now) {
        debug!(user_id = %wallet.user_id, plan_id = %plan.id, "Selected plan funding");
        return Ok(FundingDecision::from_plan(kind, &plan.id, &plan.name, cap_secs));
    }

    // No qualifying plan; fall back to the token pool.
    let minimum = match kind {
        ServiceKind::Call => policy.min_call_tokens(),
        ServiceKind::Chat => policy.min_chat_tokens(),
    };

    if wallet.tokens >= minimum {
        debug!(user_id = %wallet.user_id, tokens = %wallet.tokens, "Selected token pool funding");
        return Ok(FundingDecision::from_token_pool(kind, cap_secs));
    }

    Err(AppError::InsufficientBalance {
        required: minimum.to_string(),
        available: wallet.tokens.to_string(),
    })
}

/// The qualifying plan closest to expiry, i.e. the earliest purchase
///
/// FIFO by purchase time, not by insertion order.
fn oldest_qualifying_plan(
    wallet: &Wallet,
    kind: ServiceKind,
    now: DateTime<Utc>,
) -> Option<&ActivePlan> {
    wallet
        .active_plans
        .iter()
        .filter(|p| p.qualifies(kind, now))
        .min_by_key(|p| p.purchased_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use solace_core::models::FundingSource;

    fn wallet(tokens: Decimal, free_messages: i32, plans: Vec<ActivePlan>) -> Wallet {
        let mut w = Wallet::new("user-1".to_string(), free_messages);
        w.tokens = tokens;
        w.active_plans = plans;
        w
    }

    fn plan(kind: ServiceKind, remaining: Decimal, purchased_days_ago: i64) -> ActivePlan {
        let purchased = Utc::now() - chrono::Duration::days(purchased_days_ago);
        let mut p = ActivePlan::new(
            kind,
            format!("{} pack", kind),
            dec!(100),
            dec!(10),
            purchased,
            30,
        );
        p.remaining = remaining;
        p
    }

    #[test]
    fn test_plan_before_tokens() {
        // Active call plan with 5 minutes AND 100 tokens: plan wins.
        let call_plan = plan(ServiceKind::Call, dec!(5), 1);
        let plan_id = call_plan.id.clone();
        let w = wallet(dec!(100), 0, vec![call_plan]);

        let decision =
            select_funding_source(ServiceKind::Call, &w, &RatePolicy::default(), Utc::now())
                .unwrap();

        assert_eq!(decision.source, FundingSource::Plan { id: plan_id });
        assert_eq!(decision.session_cap_secs, 3600);
    }

    #[test]
    fn test_oldest_plan_first() {
        let older = plan(ServiceKind::Call, dec!(5), 20);
        let newer = plan(ServiceKind::Call, dec!(30), 2);
        let older_id = older.id.clone();
        // Insertion order deliberately newest-first.
        let w = wallet(dec!(0), 0, vec![newer, older]);

        let decision =
            select_funding_source(ServiceKind::Call, &w, &RatePolicy::default(), Utc::now())
                .unwrap();

        assert_eq!(decision.source, FundingSource::Plan { id: older_id });
    }

    #[test]
    fn test_exhausted_plan_falls_back_to_tokens() {
        // Chat plan with 0 messages is excluded even though unexpired.
        let empty = plan(ServiceKind::Chat, dec!(0), 1);
        let w = wallet(dec!(0.5), 0, vec![empty]);

        let decision =
            select_funding_source(ServiceKind::Chat, &w, &RatePolicy::default(), Utc::now())
                .unwrap();

        assert_eq!(decision.source, FundingSource::TokenPool);
        assert_eq!(decision.session_cap_secs, 10800);
    }

    #[test]
    fn test_expired_plan_never_selected() {
        let expired = plan(ServiceKind::Call, dec!(10), 40);
        let w = wallet(dec!(2), 0, vec![expired]);

        let decision =
            select_funding_source(ServiceKind::Call, &w, &RatePolicy::default(), Utc::now())
                .unwrap();

        assert_eq!(decision.source, FundingSource::TokenPool);
    }

    #[test]
    fn test_insufficient_balance() {
        // 1.9 tokens < the 2-token call minimum.
        let w = wallet(dec!(1.9), 0, vec![]);

        let result =
            select_funding_source(ServiceKind::Call, &w, &RatePolicy::default(), Utc::now());

        assert!(matches!(
            result,
            Err(AppError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_chat_token_minimum() {
        let w = wallet(dec!(0.5), 0, vec![]);

        let decision =
            select_funding_source(ServiceKind::Chat, &w, &RatePolicy::default(), Utc::now())
                .unwrap();

        assert_eq!(decision.source, FundingSource::TokenPool);

        let short = wallet(dec!(0.4), 0, vec![]);
        assert!(select_funding_source(
            ServiceKind::Chat,
            &short,
            &RatePolicy::default(),
            Utc::now()
        )
        .is_err());
    }

    #[test]
    fn test_free_trial_takes_priority_for_chat() {
        // Free messages outrank both a valid chat plan and tokens.
        let chat_plan = plan(ServiceKind::Chat, dec!(10), 1);
        let w = wallet(dec!(100), 3, vec![chat_plan]);

        let decision =
            select_funding_source(ServiceKind::Chat, &w, &RatePolicy::default(), Utc::now())
                .unwrap();

        assert!(decision.is_free_trial());
    }

    #[test]
    fn test_free_trial_never_applies_to_calls() {
        let w = wallet(dec!(2), 5, vec![]);

        let decision =
            select_funding_source(ServiceKind::Call, &w, &RatePolicy::default(), Utc::now())
                .unwrap();

        assert_eq!(decision.source, FundingSource::TokenPool);
    }
}
