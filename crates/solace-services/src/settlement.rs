//! Settlement service
//!
//! The only component trusted to mutate the Balance Store for consumption.
//! Resolution is a pure function over a wallet snapshot; the PostgreSQL
//! service wraps it in a single transaction per operation:
//!
//! - lock the wallet row (`FOR UPDATE`), serializing all mutation per user
//! - check the settlement receipt for duplicate delivery
//! - resolve, persist, record the receipt and listener earning
//! - commit, then publish the wallet snapshot for live balance watches
//!
//! Call billing is ceiling-minute: a 125-second call bills 3 minutes. A call
//! at or below the minimum threshold commits a zero receipt. A plan that
//! expired or vanished between session start and settlement falls back to
//! tokens; if tokens are also short, the settlement fails closed (nothing
//! deducted) while the listener earning is still recorded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use solace_cache::RedisCache;
use solace_core::{
    models::{
        CallSettlement, ChatDeduction, FundingSource, ListenerEarning, ServiceKind, Wallet,
    },
    traits::SettlementService,
    AppError, AppResult, RatePolicy,
};
use solace_db::{PgEarningRepository, PgWalletRepository};
use sqlx::{PgPool, Postgres};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Pure settlement resolution, shared by the PostgreSQL and in-memory stores
pub mod resolve {
    use super::*;

    /// Resolve a finished call against a wallet snapshot, mutating it
    ///
    /// Mirrors the selector's funding order: the named plan absorbs billed
    /// minutes first, any shortfall falls to the token pool. A shortfall the
    /// tokens cannot cover is absorbed by the platform rather than leaving a
    /// partially-applied deduction ambiguous on retry.
    pub fn resolve_call(
        wallet: &mut Wallet,
        funding: &FundingSource,
        consumed_secs: i64,
        policy: &RatePolicy,
        now: DateTime<Utc>,
        settlement_key: &str,
    ) -> AppResult<CallSettlement> {
        if consumed_secs < 0 {
            return Err(AppError::InvalidInput(format!(
                "consumed_secs must be non-negative, got {}",
                consumed_secs
            )));
        }
        if funding.is_free_trial() {
            return Err(AppError::InvalidInput(
                "free trial sessions are never billed".to_string(),
            ));
        }

        let billed_minutes = policy.billed_minutes(consumed_secs);
        if billed_minutes == 0 {
            // Short accidental connects are not billed.
            return Ok(CallSettlement::zero(settlement_key.to_string()));
        }

        let mut plan_minutes = Decimal::ZERO;
        let mut uncovered = Decimal::from(billed_minutes);

        if let FundingSource::Plan { id } = funding {
            match wallet.plan_mut(id) {
                Some(plan) if plan.kind == ServiceKind::Call && !plan.is_expired(now) => {
                    plan_minutes = plan.deduct(uncovered);
                    uncovered -= plan_minutes;
                }
                Some(_) | None => {
                    // Expired, deleted, or wrong-kind plan: fall through to
                    // the token pool for the whole amount.
                    warn!(plan_id = %id, "Call plan unusable at settlement, falling back to tokens");
                }
            }
        }

        let mut tokens = Decimal::ZERO;
        if uncovered > Decimal::ZERO {
            let cost = policy.call_tokens_per_minute * uncovered;
            if wallet.debit_tokens(cost).is_ok() {
                tokens = cost;
            } else if plan_minutes > Decimal::ZERO {
                // The plan absorbed part of the call; the token shortfall is
                // absorbed by the platform.
                warn!(
                    user_id = %wallet.user_id,
                    shortfall = %cost,
                    "Token balance short of call overage, absorbing"
                );
            } else {
                // Fail closed: nothing deducted. The caller still records
                // the listener earning and the receipt.
                warn!(
                    user_id = %wallet.user_id,
                    required = %cost,
                    available = %wallet.tokens,
                    "Call settlement failed closed, nothing collected"
                );
            }
        }

        Ok(CallSettlement {
            settlement_key: settlement_key.to_string(),
            billed_minutes,
            plan_minutes_deducted: plan_minutes,
            tokens_deducted: tokens,
            already_applied: false,
        })
    }

    /// Resolve a chat deduction against a wallet snapshot, mutating it
    ///
    /// Pre-flight semantics: either the full message count is funded and the
    /// wallet is mutated, or a typed `InsufficientBalance` is returned and
    /// the wallet is untouched and the message must not be transmitted.
    pub fn resolve_chat(
        wallet: &mut Wallet,
        funding: &FundingSource,
        message_count: u32,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> AppResult<ChatDeduction> {
        if message_count == 0 {
            return Err(AppError::InvalidInput(
                "message_count must be positive".to_string(),
            ));
        }
        if funding.is_free_trial() {
            return Err(AppError::InvalidInput(
                "free trial messages use the free message grant".to_string(),
            ));
        }

        let requested = Decimal::from(message_count);

        // Work out coverage before mutating anything so a rejection leaves
        // the snapshot untouched.
        let plan_cover = match funding {
            FundingSource::Plan { id } => match wallet.plan(id) {
                Some(plan) if plan.kind == ServiceKind::Chat && !plan.is_expired(now) => {
                    plan.remaining.min(requested)
                }
                Some(_) | None => {
                    warn!(plan_id = %id, "Chat plan unusable at deduction, falling back to tokens");
                    Decimal::ZERO
                }
            },
            FundingSource::TokenPool => Decimal::ZERO,
            FundingSource::FreeTrial => unreachable!("rejected above"),
        };

        let shortfall_messages = requested - plan_cover;
        let token_cost = policy.chat_tokens_per_message * shortfall_messages;

        if token_cost > wallet.tokens {
            return Err(AppError::InsufficientBalance {
                required: token_cost.to_string(),
                available: wallet.tokens.to_string(),
            });
        }

        if plan_cover > Decimal::ZERO {
            if let FundingSource::Plan { id } = funding {
                if let Some(plan) = wallet.plan_mut(id) {
                    plan.deduct(plan_cover);
                }
            }
        }
        if token_cost > Decimal::ZERO {
            wallet.debit_tokens(token_cost)?;
        }

        let resolved = if plan_cover > Decimal::ZERO {
            funding.clone()
        } else {
            FundingSource::TokenPool
        };

        let remaining = match &resolved {
            FundingSource::Plan { id } => {
                wallet.plan(id).map(|p| p.remaining).unwrap_or_default()
            }
            _ => wallet.tokens,
        };

        Ok(ChatDeduction {
            resolved,
            plan_messages_deducted: plan_cover,
            tokens_deducted: token_cost,
            remaining,
        })
    }
}

/// Stored receipt row
#[derive(Debug, sqlx::FromRow)]
struct ReceiptRow {
    settlement_key: String,
    billed_minutes: i32,
    plan_minutes_deducted: Decimal,
    tokens_deducted: Decimal,
}

impl From<ReceiptRow> for CallSettlement {
    fn from(row: ReceiptRow) -> Self {
        Self {
            settlement_key: row.settlement_key,
            billed_minutes: row.billed_minutes.max(0) as u32,
            plan_minutes_deducted: row.plan_minutes_deducted,
            tokens_deducted: row.tokens_deducted,
            already_applied: true,
        }
    }
}

/// PostgreSQL-backed settlement service
pub struct PgSettlementService {
    pool: PgPool,
    earnings: Arc<PgEarningRepository>,
    cache: RedisCache,
    policy: RatePolicy,
    snapshot_ttl_secs: u64,
}

impl PgSettlementService {
    /// Create a new settlement service
    pub fn new(
        pool: PgPool,
        earnings: Arc<PgEarningRepository>,
        cache: RedisCache,
        policy: RatePolicy,
        snapshot_ttl_secs: u64,
    ) -> Self {
        Self {
            pool,
            earnings,
            cache,
            policy,
            snapshot_ttl_secs,
        }
    }

    async fn begin(&self) -> AppResult<sqlx::Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })
    }

    async fn commit(&self, tx: sqlx::Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })
    }

    /// Publish the committed wallet for live balance watches; best effort
    async fn publish_snapshot(&self, wallet: &Wallet) {
        if let Err(e) = self
            .cache
            .publish_wallet(wallet, self.snapshot_ttl_secs)
            .await
        {
            warn!(user_id = %wallet.user_id, "Failed to publish wallet snapshot: {}", e);
        }
    }
}

#[async_trait]
impl SettlementService for PgSettlementService {
    #[instrument(skip(self))]
    async fn finalize_call(
        &self,
        user_id: &str,
        listener_id: &str,
        funding: &FundingSource,
        consumed_secs: i64,
        settlement_key: &str,
    ) -> AppResult<CallSettlement> {
        info!(
            "Finalizing call for user {}: {}s against {}",
            user_id, consumed_secs, funding
        );

        let mut tx = self.begin().await?;

        // Lock first: the receipt check is only trustworthy once this user's
        // mutations are serialized behind the row lock.
        let mut wallet = PgWalletRepository::lock_wallet(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

        let existing = sqlx::query_as::<Postgres, ReceiptRow>(
            r#"
            SELECT settlement_key, billed_minutes, plan_minutes_deducted, tokens_deducted
            FROM settlement_receipts
            WHERE settlement_key = $1
            "#,
        )
        .bind(settlement_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to check receipt: {}", e)))?;

        if let Some(row) = existing {
            debug!(
                "Settlement {} already applied, returning stored receipt",
                settlement_key
            );
            return Ok(row.into());
        }

        let settlement = resolve::resolve_call(
            &mut wallet,
            funding,
            consumed_secs,
            &self.policy,
            Utc::now(),
            settlement_key,
        )?;

        PgWalletRepository::persist_wallet(&mut tx, &wallet).await?;

        sqlx::query(
            r#"
            INSERT INTO settlement_receipts
                (settlement_key, user_id, billed_minutes, plan_minutes_deducted, tokens_deducted)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(settlement_key)
        .bind(user_id)
        .bind(settlement.billed_minutes as i32)
        .bind(settlement.plan_minutes_deducted)
        .bind(settlement.tokens_deducted)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to record settlement receipt: {}", e);
            AppError::Database(format!("Failed to record receipt: {}", e))
        })?;

        // The listener is paid for billed time regardless of whether the
        // platform collected from the user.
        if settlement.billed_minutes > 0 {
            let earning = ListenerEarning::new(
                listener_id,
                user_id,
                ServiceKind::Call,
                Decimal::from(settlement.billed_minutes),
            );
            PgEarningRepository::insert_in_tx(&mut tx, &earning).await?;
        }

        self.commit(tx).await?;
        self.publish_snapshot(&wallet).await;

        info!(
            "Settled call {}: {} min ({} from plan, {} tokens)",
            settlement_key,
            settlement.billed_minutes,
            settlement.plan_minutes_deducted,
            settlement.tokens_deducted
        );

        Ok(settlement)
    }

    #[instrument(skip(self))]
    async fn deduct_chat_usage(
        &self,
        user_id: &str,
        funding: &FundingSource,
        message_count: u32,
    ) -> AppResult<ChatDeduction> {
        debug!(
            "Deducting {} chat message(s) for user {} against {}",
            message_count, user_id, funding
        );

        let mut tx = self.begin().await?;

        let mut wallet = PgWalletRepository::lock_wallet(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

        let deduction = resolve::resolve_chat(
            &mut wallet,
            funding,
            message_count,
            &self.policy,
            Utc::now(),
        )?;

        PgWalletRepository::persist_wallet(&mut tx, &wallet).await?;
        self.commit(tx).await?;
        self.publish_snapshot(&wallet).await;

        Ok(deduction)
    }

    #[instrument(skip(self))]
    async fn use_free_message(&self, user_id: &str) -> AppResult<i32> {
        let mut tx = self.begin().await?;

        let mut wallet = PgWalletRepository::lock_wallet(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

        let remaining = wallet.use_free_message()?;

        PgWalletRepository::persist_wallet(&mut tx, &wallet).await?;
        self.commit(tx).await?;
        self.publish_snapshot(&wallet).await;

        debug!("User {} has {} free messages left", user_id, remaining);
        Ok(remaining)
    }

    #[instrument(skip(self))]
    async fn close_chat_session(
        &self,
        user_id: &str,
        listener_id: &str,
        consumed_messages: u32,
    ) -> AppResult<()> {
        if consumed_messages == 0 {
            return Ok(());
        }

        let earning = ListenerEarning::new(
            listener_id,
            user_id,
            ServiceKind::Chat,
            Decimal::from(consumed_messages),
        );
        self.earnings.insert(&earning).await
    }
}

#[cfg(test)]
mod tests {
    use super::resolve::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use solace_core::models::{ActivePlan, FundingSource, ServiceKind, Wallet};
    use solace_core::{AppError, RatePolicy};

    fn wallet(tokens: rust_decimal::Decimal, plans: Vec<ActivePlan>) -> Wallet {
        let mut w = Wallet::new("user-1".to_string(), 0);
        w.tokens = tokens;
        w.active_plans = plans;
        w
    }

    fn call_plan(remaining: rust_decimal::Decimal) -> ActivePlan {
        let mut p = ActivePlan::new(
            ServiceKind::Call,
            "Call Pack".to_string(),
            dec!(100),
            dec!(10),
            Utc::now() - chrono::Duration::days(1),
            30,
        );
        p.remaining = remaining;
        p
    }

    fn chat_plan(remaining: rust_decimal::Decimal) -> ActivePlan {
        let mut p = ActivePlan::new(
            ServiceKind::Chat,
            "Chat Pack".to_string(),
            dec!(50),
            dec!(30),
            Utc::now() - chrono::Duration::days(1),
            30,
        );
        p.remaining = remaining;
        p
    }

    #[test]
    fn test_call_ceiling_minutes_from_plan() {
        // 125 seconds against a 10-minute plan: ceil(125/60) = 3 minutes.
        let plan = call_plan(dec!(10));
        let funding = FundingSource::Plan { id: plan.id.clone() };
        let mut w = wallet(dec!(0), vec![plan]);

        let s = resolve_call(&mut w, &funding, 125, &RatePolicy::default(), Utc::now(), "k1")
            .unwrap();

        assert_eq!(s.billed_minutes, 3);
        assert_eq!(s.plan_minutes_deducted, dec!(3));
        assert_eq!(s.tokens_deducted, dec!(0));
        assert_eq!(w.active_plans[0].remaining, dec!(7));
        assert!(s.collected());
    }

    #[test]
    fn test_call_below_threshold_is_free() {
        let mut w = wallet(dec!(10), vec![]);

        let s = resolve_call(
            &mut w,
            &FundingSource::TokenPool,
            4,
            &RatePolicy::default(),
            Utc::now(),
            "k1",
        )
        .unwrap();

        assert_eq!(s.billed_minutes, 0);
        assert_eq!(w.tokens, dec!(10));
        assert!(s.collected());
    }

    #[test]
    fn test_call_just_above_threshold_bills_one_minute() {
        let mut w = wallet(dec!(10), vec![]);

        let s = resolve_call(
            &mut w,
            &FundingSource::TokenPool,
            6,
            &RatePolicy::default(),
            Utc::now(),
            "k1",
        )
        .unwrap();

        assert_eq!(s.billed_minutes, 1);
        assert_eq!(s.tokens_deducted, dec!(2));
        assert_eq!(w.tokens, dec!(8));
    }

    #[test]
    fn test_call_plan_overage_falls_to_tokens() {
        // 10-minute call against a plan with 4 minutes left: plan absorbs 4,
        // the remaining 6 minutes bill 12 tokens.
        let plan = call_plan(dec!(4));
        let funding = FundingSource::Plan { id: plan.id.clone() };
        let mut w = wallet(dec!(20), vec![plan]);

        let s = resolve_call(&mut w, &funding, 600, &RatePolicy::default(), Utc::now(), "k1")
            .unwrap();

        assert_eq!(s.billed_minutes, 10);
        assert_eq!(s.plan_minutes_deducted, dec!(4));
        assert_eq!(s.tokens_deducted, dec!(12));
        assert_eq!(w.active_plans[0].remaining, dec!(0));
        assert_eq!(w.tokens, dec!(8));
    }

    #[test]
    fn test_call_vanished_plan_falls_back_to_tokens() {
        let funding = FundingSource::Plan {
            id: "deleted-plan".to_string(),
        };
        let mut w = wallet(dec!(10), vec![]);

        let s = resolve_call(&mut w, &funding, 120, &RatePolicy::default(), Utc::now(), "k1")
            .unwrap();

        assert_eq!(s.plan_minutes_deducted, dec!(0));
        assert_eq!(s.tokens_deducted, dec!(4));
        assert_eq!(w.tokens, dec!(6));
    }

    #[test]
    fn test_call_fails_closed_without_deduction() {
        // Plan gone, tokens short: nothing is deducted.
        let funding = FundingSource::Plan {
            id: "deleted-plan".to_string(),
        };
        let mut w = wallet(dec!(1), vec![]);

        let s = resolve_call(&mut w, &funding, 120, &RatePolicy::default(), Utc::now(), "k1")
            .unwrap();

        assert_eq!(s.billed_minutes, 2);
        assert_eq!(s.tokens_deducted, dec!(0));
        assert_eq!(w.tokens, dec!(1));
        assert!(!s.collected());
    }

    #[test]
    fn test_call_negative_duration_rejected() {
        let mut w = wallet(dec!(10), vec![]);

        let result = resolve_call(
            &mut w,
            &FundingSource::TokenPool,
            -1,
            &RatePolicy::default(),
            Utc::now(),
            "k1",
        );

        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_call_never_drives_tokens_negative() {
        // 100 minutes would cost 200 tokens against a 3-token balance.
        let mut w = wallet(dec!(3), vec![]);

        let s = resolve_call(
            &mut w,
            &FundingSource::TokenPool,
            6000,
            &RatePolicy::default(),
            Utc::now(),
            "k1",
        )
        .unwrap();

        assert_eq!(s.tokens_deducted, dec!(0));
        assert_eq!(w.tokens, dec!(3));
    }

    #[test]
    fn test_chat_deducts_from_plan() {
        let plan = chat_plan(dec!(5));
        let funding = FundingSource::Plan { id: plan.id.clone() };
        let mut w = wallet(dec!(0), vec![plan]);

        let d = resolve_chat(&mut w, &funding, 1, &RatePolicy::default(), Utc::now()).unwrap();

        assert_eq!(d.plan_messages_deducted, dec!(1));
        assert_eq!(d.tokens_deducted, dec!(0));
        assert_eq!(d.remaining, dec!(4));
        assert_eq!(d.resolved, funding);
    }

    #[test]
    fn test_chat_token_session_costs_half_token() {
        let mut w = wallet(dec!(2), vec![]);

        let d = resolve_chat(
            &mut w,
            &FundingSource::TokenPool,
            1,
            &RatePolicy::default(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(d.tokens_deducted, dec!(0.5));
        assert_eq!(w.tokens, dec!(1.5));
    }

    #[test]
    fn test_chat_preflight_rejection_leaves_wallet_untouched() {
        // 0.4 tokens < the 0.5/message cost: reject, mutate nothing.
        let mut w = wallet(dec!(0.4), vec![]);

        let result = resolve_chat(
            &mut w,
            &FundingSource::TokenPool,
            1,
            &RatePolicy::default(),
            Utc::now(),
        );

        assert!(matches!(result, Err(AppError::InsufficientBalance { .. })));
        assert_eq!(w.tokens, dec!(0.4));
    }

    #[test]
    fn test_chat_expired_plan_falls_back_to_tokens() {
        let mut plan = chat_plan(dec!(5));
        plan.expires_at = Utc::now() - chrono::Duration::days(1);
        let funding = FundingSource::Plan { id: plan.id.clone() };
        let mut w = wallet(dec!(1), vec![plan]);

        let d = resolve_chat(&mut w, &funding, 1, &RatePolicy::default(), Utc::now()).unwrap();

        assert_eq!(d.resolved, FundingSource::TokenPool);
        assert_eq!(d.tokens_deducted, dec!(0.5));
        // The expired plan's allotment is untouched.
        assert_eq!(w.active_plans[0].remaining, dec!(5));
    }

    #[test]
    fn test_free_trial_never_billed() {
        let mut w = wallet(dec!(10), vec![]);

        assert!(resolve_call(
            &mut w,
            &FundingSource::FreeTrial,
            120,
            &RatePolicy::default(),
            Utc::now(),
            "k1"
        )
        .is_err());
        assert!(resolve_chat(
            &mut w,
            &FundingSource::FreeTrial,
            1,
            &RatePolicy::default(),
            Utc::now()
        )
        .is_err());
        assert_eq!(w.tokens, dec!(10));
    }
}
