//! In-memory Balance Store
//!
//! A complete in-process implementation of the wallet store, settlement
//! service, and credit store over a mutex-guarded map. Used by unit tests
//! and local development; it applies the same pure resolution functions as
//! the PostgreSQL service, with the mutex standing in for the row lock.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use solace_core::{
    models::{
        ActivePlan, CallSettlement, ChatDeduction, CreditOutcome, FundingSource, ListenerEarning,
        Purchase, ServiceKind, Wallet,
    },
    traits::{CreditStore, SettlementService, WalletStore},
    AppError, AppResult, RatePolicy,
};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::settlement::resolve;

#[derive(Default)]
struct Inner {
    wallets: HashMap<String, Wallet>,
    receipts: HashMap<String, CallSettlement>,
    processed_payments: HashMap<String, String>,
    earnings: Vec<ListenerEarning>,
}

/// In-memory store guarded by a single async mutex
///
/// The mutex serializes every balance mutation, matching the per-user row
/// lock semantics of the PostgreSQL store (coarser, which is fine for tests
/// and development).
pub struct MemoryStore {
    policy: RatePolicy,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store with the given policy
    pub fn new(policy: RatePolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Seed a wallet, replacing any existing one
    pub async fn put_wallet(&self, wallet: Wallet) {
        let mut inner = self.inner.lock().await;
        inner.wallets.insert(wallet.user_id.clone(), wallet);
    }

    /// Recorded listener earnings, for assertions
    pub async fn earnings(&self) -> Vec<ListenerEarning> {
        self.inner.lock().await.earnings.clone()
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn fetch(&self, user_id: &str) -> AppResult<Option<Wallet>> {
        Ok(self.inner.lock().await.wallets.get(user_id).cloned())
    }

    async fn ensure(&self, user_id: &str) -> AppResult<Wallet> {
        let mut inner = self.inner.lock().await;
        let wallet = inner
            .wallets
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Wallet::new(user_id.to_string(), self.policy.signup_free_messages)
            });
        Ok(wallet.clone())
    }
}

#[async_trait]
impl SettlementService for MemoryStore {
    async fn finalize_call(
        &self,
        user_id: &str,
        listener_id: &str,
        funding: &FundingSource,
        consumed_secs: i64,
        settlement_key: &str,
    ) -> AppResult<CallSettlement> {
        let mut inner = self.inner.lock().await;

        if let Some(stored) = inner.receipts.get(settlement_key) {
            let mut receipt = stored.clone();
            receipt.already_applied = true;
            return Ok(receipt);
        }

        let wallet = inner
            .wallets
            .get_mut(user_id)
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

        let settlement = resolve::resolve_call(
            wallet,
            funding,
            consumed_secs,
            &self.policy,
            Utc::now(),
            settlement_key,
        )?;

        if settlement.billed_minutes > 0 {
            inner.earnings.push(ListenerEarning::new(
                listener_id,
                user_id,
                ServiceKind::Call,
                Decimal::from(settlement.billed_minutes),
            ));
        }
        inner
            .receipts
            .insert(settlement_key.to_string(), settlement.clone());

        Ok(settlement)
    }

    async fn deduct_chat_usage(
        &self,
        user_id: &str,
        funding: &FundingSource,
        message_count: u32,
    ) -> AppResult<ChatDeduction> {
        let mut inner = self.inner.lock().await;

        let wallet = inner
            .wallets
            .get_mut(user_id)
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

        resolve::resolve_chat(wallet, funding, message_count, &self.policy, Utc::now())
    }

    async fn use_free_message(&self, user_id: &str) -> AppResult<i32> {
        let mut inner = self.inner.lock().await;

        let wallet = inner
            .wallets
            .get_mut(user_id)
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

        wallet.use_free_message()
    }

    async fn close_chat_session(
        &self,
        user_id: &str,
        listener_id: &str,
        consumed_messages: u32,
    ) -> AppResult<()> {
        if consumed_messages == 0 {
            return Ok(());
        }
        let mut inner = self.inner.lock().await;
        inner.earnings.push(ListenerEarning::new(
            listener_id,
            user_id,
            ServiceKind::Chat,
            Decimal::from(consumed_messages),
        ));
        Ok(())
    }
}

#[async_trait]
impl CreditStore for MemoryStore {
    async fn apply_credit(
        &self,
        payment_id: &str,
        user_id: &str,
        purchase: &Purchase,
    ) -> AppResult<CreditOutcome> {
        let mut inner = self.inner.lock().await;

        if inner.processed_payments.contains_key(payment_id) {
            return Ok(CreditOutcome::AlreadyProcessed);
        }

        let signup_free_messages = self.policy.signup_free_messages;
        let wallet = inner
            .wallets
            .entry(user_id.to_string())
            .or_insert_with(|| Wallet::new(user_id.to_string(), signup_free_messages));

        match purchase {
            Purchase::Tokens { quantity, .. } => {
                wallet.credit_tokens(*quantity);
            }
            Purchase::Plan {
                service,
                name,
                price,
                allotment,
            } => {
                wallet.active_plans.push(ActivePlan::new(
                    *service,
                    name.clone(),
                    *price,
                    *allotment,
                    Utc::now(),
                    self.policy.plan_validity_days,
                ));
            }
        }

        inner
            .processed_payments
            .insert(payment_id.to_string(), user_id.to_string());

        Ok(CreditOutcome::Applied)
    }
}
