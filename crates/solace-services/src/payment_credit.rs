//! Payment credit processor
//!
//! Converts confirmed gateway payment events into Balance Store credits,
//! exactly once per unique payment id. Webhook delivery and the client's
//! "verify payment" fallback race benignly: whichever arrives second finds
//! the processed-payment record and no-ops.

use async_trait::async_trait;
use chrono::Utc;
use solace_cache::RedisCache;
use solace_core::{
    models::{ActivePlan, CheckoutOrder, CreditOutcome, Purchase, Wallet},
    traits::{CreditStore, PaymentGateway, PaymentProcessor},
    AppError, AppResult, RatePolicy,
};
use solace_db::PgWalletRepository;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::gateway::{
    parse_webhook_event, verify_webhook_signature, EVENT_PAYMENT_CAPTURED,
};

/// PostgreSQL-backed credit store
///
/// The wallet mutation, the credit-history entry, and the processed-payment
/// record commit in a single transaction: both-or-neither.
pub struct PgCreditStore {
    pool: PgPool,
    cache: RedisCache,
    policy: RatePolicy,
    snapshot_ttl_secs: u64,
}

impl PgCreditStore {
    /// Create a new credit store
    pub fn new(
        pool: PgPool,
        cache: RedisCache,
        policy: RatePolicy,
        snapshot_ttl_secs: u64,
    ) -> Self {
        Self {
            pool,
            cache,
            policy,
            snapshot_ttl_secs,
        }
    }
}

#[async_trait]
impl CreditStore for PgCreditStore {
    #[instrument(skip(self, purchase))]
    async fn apply_credit(
        &self,
        payment_id: &str,
        user_id: &str,
        purchase: &Purchase,
    ) -> AppResult<CreditOutcome> {
        info!("Applying credit {} for user {}", payment_id, user_id);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // A credit may arrive before the user's first wallet read.
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, tokens, free_messages_remaining, active_plans)
            VALUES ($1, 0, $2, '[]'::jsonb)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(self.policy.signup_free_messages)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create wallet: {}", e)))?;

        let mut wallet = PgWalletRepository::lock_wallet(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

        // Idempotency guard: checked behind the row lock so a webhook and a
        // verify call racing the same payment serialize here.
        let already: Option<(String,)> = sqlx::query_as(
            "SELECT payment_id FROM processed_payments WHERE payment_id = $1",
        )
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to check payment record: {}", e)))?;

        if already.is_some() {
            debug!("Payment {} already processed, no-op", payment_id);
            return Ok(CreditOutcome::AlreadyProcessed);
        }

        apply_purchase(&mut wallet, purchase, &self.policy);

        PgWalletRepository::persist_wallet(&mut tx, &wallet).await?;

        sqlx::query("INSERT INTO processed_payments (payment_id, user_id) VALUES ($1, $2)")
            .bind(payment_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to record processed payment: {}", e);
                AppError::Database(format!("Failed to record payment: {}", e))
            })?;

        sqlx::query(
            "INSERT INTO credit_entries (user_id, payment_id, purchase) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(payment_id)
        .bind(Json(purchase))
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to record credit entry: {}", e)))?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        if let Err(e) = self
            .cache
            .publish_wallet(&wallet, self.snapshot_ttl_secs)
            .await
        {
            warn!(user_id = %user_id, "Failed to publish wallet snapshot: {}", e);
        }

        info!("Credited payment {} to user {}", payment_id, user_id);
        Ok(CreditOutcome::Applied)
    }
}

/// Apply a purchase to a wallet snapshot
fn apply_purchase(wallet: &mut Wallet, purchase: &Purchase, policy: &RatePolicy) {
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
                policy.plan_validity_days,
            ));
        }
    }
}

/// Payment credit processor over a gateway and a credit store
pub struct PaymentCreditProcessor<G, S> {
    gateway: Arc<G>,
    store: Arc<S>,
    webhook_secret: String,
}

impl<G: PaymentGateway, S: CreditStore> PaymentCreditProcessor<G, S> {
    /// Create a new processor
    pub fn new(gateway: Arc<G>, store: Arc<S>, webhook_secret: &str) -> Self {
        Self {
            gateway,
            store,
            webhook_secret: webhook_secret.to_string(),
        }
    }
}

#[async_trait]
impl<G: PaymentGateway, S: CreditStore> PaymentProcessor for PaymentCreditProcessor<G, S> {
    #[instrument(skip(self, purchase))]
    async fn create_order(&self, user_id: &str, purchase: Purchase) -> AppResult<CheckoutOrder> {
        self.gateway.create_order(user_id, &purchase).await
    }

    #[instrument(skip(self))]
    async fn verify_and_credit(
        &self,
        user_id: &str,
        payment_id: &str,
    ) -> AppResult<CreditOutcome> {
        let payment = self.gateway.fetch_payment(payment_id).await?;

        // Never credit on a pending or failed status.
        if !payment.status.is_captured() {
            warn!(
                "Payment {} not captured (status: {}), refusing to credit",
                payment_id, payment.status
            );
            return Err(AppError::PaymentNotCaptured(payment_id.to_string()));
        }

        // The verify fallback is caller-initiated; refuse to credit a
        // payment that belongs to a different user's order.
        if payment.notes.user_id != user_id {
            return Err(AppError::Unauthorized(
                "Payment belongs to a different user".to_string(),
            ));
        }

        self.store
            .apply_credit(&payment.id, &payment.notes.user_id, &payment.notes.purchase)
            .await
    }

    #[instrument(skip(self, body, signature))]
    async fn handle_webhook(&self, body: &[u8], signature: &str) -> AppResult<CreditOutcome> {
        verify_webhook_signature(&self.webhook_secret, body, signature)?;

        let event = parse_webhook_event(body)?;
        if event.event != EVENT_PAYMENT_CAPTURED {
            debug!("Ignoring webhook event: {}", event.event);
            return Ok(CreditOutcome::AlreadyProcessed);
        }

        let entity = event.payload.payment.entity;
        self.store
            .apply_credit(&entity.id, &entity.notes.user_id, &entity.notes.purchase)
            .await
    }
}
