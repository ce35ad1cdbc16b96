//! Wallet repository implementation
//!
//! PostgreSQL-backed storage for the Balance Store. Each wallet is a single
//! row with plans embedded as JSONB, so a read is always one consistent
//! snapshot and `SELECT ... FOR UPDATE` on the row serializes every
//! balance-mutating transaction for that user.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use solace_core::{
    models::{ActivePlan, Wallet},
    traits::WalletStore,
    AppError, AppResult,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, instrument};

/// Row mapping for the wallets table
#[derive(Debug, sqlx::FromRow)]
pub struct WalletRow {
    pub user_id: String,
    pub tokens: Decimal,
    pub free_messages_remaining: i32,
    pub active_plans: Json<Vec<ActivePlan>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Self {
            user_id: row.user_id,
            tokens: row.tokens,
            free_messages_remaining: row.free_messages_remaining,
            active_plans: row.active_plans.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_WALLET: &str = r#"
    SELECT user_id, tokens, free_messages_remaining, active_plans,
           created_at, updated_at
    FROM wallets
    WHERE user_id = $1
"#;

const SELECT_WALLET_FOR_UPDATE: &str = r#"
    SELECT user_id, tokens, free_messages_remaining, active_plans,
           created_at, updated_at
    FROM wallets
    WHERE user_id = $1
    FOR UPDATE
"#;

/// PostgreSQL implementation of the wallet store
pub struct PgWalletRepository {
    pool: PgPool,
    signup_free_messages: i32,
}

impl PgWalletRepository {
    /// Create a new wallet repository
    pub fn new(pool: PgPool, signup_free_messages: i32) -> Self {
        Self {
            pool,
            signup_free_messages,
        }
    }

    /// Lock a wallet row inside an open transaction
    ///
    /// Every balance-mutating transaction goes through this lock; two
    /// concurrent sessions for the same user serialize here.
    pub async fn lock_wallet(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &str,
    ) -> AppResult<Option<Wallet>> {
        let row = sqlx::query_as::<Postgres, WalletRow>(SELECT_WALLET_FOR_UPDATE)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| {
                error!("Failed to lock wallet {}: {}", user_id, e);
                AppError::Database(format!("Failed to lock wallet: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    /// Persist a mutated wallet inside an open transaction
    pub async fn persist_wallet(
        tx: &mut Transaction<'_, Postgres>,
        wallet: &Wallet,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET tokens = $2,
                free_messages_remaining = $3,
                active_plans = $4,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(&wallet.user_id)
        .bind(wallet.tokens)
        .bind(wallet.free_messages_remaining)
        .bind(Json(&wallet.active_plans))
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to persist wallet {}: {}", wallet.user_id, e);
            AppError::Database(format!("Failed to persist wallet: {}", e))
        })?;

        Ok(())
    }

    /// Drop expired plans from a wallet (cleanup pass)
    #[instrument(skip(self))]
    pub async fn prune_expired(&self, user_id: &str) -> AppResult<usize> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let Some(mut wallet) = Self::lock_wallet(&mut tx, user_id).await? else {
            return Ok(0);
        };

        let removed = wallet.prune_expired(Utc::now());
        if removed > 0 {
            Self::persist_wallet(&mut tx, &wallet).await?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        debug!("Pruned {} expired plans for user {}", removed, user_id);
        Ok(removed)
    }
}

#[async_trait]
impl WalletStore for PgWalletRepository {
    #[instrument(skip(self))]
    async fn fetch(&self, user_id: &str) -> AppResult<Option<Wallet>> {
        debug!("Fetching wallet for user: {}", user_id);

        let row = sqlx::query_as::<Postgres, WalletRow>(SELECT_WALLET)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error fetching wallet {}: {}", user_id, e);
                AppError::Database(format!("Failed to fetch wallet: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn ensure(&self, user_id: &str) -> AppResult<Wallet> {
        debug!("Ensuring wallet for user: {}", user_id);

        // Insert-if-missing keeps the signup grant a one-time event even when
        // two first requests race.
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, tokens, free_messages_remaining, active_plans)
            VALUES ($1, 0, $2, '[]'::jsonb)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(self.signup_free_messages)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating wallet {}: {}", user_id, e);
            AppError::Database(format!("Failed to create wallet: {}", e))
        })?;

        self.fetch(user_id)
            .await?
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))
    }
}
