//! Listener earning repository implementation
//!
//! Append-only storage for listener earnings. Earnings are recorded inside
//! the settlement transaction so a committed deduction and its earning are
//! inseparable; the standalone insert is used by fail-closed settlements
//! and chat session close.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use solace_core::{
    models::{ListenerEarning, ServiceKind},
    AppError, AppResult,
};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, instrument};

/// Row mapping for the listener_earnings table
#[derive(Debug, sqlx::FromRow)]
struct EarningRow {
    listener_id: String,
    user_id: String,
    kind: String,
    units: Decimal,
    created_at: DateTime<Utc>,
}

impl From<EarningRow> for ListenerEarning {
    fn from(row: EarningRow) -> Self {
        Self {
            listener_id: row.listener_id,
            user_id: row.user_id,
            kind: ServiceKind::from_str(&row.kind).unwrap_or_default(),
            units: row.units,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL implementation of the listener earning store
pub struct PgEarningRepository {
    pool: PgPool,
}

impl PgEarningRepository {
    /// Create a new earning repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an earning inside an open transaction
    pub async fn insert_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        earning: &ListenerEarning,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO listener_earnings (listener_id, user_id, kind, units)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&earning.listener_id)
        .bind(&earning.user_id)
        .bind(earning.kind.to_string())
        .bind(earning.units)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to insert earning: {}", e);
            AppError::Database(format!("Failed to insert earning: {}", e))
        })?;

        Ok(())
    }

    /// Insert a standalone earning record
    #[instrument(skip(self, earning))]
    pub async fn insert(&self, earning: &ListenerEarning) -> AppResult<()> {
        debug!(
            "Recording earning for listener {}: {} {} units",
            earning.listener_id, earning.units, earning.kind
        );

        sqlx::query(
            r#"
            INSERT INTO listener_earnings (listener_id, user_id, kind, units)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&earning.listener_id)
        .bind(&earning.user_id)
        .bind(earning.kind.to_string())
        .bind(earning.units)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert earning: {}", e);
            AppError::Database(format!("Failed to insert earning: {}", e))
        })?;

        Ok(())
    }

    /// Most recent earnings for a listener
    #[instrument(skip(self))]
    pub async fn recent_for_listener(
        &self,
        listener_id: &str,
        limit: i64,
    ) -> AppResult<Vec<ListenerEarning>> {
        let rows = sqlx::query_as::<Postgres, EarningRow>(
            r#"
            SELECT listener_id, user_id, kind, units, created_at
            FROM listener_earnings
            WHERE listener_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(listener_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch earnings for {}: {}", listener_id, e);
            AppError::Database(format!("Failed to fetch earnings: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
