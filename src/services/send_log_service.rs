//! services/send_log_service.rs
//! Log de intentos (append-only) y mapa de correlation ids.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use crate::models::campaign_model::{AttemptOutcome, CorrelationRecord, SendAttemptRecord};

#[async_trait]
pub trait SendLogStore: Send + Sync {
    async fn append_attempt(&self, record: &SendAttemptRecord) -> Result<()>;

    async fn append_correlation(&self, record: &CorrelationRecord) -> Result<()>;

    /// Intentos de una campaña en orden de inserción.
    async fn list_attempts(&self, campaign_id: &str) -> Result<Vec<SendAttemptRecord>>;
}

#[derive(Clone, Debug)]
pub struct SqliteSendLog {
    db_pool: Pool<Sqlite>,
}

impl SqliteSendLog {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SendLogStore for SqliteSendLog {
    async fn append_attempt(&self, record: &SendAttemptRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO send_attempts (
                campaign_id, attempted_at, recipient, account_id,
                correlation_id, outcome, error_detail
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&record.campaign_id)
        .bind(record.timestamp.to_rfc3339())
        .bind(&record.recipient)
        .bind(&record.account_id)
        .bind(&record.correlation_id)
        .bind(record.outcome.as_str())
        .bind(&record.error)
        .execute(&self.db_pool)
        .await
        .context("Fallo al insertar en send_attempts")?;
        Ok(())
    }

    async fn append_correlation(&self, record: &CorrelationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO correlation_map (
                correlation_id, campaign_id, recipient, account_id, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.correlation_id)
        .bind(&record.campaign_id)
        .bind(&record.recipient)
        .bind(&record.account_id)
        .bind(record.timestamp.to_rfc3339())
        .execute(&self.db_pool)
        .await
        .context("Fallo al insertar en correlation_map")?;
        Ok(())
    }

    async fn list_attempts(&self, campaign_id: &str) -> Result<Vec<SendAttemptRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT campaign_id, attempted_at, recipient, account_id,
                   correlation_id, outcome, error_detail
            FROM send_attempts
            WHERE campaign_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.db_pool)
        .await
        .context("Fallo al leer send_attempts")?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let attempted_at: String = row.try_get("attempted_at")?;
            let outcome: String = row.try_get("outcome")?;
            result.push(SendAttemptRecord {
                timestamp: attempted_at.parse::<DateTime<Utc>>()?,
                campaign_id: row.try_get("campaign_id")?,
                recipient: row.try_get("recipient")?,
                account_id: row.try_get("account_id")?,
                correlation_id: row.try_get("correlation_id")?,
                outcome: AttemptOutcome::parse(&outcome)
                    .ok_or_else(|| anyhow!("Outcome desconocido en send_attempts: {}", outcome))?,
                error: row.try_get("error_detail")?,
            });
        }
        Ok(result)
    }
}
