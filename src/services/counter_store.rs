//! services/counter_store.rs
//! Contador diario de envíos por cuenta.
//!
//! "Hoy" es la fecha local del host. Un registro con otra fecha cuenta como
//! cero y se reinicia en el próximo `increment`. Si el almacenamiento no se
//! puede leer o está corrupto se devuelve error, nunca cero.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use sqlx::{Pool, Row, Sqlite};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub type TodayFn = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

#[async_trait]
pub trait DailyCounterStore: Send + Sync {
    /// Envíos de hoy para la cuenta (0 si no hay registro o es de otro día).
    async fn get(&self, account_id: &str) -> Result<u32>;

    /// Suma `delta` al contador de hoy y devuelve el nuevo valor.
    async fn increment(&self, account_id: &str, delta: u32) -> Result<u32>;
}

// ============================================================
// SQLite
// ============================================================

#[derive(Clone)]
pub struct SqliteCounterStore {
    db_pool: Pool<Sqlite>,
    today: TodayFn,
}

impl SqliteCounterStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        Self::with_today(db_pool, Arc::new(local_today))
    }

    pub fn with_today(db_pool: Pool<Sqlite>, today: TodayFn) -> Self {
        Self { db_pool, today }
    }

    fn parse_date(account_id: &str, raw: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(raw, DATE_FORMAT).with_context(|| {
            format!(
                "Contador corrupto para '{}': fecha '{}' ilegible",
                account_id, raw
            )
        })
    }

    fn count_from(account_id: &str, raw: i64) -> Result<u32> {
        u32::try_from(raw).map_err(|_| {
            anyhow!(
                "Contador corrupto para '{}': valor fuera de rango ({})",
                account_id,
                raw
            )
        })
    }
}

#[async_trait]
impl DailyCounterStore for SqliteCounterStore {
    async fn get(&self, account_id: &str) -> Result<u32> {
        let row = sqlx::query(
            r#"SELECT counter_date, count FROM daily_counters WHERE account_id = ?1"#,
        )
        .bind(account_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("No se pudo leer daily_counters")?;

        let Some(row) = row else {
            return Ok(0);
        };

        let stored_date: String = row.try_get("counter_date")?;
        let count: i64 = row.try_get("count")?;
        let date = Self::parse_date(account_id, &stored_date)?;
        let count = Self::count_from(account_id, count)?;

        if date == (self.today)() {
            Ok(count)
        } else {
            Ok(0)
        }
    }

    async fn increment(&self, account_id: &str, delta: u32) -> Result<u32> {
        let today = (self.today)();
        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("No se pudo abrir transacción de contadores")?;

        let row = sqlx::query(
            r#"SELECT counter_date, count FROM daily_counters WHERE account_id = ?1"#,
        )
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .context("No se pudo leer daily_counters")?;

        let current = match row {
            Some(row) => {
                let stored_date: String = row.try_get("counter_date")?;
                let count: i64 = row.try_get("count")?;
                if Self::parse_date(account_id, &stored_date)? == today {
                    Self::count_from(account_id, count)?
                } else {
                    0
                }
            }
            None => 0,
        };

        let updated = current
            .checked_add(delta)
            .ok_or_else(|| anyhow!("Overflow en contador de '{}'", account_id))?;

        sqlx::query(
            r#"
            INSERT INTO daily_counters (account_id, counter_date, count)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(account_id) DO UPDATE
            SET counter_date = excluded.counter_date,
                count = excluded.count
            "#,
        )
        .bind(account_id)
        .bind(today.format(DATE_FORMAT).to_string())
        .bind(updated as i64)
        .execute(&mut *tx)
        .await
        .context("No se pudo escribir daily_counters")?;

        tx.commit()
            .await
            .context("No se pudo confirmar el contador")?;

        Ok(updated)
    }
}
