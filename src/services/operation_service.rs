use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};
use uuid::Uuid;

use crate::models::operation_model::{
    CreateOperationRequest, ListOperationsResponse, OperationRecord, OperationStatusResponse,
    STATUS_PENDING,
};

#[derive(Clone, Debug)]
pub struct OperationService {
    db_pool: Pool<Sqlite>,
}

impl OperationService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        OperationService { db_pool }
    }

    /// Corre migraciones con sqlx (todas las tablas del servicio)
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Fallo al correr migraciones")?;
        Ok(())
    }

    /// Crea la operación en DB con estado "pending" y devuelve su id
    pub async fn create_operation(&self, req: CreateOperationRequest) -> Result<String> {
        let op_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO operations (
                id, operation_type, status, error_message,
                is_async, created_at, updated_at, metadata
            )
            VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?5, ?6)
            "#,
        )
        .bind(&op_id)
        .bind(&req.operation_type)
        .bind(STATUS_PENDING)
        .bind(req.is_async as i32)
        .bind(&now)
        .bind(&req.metadata)
        .execute(&self.db_pool)
        .await
        .context("Fallo al insertar operation")?;

        Ok(op_id)
    }

    /// Actualiza estado y error
    pub async fn update_operation_status(
        &self,
        op_id: &str,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE operations
            SET status = ?2,
                error_message = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(op_id)
        .bind(status)
        .bind(error_message)
        .bind(now)
        .execute(&self.db_pool)
        .await
        .context("Fallo al actualizar operación")?;

        Ok(())
    }

    /// Cierra la operación guardando el resumen en `metadata`
    pub async fn finish_operation(
        &self,
        op_id: &str,
        status: &str,
        error_message: Option<&str>,
        metadata: Option<String>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE operations
            SET status = ?2,
                error_message = ?3,
                updated_at = ?4,
                metadata = COALESCE(?5, metadata)
            WHERE id = ?1
            "#,
        )
        .bind(op_id)
        .bind(status)
        .bind(error_message)
        .bind(now)
        .bind(metadata)
        .execute(&self.db_pool)
        .await
        .context("Fallo al cerrar operación")?;

        Ok(())
    }

    /// Obtiene la info de una operación
    pub async fn get_operation(&self, op_id: &str) -> Result<OperationRecord> {
        let row = sqlx::query(
            r#"
            SELECT
                id, operation_type, status, error_message,
                is_async, created_at, updated_at, metadata
            FROM operations
            WHERE id = ?1
            "#,
        )
        .bind(op_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Fallo al consultar operación")?
        .with_context(|| format!("Operation not found: {}", op_id))?;

        let status = status_from_row(&row)?;
        Ok(OperationRecord {
            id: status.id,
            operation_type: status.operation_type,
            status: status.status,
            error_message: status.error_message,
            is_async: status.is_async,
            created_at: status.created_at.parse::<DateTime<Utc>>()?,
            updated_at: status.updated_at.parse::<DateTime<Utc>>()?,
            metadata: status.metadata,
        })
    }

    /// Lista operaciones con paginación
    pub async fn list_operations(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<ListOperationsResponse> {
        let page = page.max(1);
        let offset = (page - 1) * page_size;

        let total: i64 = sqlx::query("SELECT COUNT(*) AS cnt FROM operations")
            .fetch_one(&self.db_pool)
            .await?
            .try_get("cnt")?;

        let rows = sqlx::query(
            r#"
            SELECT
                id, operation_type, status, error_message,
                is_async, created_at, updated_at, metadata
            FROM operations
            ORDER BY created_at DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(page_size as i64)
        .bind(offset as i64)
        .fetch_all(&self.db_pool)
        .await?;

        let items = rows
            .iter()
            .map(status_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(ListOperationsResponse {
            total: total as u64,
            page,
            page_size,
            items,
        })
    }
}

fn status_from_row(row: &SqliteRow) -> Result<OperationStatusResponse> {
    let is_async: i64 = row.try_get("is_async")?;
    Ok(OperationStatusResponse {
        id: row.try_get("id")?,
        operation_type: row.try_get("operation_type")?,
        status: row.try_get("status")?,
        error_message: row.try_get("error_message")?,
        is_async: is_async != 0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        metadata: row.try_get("metadata")?,
    })
}
