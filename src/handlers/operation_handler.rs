//! handlers/operation_handler.rs
//! Consulta de operaciones (cada campaña es una operación).
use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::services::operation_service::OperationService;

const MAX_PAGE_SIZE: u64 = 200;

#[derive(Deserialize)]
pub struct OperationsQuery {
    page: Option<u64>,
    page_size: Option<u64>,
}

/// GET /api/operations
pub async fn list_operations_endpoint(
    op_service: web::Data<OperationService>,
    query: web::Query<OperationsQuery>,
) -> HttpResponse {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(10).clamp(1, MAX_PAGE_SIZE);

    match op_service.list_operations(page, page_size).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => {
            log::error!("(list_operations_endpoint) {:#}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": format!("{:#}", e)
            }))
        }
    }
}

/// GET /api/operations/{id}
/// `metadata` se devuelve como JSON, no como string.
pub async fn get_operation_endpoint(
    op_service: web::Data<OperationService>,
    path: web::Path<String>,
) -> HttpResponse {
    let op_id = path.into_inner();

    match op_service.get_operation(&op_id).await {
        Ok(record) => {
            let metadata = record
                .metadata
                .as_deref()
                .and_then(|m| serde_json::from_str::<Value>(m).ok());
            HttpResponse::Ok().json(json!({
                "id": record.id,
                "operation_type": record.operation_type,
                "status": record.status,
                "error_message": record.error_message,
                "is_async": record.is_async,
                "created_at": record.created_at,
                "updated_at": record.updated_at,
                "metadata": metadata
            }))
        }
        Err(e) => {
            let status_code = if e.to_string().contains("not found") {
                StatusCode::NOT_FOUND
            } else {
                log::error!("(get_operation_endpoint) {}: {:#}", op_id, e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            HttpResponse::build(status_code).json(json!({
                "success": false,
                "error": format!("{:#}", e)
            }))
        }
    }
}
