use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::{
    models::campaign_model::StartCampaignRequest,
    services::campaign_service::{CampaignInputError, CampaignService, ControlAction},
};

/// POST /api/campaigns
pub async fn start_campaign_endpoint(
    campaign_service: web::Data<CampaignService>,
    body: web::Json<StartCampaignRequest>,
) -> HttpResponse {
    match campaign_service.start_campaign(body.into_inner()).await {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(e) => {
            if let Some(input_error) = e.downcast_ref::<CampaignInputError>() {
                return HttpResponse::BadRequest().json(json!({
                    "success": false,
                    "error": input_error.to_string()
                }));
            }

            log::error!("Campaign error: {:#}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": format!("{:#}", e)
            }))
        }
    }
}

/// GET /api/campaigns/{op_id}
pub async fn campaign_status_endpoint(
    campaign_service: web::Data<CampaignService>,
    path: web::Path<String>,
) -> HttpResponse {
    let op_id = path.into_inner();

    match campaign_service.campaign_status(&op_id).await {
        Ok(status) => HttpResponse::Ok().json(json!({
            "success": true,
            "status": status
        })),
        Err(e) => {
            let status_code = if e.to_string().contains("not found") {
                actix_web::http::StatusCode::NOT_FOUND
            } else {
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
            };

            HttpResponse::build(status_code).json(json!({
                "success": false,
                "error": e.to_string()
            }))
        }
    }
}

/// GET /api/campaigns/{op_id}/attempts
pub async fn list_attempts_endpoint(
    campaign_service: web::Data<CampaignService>,
    path: web::Path<String>,
) -> HttpResponse {
    let op_id = path.into_inner();

    match campaign_service.list_attempts(&op_id).await {
        Ok(attempts) => HttpResponse::Ok().json(json!({
            "success": true,
            "total": attempts.len(),
            "attempts": attempts
        })),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": format!("{:#}", e)
        })),
    }
}

/// POST /api/campaigns/{op_id}/pause
pub async fn pause_campaign_endpoint(
    campaign_service: web::Data<CampaignService>,
    path: web::Path<String>,
) -> HttpResponse {
    control_response(&campaign_service, &path.into_inner(), ControlAction::Pause)
}

/// POST /api/campaigns/{op_id}/resume
pub async fn resume_campaign_endpoint(
    campaign_service: web::Data<CampaignService>,
    path: web::Path<String>,
) -> HttpResponse {
    control_response(&campaign_service, &path.into_inner(), ControlAction::Resume)
}

/// POST /api/campaigns/{op_id}/stop
pub async fn stop_campaign_endpoint(
    campaign_service: web::Data<CampaignService>,
    path: web::Path<String>,
) -> HttpResponse {
    control_response(&campaign_service, &path.into_inner(), ControlAction::Stop)
}

fn control_response(service: &CampaignService, op_id: &str, action: ControlAction) -> HttpResponse {
    match service.control(op_id, action) {
        Ok(Some(state)) => HttpResponse::Ok().json(json!({
            "success": true,
            "operation_id": op_id,
            "control": state
        })),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "error": format!("Campaign {} is not running", op_id)
        })),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": e.to_string()
        })),
    }
}

/// GET /api/counters/{account_id}
pub async fn account_counter_endpoint(
    campaign_service: web::Data<CampaignService>,
    path: web::Path<String>,
) -> HttpResponse {
    let account_id = path.into_inner();

    match campaign_service.sent_today(&account_id).await {
        Ok(count) => HttpResponse::Ok().json(json!({
            "account_id": account_id,
            "sent_today": count
        })),
        Err(e) => {
            log::error!("Counter store error for {}: {:#}", account_id, e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Counter store unavailable",
                "details": format!("{:#}", e)
            }))
        }
    }
}
