//! app.rs
use crate::handlers::{campaign_handler, operation_handler};
use actix_web::web;

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/campaigns")
                    .route("", web::post().to(campaign_handler::start_campaign_endpoint))
                    .route(
                        "/{op_id}",
                        web::get().to(campaign_handler::campaign_status_endpoint),
                    )
                    .route(
                        "/{op_id}/attempts",
                        web::get().to(campaign_handler::list_attempts_endpoint),
                    )
                    .route(
                        "/{op_id}/pause",
                        web::post().to(campaign_handler::pause_campaign_endpoint),
                    )
                    .route(
                        "/{op_id}/resume",
                        web::post().to(campaign_handler::resume_campaign_endpoint),
                    )
                    .route(
                        "/{op_id}/stop",
                        web::post().to(campaign_handler::stop_campaign_endpoint),
                    ),
            )
            .service(
                web::scope("/counters").route(
                    "/{account_id}",
                    web::get().to(campaign_handler::account_counter_endpoint),
                ),
            )
            .service(
                web::scope("/operations")
                    .route(
                        "",
                        web::get().to(operation_handler::list_operations_endpoint),
                    )
                    .route(
                        "/{id}",
                        web::get().to(operation_handler::get_operation_endpoint),
                    ),
            ),
    );
}
