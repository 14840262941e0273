use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};

use crate::controllers::error_response;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/provenance").route(web::get().to(list_provenance)));
}

/// Every recorded tracker mutation, oldest first
async fn list_provenance(data: web::Data<AppState>) -> HttpResponse {
    match data.tracker.provenance().read_all().await {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => {
            log::error!("[PROVENANCE] Failed to read provenance log: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "provenance_unavailable", e)
        }
    }
}
