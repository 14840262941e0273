pub mod beads;
pub mod health;
pub mod provenance;
pub mod sessions;


use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use std::fmt::Display;

use crate::execution::SchedulerError;
use crate::gateway::actix_ws::ws_handler;
use crate::tracker::TrackerError;

/// Every route the service exposes, plus the body and query error handlers
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .route("/events", web::get().to(ws_handler));
    health::config(cfg);
    beads::config(cfg);
    sessions::config(cfg);
    provenance::config(cfg);
}

/// `{error, detail}` body with the given status
pub(crate) fn error_response(
    status: StatusCode,
    error: &str,
    detail: impl Display,
) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "error": error,
        "detail": detail.to_string()
    }))
}

pub(crate) fn scheduler_unavailable(e: SchedulerError) -> HttpResponse {
    log::error!("[SCHEDULER] Request rejected: {}", e);
    HttpResponse::ServiceUnavailable().json(serde_json::json!({
        "error": "scheduler_unavailable"
    }))
}

pub(crate) fn tracker_failed(e: TrackerError) -> HttpResponse {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "tracker_failed", e)
}

/// Rejects malformed JSON bodies with 400 before they reach a handler
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = error_response(StatusCode::BAD_REQUEST, "invalid_json", &err);
    InternalError::from_response(err, response).into()
}

/// Rejects query strings that do not deserialize
fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = error_response(StatusCode::BAD_REQUEST, "invalid_request", &err);
    InternalError::from_response(err, response).into()
}

/// Fallback for unmatched routes
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "error": "not_found"
    }))
}
