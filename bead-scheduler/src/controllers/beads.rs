//! Work-item endpoints backed by the tracker CLI

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::controllers::{error_response, tracker_failed};
use crate::models::TrackerMutationRequest;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub ready: bool,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/beads")
            .route("", web::get().to(list_beads))
            .route("/{id}/claim", web::post().to(claim_bead))
            .route("/{id}/close", web::post().to(close_bead)),
    );
}

async fn list_beads(data: web::Data<AppState>, query: web::Query<ListQuery>) -> HttpResponse {
    match data.tracker.list(query.ready).await {
        Ok(items) => HttpResponse::Ok().json(items),
        Err(e) => tracker_failed(e),
    }
}

async fn claim_bead(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    let request = match parse_mutation(&body) {
        Ok(request) => request,
        Err(resp) => return resp,
    };

    match data.tracker.claim(&path.into_inner(), request).await {
        Ok(transition) => HttpResponse::Ok().json(transition),
        Err(e) => tracker_failed(e),
    }
}

async fn close_bead(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    let request = match parse_mutation(&body) {
        Ok(request) => request,
        Err(resp) => return resp,
    };

    match data.tracker.close(&path.into_inner(), request).await {
        Ok(transition) => HttpResponse::Ok().json(transition),
        Err(e) => tracker_failed(e),
    }
}

/// The body is optional; an empty one means no actor and no session
fn parse_mutation(body: &[u8]) -> Result<TrackerMutationRequest, HttpResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(TrackerMutationRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, "invalid_json", e))
}
