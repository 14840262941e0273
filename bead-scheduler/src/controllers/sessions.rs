use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};

use crate::controllers::{error_response, scheduler_unavailable};
use crate::models::CreateSessionsRequest;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/sessions")
            .route("", web::get().to(list_sessions))
            .route("", web::post().to(create_sessions))
            .route("/{id}", web::get().to(get_session))
            .route("/{id}/log", web::get().to(get_session_log))
            .route("/{id}/cancel", web::post().to(cancel_session)),
    );
}

fn session_not_found(id: &str) -> HttpResponse {
    error_response(StatusCode::NOT_FOUND, "not_found", format!("session {} not found", id))
}

/// Create and enqueue one session per bead (or a single unlinked one)
async fn create_sessions(
    data: web::Data<AppState>,
    body: web::Json<CreateSessionsRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    if request.command.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "command must not be empty",
        );
    }

    match data.scheduler.submit(request).await {
        Ok(sessions) => HttpResponse::Created().json(sessions),
        Err(e) => scheduler_unavailable(e),
    }
}

async fn list_sessions(data: web::Data<AppState>) -> HttpResponse {
    match data.scheduler.list().await {
        Ok(sessions) => HttpResponse::Ok().json(sessions),
        Err(e) => scheduler_unavailable(e),
    }
}

async fn get_session(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    match data.scheduler.get(&id).await {
        Ok(Some(session)) => HttpResponse::Ok().json(session),
        Ok(None) => session_not_found(&id),
        Err(e) => scheduler_unavailable(e),
    }
}

/// Raw log contents; empty until the session has produced its log file
async fn get_session_log(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    let session = match data.scheduler.get(&id).await {
        Ok(Some(session)) => session,
        Ok(None) => return session_not_found(&id),
        Err(e) => return scheduler_unavailable(e),
    };

    let contents = match tokio::fs::read(&session.log_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            log::error!(
                "[SESSIONS] Failed to read log {}: {}",
                session.log_path.display(),
                e
            );
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "log_unavailable", e);
        }
    };

    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(contents)
}

async fn cancel_session(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    match data.scheduler.cancel(&id).await {
        Ok(Some(session)) => HttpResponse::Ok().json(session),
        Ok(None) => session_not_found(&id),
        Err(e) => scheduler_unavailable(e),
    }
}
