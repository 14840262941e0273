use actix_web::{web, HttpResponse, Responder};

use crate::controllers::scheduler_unavailable;
use crate::AppState;

/// Version from Cargo.toml, available at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)));
    cfg.service(web::resource("/version").route(web::get().to(get_version)));
}

async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    let stats = match data.scheduler.stats().await {
        Ok(stats) => stats,
        Err(e) => return scheduler_unavailable(e),
    };

    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": VERSION,
        "runningSessions": stats.running_sessions,
        "queuedSessions": stats.queued_sessions,
        "totalSessions": stats.total_sessions,
        "maxParallel": stats.max_parallel,
        "observers": data.broadcaster.client_count()
    }))
}

async fn get_version() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "version": VERSION
    }))
}
