use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod config;
mod controllers;
mod execution;
mod gateway;
mod models;
mod tracker;

use config::Config;
use execution::{Scheduler, SchedulerConfig};
use gateway::EventBroadcaster;
use tracker::{ProvenanceLog, TrackerBridge};

pub struct AppState {
    pub scheduler: Scheduler,
    pub tracker: Arc<TrackerBridge>,
    pub broadcaster: Arc<EventBroadcaster>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    let bind_address = config.bind_address.clone();
    let port = config.port;

    log::info!("Session logs in {}", config.session_log_dir.display());
    std::fs::create_dir_all(&config.session_log_dir)?;

    log::info!("Provenance log at {}", config.provenance_path.display());
    if let Some(parent) = config.provenance_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match which::which(&config.tracker_bin) {
        Ok(path) => log::info!("Using tracker CLI at {}", path.display()),
        Err(_) => log::warn!(
            "Tracker CLI '{}' not found, /beads requests will fail until it is installed",
            config.tracker_bin
        ),
    }

    let broadcaster = Arc::new(EventBroadcaster::new());

    log::info!("Initializing scheduler");
    let scheduler = Scheduler::start(
        SchedulerConfig {
            max_parallel: config.max_parallel_sessions,
            workdir_root: config.workdir_root.clone(),
            log_dir: config.session_log_dir.clone(),
        },
        broadcaster.clone(),
    );

    let provenance = Arc::new(ProvenanceLog::new(config.provenance_path.clone()));
    let tracker = Arc::new(TrackerBridge::new(
        config.tracker_bin.clone(),
        config.workdir_root.clone(),
        provenance,
        broadcaster.clone(),
    ));

    log::info!("Starting bead scheduler on {}:{}", bind_address, port);

    let state = web::Data::new(AppState {
        scheduler,
        tracker,
        broadcaster,
    });

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::config)
            .default_service(web::to(controllers::not_found))
    })
    .bind((bind_address.as_str(), port))?
    .run()
    .await
}
