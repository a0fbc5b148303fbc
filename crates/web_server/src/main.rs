//! Main entry point for the Campsite Atlas backend server.
//! This crate wires the candidate ingestion pipeline to the admin REST API.

use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, middleware::Logger, web};
use candidate_ingest::{
    CandidateStore, PgCampsiteDirectory, PgCandidateStore, PgSyncLock, PlaceDirectoryClient,
    ReviewService, SyncOrchestrator,
};
use postgres::database::{create_connection_pool, test_connection};
use web_handlers::*;

mod sync_manager;
use sync_manager::SyncManager;

async fn api_hello() -> actix_web::Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Campsite Atlas admin API",
        "status": "running"
    })))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("Starting Campsite Atlas server...");

    // Create database connection pool
    let pool = match create_connection_pool().await {
        Ok(pool) => {
            log::info!("Database pool created successfully");

            if let Err(e) = test_connection(&pool).await {
                log::error!("Database connection test failed: {}", e);
            }
            pool
        }
        Err(e) => {
            log::error!("Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    // Create the place-directory client
    let directory_url = std::env::var("PLACE_DIRECTORY_URL")
        .unwrap_or_else(|_| "https://places.example.com/api/v1".to_string());
    let directory_api_key = std::env::var("PLACE_DIRECTORY_API_KEY").ok();
    let place_client = match PlaceDirectoryClient::new(directory_url, directory_api_key) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("Failed to create place-directory client: {}", e);
            std::process::exit(1);
        }
    };

    // Wire the ingestion pipeline
    let store: Arc<dyn CandidateStore> = Arc::new(PgCandidateStore::new(pool.clone()));
    let directory = Arc::new(PgCampsiteDirectory::new(pool.clone()));
    let review_service = web::Data::new(ReviewService::new(store.clone(), directory.clone()));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        store.clone(),
        place_client,
        directory,
        Arc::new(PgSyncLock::new(pool.clone())),
    ));

    // Optional periodic sync, in minutes; 0 or unset means manual only
    let sync_interval_minutes = std::env::var("SYNC_INTERVAL_MINUTES")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let mut sync_manager = SyncManager::new(orchestrator.clone());
    if sync_interval_minutes > 0 {
        sync_manager.start(sync_interval_minutes);
    }

    let store_data = web::Data::from(store);
    let orchestrator_data = web::Data::from(orchestrator);

    log::info!("Server will be available at: http://0.0.0.0:8080");

    let result = HttpServer::new(move || {
        App::new()
            .app_data(store_data.clone())
            .app_data(review_service.clone())
            .app_data(orchestrator_data.clone())
            .wrap(Logger::default())
            .service(
                web::scope("/api")
                    .route("/hello", web::get().to(api_hello))
                    .service(
                        web::scope("/candidates")
                            .route("", web::get().to(list_candidates))
                            .route("/bulk", web::post().to(bulk_candidates))
                            .route("/{candidate_id}", web::get().to(get_candidate))
                            .route("/{candidate_id}/approve", web::post().to(approve_candidate))
                            .route("/{candidate_id}/reject", web::post().to(reject_candidate)),
                    )
                    .route("/sync/run", web::post().to(run_sync)),
            )
            .route(
                "/health",
                web::get().to(|| async { HttpResponse::Ok().body("OK") }),
            )
    })
    .bind("0.0.0.0:8080")?
    .run()
    .await;

    sync_manager.stop().await;
    result
}
