#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for damage assessment projects.
//!
//! A thin HTTP mirror of [`AssessmentEngine`]: create and list projects,
//! start processing, poll status, fetch results, export damage locations
//! as `GeoJSON`, and reset failed projects. Errors are returned as
//! `{ "error": kind, "message": ... }`.

pub mod handlers;

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, error, middleware, web};
use damage_map_assessment::{AssessmentEngine, AssessmentError, EngineConfig};
use damage_map_assessment_models::ErrorKind;
use damage_map_server_models::ApiError;
use thiserror::Error;

/// Shared application state.
pub struct AppState {
    /// The engine owning every project.
    pub engine: AssessmentEngine,
}

/// Errors that can stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The engine could not be opened.
    #[error(transparent)]
    Engine(#[from] AssessmentError),

    /// Binding or serving failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// JSON body extractor config reporting malformed bodies as validation
/// errors.
#[must_use]
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let body = ApiError::new(ErrorKind::ValidationError, err.to_string());
        error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    })
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            .route("/health", web::get().to(handlers::health))
            .route("/projects", web::get().to(handlers::list_projects))
            .route("/projects", web::post().to(handlers::create_project))
            .route(
                "/projects/{id}/process",
                web::post().to(handlers::process_project),
            )
            .route("/projects/{id}/status", web::get().to(handlers::project_status))
            .route(
                "/projects/{id}/results",
                web::get().to(handlers::project_results),
            )
            .route(
                "/projects/{id}/damages.geojson",
                web::get().to(handlers::project_damages),
            )
            .route("/projects/{id}/reset", web::post().to(handlers::reset_project)),
    );
}

/// Serves the API for `engine` until shutdown.
///
/// Binds to `BIND_ADDR` (default `127.0.0.1`) and `PORT` (default
/// `8080`). The caller provides the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
pub async fn run_server(engine: AssessmentEngine) -> std::io::Result<()> {
    let state = web::Data::new(AppState { engine });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

/// Opens the file-backed engine described by `config` and serves it.
///
/// # Errors
///
/// Returns [`ServerError`] if stored projects cannot be loaded or the
/// server fails.
pub async fn serve(config: EngineConfig) -> Result<(), ServerError> {
    let engine = AssessmentEngine::from_config(config).await?;
    run_server(engine).await?;
    Ok(())
}
