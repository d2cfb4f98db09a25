//! HTTP handler functions for the damage map API.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use damage_map_assessment::{AssessmentError, ExportGeometry, damage_features};
use damage_map_assessment_models::{CreateProjectRequest, ErrorKind};
use damage_map_server_models::{ApiError, ApiHealth, ApiProjectCreated, DamagesQueryParams};

use crate::AppState;

/// HTTP status for an error kind.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::NotFoundError => StatusCode::NOT_FOUND,
        ErrorKind::InvalidStateError => StatusCode::CONFLICT,
        ErrorKind::MissingBandError | ErrorKind::InsufficientDataError => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::ProcessingError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Converts an engine error into a JSON error response.
pub fn error_response(e: &AssessmentError) -> HttpResponse {
    let kind = e.kind();
    let status = status_for(kind);
    if status.is_server_error() {
        log::error!("Request failed: {e}");
    } else {
        log::debug!("Request rejected: {e}");
    }
    HttpResponse::build(status).json(ApiError::new(kind, e.to_string()))
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/projects`
pub async fn list_projects(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.engine.list().await)
}

/// `POST /api/projects`
pub async fn create_project(
    state: web::Data<AppState>,
    body: web::Json<CreateProjectRequest>,
) -> HttpResponse {
    match state.engine.create(body.into_inner()).await {
        Ok(id) => HttpResponse::Created().json(ApiProjectCreated::new(id)),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/projects/{id}/process`
///
/// `202 Accepted` when a run was started, `200 OK` when the project was
/// already past `created`.
pub async fn process_project(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.engine.start_processing(&path).await {
        Ok(outcome) if outcome.started => HttpResponse::Accepted().json(outcome),
        Ok(outcome) => HttpResponse::Ok().json(outcome),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/projects/{id}/status`
pub async fn project_status(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.engine.get_status(&path).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/projects/{id}/results`
pub async fn project_results(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.engine.get_results(&path).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/projects/{id}/damages.geojson`
///
/// Damaged elements as a `GeoJSON` feature collection.
pub async fn project_damages(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<DamagesQueryParams>,
) -> HttpResponse {
    let geometry = match params.geometry.as_deref().map(str::parse::<ExportGeometry>) {
        None => ExportGeometry::default(),
        Some(Ok(geometry)) => geometry,
        Some(Err(_)) => {
            return HttpResponse::BadRequest().json(ApiError::new(
                ErrorKind::ValidationError,
                "geometry must be `centroid` or `footprint`",
            ));
        }
    };

    match state.engine.get_result(&path).await {
        Ok(result) => HttpResponse::Ok()
            .content_type("application/geo+json")
            .json(damage_features(&result, geometry)),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/projects/{id}/reset`
pub async fn reset_project(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.engine.reset(&path).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => error_response(&e),
    }
}
