#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the damage map server.
//!
//! Project views are shared with the engine; this crate adds the
//! envelope types only the HTTP layer needs.

use damage_map_assessment_models::{ErrorKind, ProjectStatus};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Always true while the server answers.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Error body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Stable machine-readable kind.
    pub error: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    /// Creates an error body.
    #[must_use]
    pub fn new(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

/// Response to a successful project creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProjectCreated {
    /// Id of the new project.
    pub project_id: String,
    /// Always `created`.
    pub status: ProjectStatus,
    /// What to do next.
    pub next_step: String,
}

impl ApiProjectCreated {
    /// Response for a freshly created project.
    #[must_use]
    pub fn new(project_id: String) -> Self {
        Self {
            project_id,
            status: ProjectStatus::Created,
            next_step: ProjectStatus::Created.next_step().to_string(),
        }
    }
}

/// Query parameters for the damages `GeoJSON` export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DamagesQueryParams {
    /// `centroid` (default) or `footprint`.
    pub geometry: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_uses_snake_case_kind() {
        let body = serde_json::to_value(ApiError::new(ErrorKind::NotFoundError, "gone")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "error": "not_found_error", "message": "gone" })
        );
    }

    #[test]
    fn created_response_is_camel_case() {
        let body = serde_json::to_value(ApiProjectCreated::new("p-1".to_string())).unwrap();
        assert_eq!(body["projectId"], "p-1");
        assert_eq!(body["status"], "created");
        assert!(body["nextStep"].as_str().unwrap().starts_with("Start processing"));
    }
}
