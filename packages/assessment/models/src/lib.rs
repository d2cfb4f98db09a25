#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Assessment project types.
//!
//! A [`Project`] moves through `created -> processing -> completed |
//! failed`. It owns its [`AssessmentResult`] once completed and a
//! [`FailureReason`] once failed; the views in this crate are what callers
//! see of it.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use damage_map_damage_models::{
    AssessmentResult, DamageCategory, GeoPoint, InfrastructureType, SectorStatistic,
    SeverityLevel,
};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Kind of disaster being assessed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DisasterType {
    /// Ground shaking.
    Earthquake,
    /// Riverine or coastal flooding.
    Flood,
    /// Tropical cyclone.
    Hurricane,
    /// Vegetation fire.
    Wildfire,
    /// Tornado.
    Tornado,
    /// Tsunami inundation.
    Tsunami,
    /// Landslide or mudslide.
    Landslide,
    /// Anything else.
    Other,
}

impl DisasterType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Earthquake,
            Self::Flood,
            Self::Hurricane,
            Self::Wildfire,
            Self::Tornado,
            Self::Tsunami,
            Self::Landslide,
            Self::Other,
        ]
    }
}

/// Lifecycle state of a project.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectStatus {
    /// Created, not yet started.
    Created,
    /// Pipeline running.
    Processing,
    /// Result available.
    Completed,
    /// Pipeline aborted.
    Failed,
}

impl ProjectStatus {
    /// Whether no further processing transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Hint for what a caller should do next.
    #[must_use]
    pub const fn next_step(self) -> &'static str {
        match self {
            Self::Created => "Start processing to run the damage assessment",
            Self::Processing => "Poll the project status until processing finishes",
            Self::Completed => "Retrieve the results or export the damage locations",
            Self::Failed => "Review the failure, then reset the project to try again",
        }
    }
}

/// Pipeline stage of a processing project.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipelineStage {
    /// Loading bands and deriving spectral indices.
    CalculatingIndices,
    /// Running the infrastructure detector.
    DetectingInfrastructure,
    /// Classifying damage per element.
    ClassifyingDamage,
    /// Reducing events into sector statistics.
    AggregatingSectors,
}

impl PipelineStage {
    /// Returns all variants of this enum, in execution order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::CalculatingIndices,
            Self::DetectingInfrastructure,
            Self::ClassifyingDamage,
            Self::AggregatingSectors,
        ]
    }

    /// Human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::CalculatingIndices => "calculating indices",
            Self::DetectingInfrastructure => "detecting infrastructure",
            Self::ClassifyingDamage => "classifying damage",
            Self::AggregatingSectors => "aggregating sectors",
        }
    }

    /// Zero-based position in the pipeline.
    #[must_use]
    pub const fn position(self) -> usize {
        self as usize
    }
}

/// Stable machine-readable error kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request.
    ValidationError,
    /// Unknown project.
    NotFoundError,
    /// Operation not allowed in the current state.
    InvalidStateError,
    /// A required spectral band is absent.
    MissingBandError,
    /// Too few valid pixels.
    InsufficientDataError,
    /// Any other processing failure.
    ProcessingError,
}

/// Why a project failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Error kind.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in [-90, 90].
    pub latitude: f64,
    /// Longitude in [-180, 180].
    pub longitude: f64,
}

impl Coordinates {
    /// Whether both values are finite and in range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Input to project creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    /// Project name.
    pub name: String,
    /// Location label (e.g. city, region).
    pub location: String,
    /// One of the [`DisasterType`] names.
    pub disaster_type: String,
    /// Centroid latitude.
    pub latitude: f64,
    /// Centroid longitude.
    pub longitude: f64,
    /// Acquisition date of the pre-event imagery.
    #[serde(default)]
    pub before_date: Option<NaiveDate>,
    /// Acquisition date of the post-event imagery.
    #[serde(default)]
    pub after_date: Option<NaiveDate>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A rejected creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Offending field (camelCase, as in the request).
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl CreateProjectRequest {
    /// Checks the request and parses its disaster type.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<DisasterType, ValidationError> {
        let invalid = |field, message: String| ValidationError { field, message };

        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be blank".to_string()));
        }
        if self.location.trim().is_empty() {
            return Err(invalid("location", "must not be blank".to_string()));
        }
        let disaster_type = self
            .disaster_type
            .trim()
            .parse::<DisasterType>()
            .map_err(|_| {
                invalid(
                    "disasterType",
                    format!(
                        "unknown disaster type {:?}, expected one of {}",
                        self.disaster_type,
                        DisasterType::all()
                            .iter()
                            .map(AsRef::as_ref)
                            .collect::<Vec<&str>>()
                            .join(", ")
                    ),
                )
            })?;
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(invalid(
                "latitude",
                format!("{} is outside [-90, 90]", self.latitude),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(invalid(
                "longitude",
                format!("{} is outside [-180, 180]", self.longitude),
            ));
        }
        if let (Some(before), Some(after)) = (self.before_date, self.after_date)
            && before > after
        {
            return Err(invalid(
                "beforeDate",
                format!("{before} is after the post-event date {after}"),
            ));
        }

        Ok(disaster_type)
    }
}

/// An assessment project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Opaque id.
    pub id: String,
    /// Project name.
    pub name: String,
    /// Location label.
    pub location: String,
    /// Disaster being assessed.
    pub disaster_type: DisasterType,
    /// Area centroid.
    pub centroid: Coordinates,
    /// Pre-event imagery date.
    pub before_date: Option<NaiveDate>,
    /// Post-event imagery date.
    pub after_date: Option<NaiveDate>,
    /// Free-text description.
    pub description: Option<String>,
    /// Lifecycle state.
    pub status: ProjectStatus,
    /// Current stage while processing.
    pub stage: Option<PipelineStage>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time processing started.
    pub processing_started_at: Option<DateTime<Utc>>,
    /// Time processing completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Time processing failed.
    pub failed_at: Option<DateTime<Utc>>,
    /// Set iff `status` is failed.
    pub failure: Option<FailureReason>,
    /// Set iff `status` is completed.
    pub result: Option<AssessmentResult>,
}

impl Project {
    /// Creates a project in the `created` state from a validated request.
    #[must_use]
    pub fn new(
        id: String,
        request: CreateProjectRequest,
        disaster_type: DisasterType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: request.name.trim().to_string(),
            location: request.location.trim().to_string(),
            disaster_type,
            centroid: Coordinates {
                latitude: request.latitude,
                longitude: request.longitude,
            },
            before_date: request.before_date,
            after_date: request.after_date,
            description: request.description,
            status: ProjectStatus::Created,
            stage: None,
            created_at: now,
            processing_started_at: None,
            completed_at: None,
            failed_at: None,
            failure: None,
            result: None,
        }
    }

    /// Whether the result/failure fields agree with the status.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        let completed = matches!(self.status, ProjectStatus::Completed);
        let failed = matches!(self.status, ProjectStatus::Failed);
        self.result.is_some() == completed && self.failure.is_some() == failed
    }
}

/// Outcome of a start-processing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    /// The project.
    pub project_id: String,
    /// Status after the request.
    pub status: ProjectStatus,
    /// Whether this request started a run.
    pub started: bool,
}

/// What a status poll returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatusView {
    /// The project.
    pub project_id: String,
    /// Project name.
    pub name: String,
    /// Lifecycle state.
    pub status: ProjectStatus,
    /// Current stage while processing.
    pub stage: Option<PipelineStage>,
    /// Human-readable stage description.
    pub stage_description: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time processing started.
    pub processing_started_at: Option<DateTime<Utc>>,
    /// Time processing completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Time processing failed.
    pub failed_at: Option<DateTime<Utc>>,
    /// Why the project failed.
    pub failure: Option<FailureReason>,
    /// Hint for the caller.
    pub next_step: String,
}

impl From<&Project> for ProjectStatusView {
    fn from(project: &Project) -> Self {
        Self {
            project_id: project.id.clone(),
            name: project.name.clone(),
            status: project.status,
            stage: project.stage,
            stage_description: project.stage.map(|s| s.description().to_string()),
            created_at: project.created_at,
            processing_started_at: project.processing_started_at,
            completed_at: project.completed_at,
            failed_at: project.failed_at,
            failure: project.failure.clone(),
            next_step: project.status.next_step().to_string(),
        }
    }
}

/// A damage location for map display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageLocation {
    /// Damaged element.
    pub element_id: String,
    /// Its type.
    pub infrastructure_type: InfrastructureType,
    /// Kind of damage.
    pub category: DamageCategory,
    /// Severity bucket.
    pub severity: SeverityLevel,
    /// Element centroid.
    pub position: GeoPoint,
}

/// Headline figures of a completed assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    /// Elements detected.
    pub total_elements: u64,
    /// Elements with a damage event.
    pub damaged_elements: u64,
    /// Elements without damage.
    pub undamaged_elements: u64,
    /// Elements that could not be classified.
    pub unclassifiable_elements: u64,
    /// Damaged elements per severity.
    pub severity_distribution: BTreeMap<SeverityLevel, u64>,
    /// Detected elements per type.
    pub infrastructure_by_type: BTreeMap<InfrastructureType, u64>,
    /// Damaged elements per category.
    pub damage_by_category: BTreeMap<DamageCategory, u64>,
    /// Centroids of damaged elements.
    pub damage_locations: Vec<DamageLocation>,
}

impl From<&AssessmentResult> for ResultSummary {
    fn from(result: &AssessmentResult) -> Self {
        Self {
            total_elements: result.total_elements,
            damaged_elements: result.damaged_elements,
            undamaged_elements: result.undamaged_elements,
            unclassifiable_elements: result.unclassifiable_elements,
            severity_distribution: result.severity_distribution.clone(),
            infrastructure_by_type: result.infrastructure_by_type.clone(),
            damage_by_category: result.damage_by_category.clone(),
            damage_locations: result
                .records
                .iter()
                .map(|r| DamageLocation {
                    element_id: r.element.id.clone(),
                    infrastructure_type: r.element.infrastructure_type,
                    category: r.event.category,
                    severity: r.event.severity,
                    position: r.element.footprint.centroid,
                })
                .collect(),
        }
    }
}

/// What a results request returns.
///
/// `summary` and `sector_analysis` are present only once the project has
/// completed; before that `pending` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsView {
    /// The project.
    pub project_id: String,
    /// Lifecycle state.
    pub status: ProjectStatus,
    /// Whether results are not available yet.
    pub pending: bool,
    /// Headline figures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ResultSummary>,
    /// Per-sector statistics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_analysis: Option<Vec<SectorStatistic>>,
    /// Why the project failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    /// Hint for the caller.
    pub next_step: String,
}

impl From<&Project> for ResultsView {
    fn from(project: &Project) -> Self {
        let completed = match (&project.status, &project.result) {
            (ProjectStatus::Completed, Some(result)) => Some(result),
            _ => None,
        };
        Self {
            project_id: project.id.clone(),
            status: project.status,
            pending: completed.is_none(),
            summary: completed.map(ResultSummary::from),
            sector_analysis: completed.map(|r| r.sectors.clone()),
            failure: project.failure.clone(),
            next_step: project.status.next_step().to_string(),
        }
    }
}

/// List entry for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    /// The project.
    pub id: String,
    /// Project name.
    pub name: String,
    /// Location label.
    pub location: String,
    /// Disaster being assessed.
    pub disaster_type: DisasterType,
    /// Lifecycle state.
    pub status: ProjectStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<&Project> for ProjectSummary {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            location: project.location.clone(),
            disaster_type: project.disaster_type,
            status: project.status,
            created_at: project.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateProjectRequest {
        CreateProjectRequest {
            name: "Derna floods".to_string(),
            location: "Derna, Libya".to_string(),
            disaster_type: "flood".to_string(),
            latitude: 32.76,
            longitude: 22.64,
            before_date: NaiveDate::from_ymd_opt(2023, 9, 1),
            after_date: NaiveDate::from_ymd_opt(2023, 9, 13),
            description: None,
        }
    }

    #[test]
    fn valid_request_parses_disaster_type() {
        assert_eq!(request().validate(), Ok(DisasterType::Flood));
        let mut upper = request();
        upper.disaster_type = "Wildfire".to_string();
        assert_eq!(upper.validate(), Ok(DisasterType::Wildfire));
    }

    #[test]
    fn invalid_requests_name_the_field() {
        let cases: Vec<(fn(&mut CreateProjectRequest), &str)> = vec![
            (|r| r.name = "  ".to_string(), "name"),
            (|r| r.location = String::new(), "location"),
            (|r| r.disaster_type = "meteor".to_string(), "disasterType"),
            (|r| r.latitude = 91.0, "latitude"),
            (|r| r.latitude = f64::NAN, "latitude"),
            (|r| r.longitude = -180.5, "longitude"),
            (
                |r| r.before_date = NaiveDate::from_ymd_opt(2023, 10, 1),
                "beforeDate",
            ),
        ];
        for (mutate, field) in cases {
            let mut r = request();
            mutate(&mut r);
            assert_eq!(r.validate().unwrap_err().field, field);
        }
    }

    #[test]
    fn new_project_is_created_and_consistent() {
        let project = Project::new("p1".to_string(), request(), DisasterType::Flood, Utc::now());
        assert_eq!(project.status, ProjectStatus::Created);
        assert!(project.is_consistent());

        let view = ResultsView::from(&project);
        assert!(view.pending);
        assert!(view.summary.is_none());
        assert!(view.sector_analysis.is_none());
    }

    #[test]
    fn status_view_describes_stage() {
        let mut project =
            Project::new("p1".to_string(), request(), DisasterType::Flood, Utc::now());
        project.status = ProjectStatus::Processing;
        project.stage = Some(PipelineStage::ClassifyingDamage);
        let view = ProjectStatusView::from(&project);
        assert_eq!(view.stage_description.as_deref(), Some("classifying damage"));
        assert_eq!(view.next_step, ProjectStatus::Processing.next_step());
    }

    #[test]
    fn error_kinds_serialize_snake_case() {
        assert_eq!(ErrorKind::InsufficientDataError.to_string(), "insufficient_data_error");
        assert_eq!(
            serde_json::to_string(&ErrorKind::NotFoundError).unwrap(),
            "\"not_found_error\""
        );
    }
}
