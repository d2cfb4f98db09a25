//! Engine error type.

use damage_map_assessment_models::{ErrorKind, FailureReason, ProjectStatus, ValidationError};
use damage_map_detection::DetectionError;
use damage_map_raster::RasterError;
use damage_map_raster_models::{Band, Snapshot};
use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by [`crate::AssessmentEngine`] and the pipeline.
#[derive(Debug, Error)]
pub enum AssessmentError {
    /// The request is malformed.
    #[error("Invalid {}: {}", .0.field, .0.message)]
    Validation(#[from] ValidationError),

    /// No project has the given id.
    #[error("Project {0} not found")]
    NotFound(String),

    /// The operation is not allowed in the project's current state.
    #[error("Project {id} is {status}: {message}")]
    InvalidState {
        /// Project id.
        id: String,
        /// Current status.
        status: ProjectStatus,
        /// What was attempted.
        message: String,
    },

    /// A band needed by a spectral index is absent.
    #[error("Missing band {band} in {snapshot} snapshot")]
    MissingBand {
        /// The absent band.
        band: Band,
        /// Which snapshot lacked it.
        snapshot: Snapshot,
    },

    /// Too few valid pixels to assess the scene.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Any other pipeline failure.
    #[error("Processing failed: {0}")]
    Processing(String),

    /// Project persistence failed; the store error is logged, not shown.
    #[error("Project state could not be persisted")]
    Storage(#[source] StoreError),
}

impl AssessmentError {
    /// Stable machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::NotFound(_) => ErrorKind::NotFoundError,
            Self::InvalidState { .. } => ErrorKind::InvalidStateError,
            Self::MissingBand { .. } => ErrorKind::MissingBandError,
            Self::InsufficientData(_) => ErrorKind::InsufficientDataError,
            Self::Processing(_) | Self::Storage(_) => ErrorKind::ProcessingError,
        }
    }

    /// Failure record stored on a failed project.
    #[must_use]
    pub fn to_failure(&self) -> FailureReason {
        FailureReason {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<StoreError> for AssessmentError {
    fn from(e: StoreError) -> Self {
        log::error!("Project store failed: {e}");
        Self::Storage(e)
    }
}

impl From<RasterError> for AssessmentError {
    fn from(e: RasterError) -> Self {
        match e {
            RasterError::MissingBand { band, snapshot } => Self::MissingBand { band, snapshot },
            RasterError::InsufficientData { .. } => Self::InsufficientData(e.to_string()),
            RasterError::Io { .. } => {
                log::error!("Scene read failed: {e}");
                Self::Processing("scene data could not be read".to_string())
            }
            other => Self::Processing(other.to_string()),
        }
    }
}

impl From<DetectionError> for AssessmentError {
    fn from(e: DetectionError) -> Self {
        match e {
            DetectionError::MissingBand(band) => Self::MissingBand {
                band,
                snapshot: Snapshot::After,
            },
            other => Self::Processing(other.to_string()),
        }
    }
}
