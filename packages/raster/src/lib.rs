#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Band store and spectral index calculation.
//!
//! The [`store`] module supplies co-registered before/after scenes keyed
//! by project id. The [`indices`] module turns a scene into NDVI, NDBI,
//! MNDWI, and NBR layers plus their before-to-after deltas, and the
//! [`mask`] module decides which pixels carry usable samples.

pub mod indices;
pub mod mask;
pub mod store;

use damage_map_raster_models::{Band, SceneError, Snapshot};
use thiserror::Error;

pub use indices::{IndexLayer, IndexStack, SpectralIndex, compute_indices};
pub use mask::MaskConfig;
pub use store::{
    BandStore, FileBandStore, InMemoryBandStore, SceneFormat, read_scene_file, write_scene_file,
};

/// Errors that can occur while loading scenes or deriving indices.
#[derive(Debug, Error)]
pub enum RasterError {
    /// A band required by a spectral index is absent from a snapshot.
    #[error("Missing band {band} in {snapshot} snapshot")]
    MissingBand {
        /// The absent band.
        band: Band,
        /// Which snapshot lacked it.
        snapshot: Snapshot,
    },

    /// Too few pixels carry valid samples in both snapshots.
    #[error("Only {valid_percent:.1}% of pixels are valid, at least {required_percent:.1}% required")]
    InsufficientData {
        /// Share of valid pixels, in percent.
        valid_percent: f64,
        /// Configured minimum share, in percent.
        required_percent: f64,
    },

    /// The scene is structurally invalid (band lengths, grid mismatch).
    #[error("Invalid scene: {0}")]
    Scene(#[from] SceneError),

    /// No scene exists for the requested project.
    #[error("No scene found for project {0}")]
    SceneNotFound(String),

    /// The scene file extension is not recognised.
    #[error("Unsupported scene format: {0}")]
    UnsupportedFormat(String),

    /// I/O error while reading or writing a scene file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON scene encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `MessagePack` scene decoding failed.
    #[error("MessagePack decode error: {0}")]
    MessagePackDecode(#[from] rmp_serde::decode::Error),

    /// `MessagePack` scene encoding failed.
    #[error("MessagePack encode error: {0}")]
    MessagePackEncode(#[from] rmp_serde::encode::Error),
}
