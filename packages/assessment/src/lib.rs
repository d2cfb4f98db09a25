#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Damage assessment engine.
//!
//! [`AssessmentEngine`] owns the projects, persists every state change
//! through a [`ProjectStore`], and runs the [`pipeline`] for each started
//! project on a bounded pool of background tasks.

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod store;

#[cfg(test)]
mod fixtures;

pub use config::{CONFIG_ENV, ConfigError, EngineConfig, StorageConfig, WorkerConfig};
pub use engine::AssessmentEngine;
pub use error::AssessmentError;
pub use export::{ExportGeometry, damage_features};
pub use pipeline::assess_scene;
pub use store::{InMemoryProjectStore, JsonFileProjectStore, ProjectStore, StoreError};
