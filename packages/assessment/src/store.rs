//! Durable project state.
//!
//! The engine keeps projects in memory and writes every committed
//! transition through a [`ProjectStore`] before it becomes visible.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use damage_map_assessment_models::Project;
use thiserror::Error;

/// Errors that can occur while persisting projects.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error on a project file or directory.
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A project file could not be encoded or decoded.
    #[error("Project file {path} is invalid: {source}")]
    Json {
        /// Path of the offending file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Persistence for projects.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Loads every stored project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if stored state cannot be read.
    async fn load_all(&self) -> Result<Vec<Project>, StoreError>;

    /// Durably stores (creates or replaces) a project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the project cannot be written.
    async fn save(&self, project: &Project) -> Result<(), StoreError>;
}

/// One pretty-printed JSON file per project in a directory.
///
/// Files are written to a `.tmp` sibling and renamed into place, so a
/// crash never leaves a half-written project behind.
#[derive(Debug, Clone)]
pub struct JsonFileProjectStore {
    dir: PathBuf,
}

impl JsonFileProjectStore {
    /// Creates a store rooted at `dir`. The directory is created on the
    /// first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the store writes to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn project_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl ProjectStore for JsonFileProjectStore {
    async fn load_all(&self) -> Result<Vec<Project>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No project directory at {}, starting empty", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error(&self.dir)(e)),
        };

        let mut projects = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&self.dir))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await.map_err(io_error(&path))?;
            let project: Project =
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                    path: path.display().to_string(),
                    source,
                })?;
            projects.push(project);
        }

        log::info!(
            "Loaded {} projects from {}",
            projects.len(),
            self.dir.display()
        );
        Ok(projects)
    }

    async fn save(&self, project: &Project) -> Result<(), StoreError> {
        let path = self.project_path(&project.id);
        let bytes = serde_json::to_vec_pretty(project).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(io_error(&tmp_path))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(io_error(&path))?;

        log::debug!("Saved project {} ({})", project.id, project.status);
        Ok(())
    }
}

/// Projects held only in memory.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<BTreeMap<String, Project>>,
}

impl InMemoryProjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `projects`.
    #[must_use]
    pub fn with_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        Self {
            projects: RwLock::new(projects.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    /// Returns the stored copy of a project.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Project> {
        self.projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn load_all(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self
            .projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }

    async fn save(&self, project: &Project) -> Result<(), StoreError> {
        self.projects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project.id.clone(), project.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use damage_map_assessment_models::{CreateProjectRequest, DisasterType, ProjectStatus};

    fn project(id: &str) -> Project {
        let request = CreateProjectRequest {
            name: "Valley floods".to_string(),
            location: "Derna".to_string(),
            disaster_type: "flood".to_string(),
            latitude: 32.76,
            longitude: 22.63,
            before_date: None,
            after_date: None,
            description: None,
        };
        Project::new(
            id.to_string(),
            request,
            DisasterType::Flood,
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        )
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "damage_map_store_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn json_store_round_trips_and_replaces() {
        let dir = temp_dir("round_trip");
        let store = JsonFileProjectStore::new(&dir);

        let mut first = project("p-1");
        store.save(&first).await.unwrap();
        store.save(&project("p-2")).await.unwrap();
        first.status = ProjectStatus::Processing;
        store.save(&first).await.unwrap();

        let mut loaded = store.load_all().await.unwrap();
        loaded.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], first);
        assert!(!dir.join("p-1.json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn missing_directory_loads_empty() {
        let store = JsonFileProjectStore::new(temp_dir("missing"));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = temp_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bad.json"), b"{ not json").unwrap();

        let result = JsonFileProjectStore::new(&dir).load_all().await;
        assert!(matches!(result, Err(StoreError::Json { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
