//! Project lifecycle and background pipeline runs.
//!
//! Projects move `created -> processing -> completed | failed`. Every
//! transition is written to the [`ProjectStore`] under the project-map
//! write lock before it becomes visible to readers, so a project observed
//! in a given state is also durably in that state.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use damage_map_assessment_models::{
    CreateProjectRequest, ErrorKind, FailureReason, PipelineStage, Project, ProjectStatus,
    ProjectStatusView, ProjectSummary, ResultsView, StartOutcome,
};
use damage_map_damage_models::AssessmentResult;
use damage_map_detection::{InfrastructureDetector, build_detector};
use damage_map_raster::{BandStore, FileBandStore};
use tokio::sync::{RwLock, Semaphore, mpsc, watch};

use crate::config::EngineConfig;
use crate::error::AssessmentError;
use crate::pipeline::assess_scene;
use crate::store::{JsonFileProjectStore, ProjectStore};

/// Message recorded on projects found mid-run at startup when resuming
/// is disabled.
pub const INTERRUPTED_MESSAGE: &str = "Processing was interrupted by a restart";

struct Inner {
    projects: RwLock<BTreeMap<String, Project>>,
    store: Arc<dyn ProjectStore>,
    band_store: Arc<dyn BandStore>,
    detector: Arc<dyn InfrastructureDetector>,
    config: EngineConfig,
    workers: Arc<Semaphore>,
    changes: watch::Sender<u64>,
}

/// Owns every project and runs their assessments.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AssessmentEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AssessmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssessmentEngine")
            .field("detector", &self.inner.detector.name())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl AssessmentEngine {
    /// Opens an engine over the given collaborators, loading stored
    /// projects.
    ///
    /// Projects left in `processing` by a previous process are re-queued
    /// when `workers.resume_interrupted` is set and failed otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`AssessmentError::Storage`] if stored projects cannot be
    /// loaded or updated.
    pub async fn open(
        config: EngineConfig,
        store: Arc<dyn ProjectStore>,
        band_store: Arc<dyn BandStore>,
        detector: Arc<dyn InfrastructureDetector>,
    ) -> Result<Self, AssessmentError> {
        let mut projects = BTreeMap::new();
        let mut resume = Vec::new();

        for mut project in store.load_all().await? {
            if project.status == ProjectStatus::Processing {
                if config.workers.resume_interrupted {
                    log::info!("Resuming interrupted project {}", project.id);
                    project.stage = None;
                    resume.push(project.id.clone());
                } else {
                    log::warn!("Failing interrupted project {}", project.id);
                    project.status = ProjectStatus::Failed;
                    project.stage = None;
                    project.failed_at = Some(Utc::now());
                    project.failure = Some(FailureReason {
                        kind: ErrorKind::ProcessingError,
                        message: INTERRUPTED_MESSAGE.to_string(),
                    });
                }
                store.save(&project).await?;
            }
            projects.insert(project.id.clone(), project);
        }

        log::info!(
            "Assessment engine ready: {} projects, detector {}, {} workers",
            projects.len(),
            detector.name(),
            config.workers.max_concurrent_runs
        );

        let (changes, _) = watch::channel(0);
        let engine = Self {
            inner: Arc::new(Inner {
                projects: RwLock::new(projects),
                store,
                band_store,
                detector,
                workers: Arc::new(Semaphore::new(config.workers.max_concurrent_runs.max(1))),
                config,
                changes,
            }),
        };

        for id in resume {
            engine.spawn_run(id);
        }

        Ok(engine)
    }

    /// Opens an engine with file-backed stores and the configured detector.
    ///
    /// # Errors
    ///
    /// Returns [`AssessmentError::Storage`] if stored projects cannot be
    /// loaded.
    pub async fn from_config(config: EngineConfig) -> Result<Self, AssessmentError> {
        let store = Arc::new(JsonFileProjectStore::new(config.storage.projects_dir()));
        let band_store = Arc::new(FileBandStore::new(config.storage.scenes_dir.clone()));
        let detector = build_detector(&config.detector);
        Self::open(config, store, band_store, detector).await
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Creates a project in the `created` state.
    ///
    /// # Errors
    ///
    /// Returns [`AssessmentError::Validation`] for a malformed request
    /// (nothing is stored), or [`AssessmentError::Storage`].
    pub async fn create(&self, request: CreateProjectRequest) -> Result<String, AssessmentError> {
        let disaster_type = request.validate()?;
        let id = uuid::Uuid::new_v4().to_string();
        let project = Project::new(id.clone(), request, disaster_type, Utc::now());

        let mut projects = self.inner.projects.write().await;
        self.inner.store.save(&project).await?;
        log::info!(
            "Created project {id} ({} {}, {})",
            project.name,
            project.disaster_type,
            project.location
        );
        projects.insert(id.clone(), project);
        drop(projects);
        self.notify();

        Ok(id)
    }

    /// Starts processing a `created` project.
    ///
    /// Returns once `processing` is durably committed; the pipeline runs in
    /// the background. For any other status nothing happens and `started`
    /// is false.
    ///
    /// # Errors
    ///
    /// Returns [`AssessmentError::NotFound`] for an unknown id, or
    /// [`AssessmentError::Storage`] if the transition cannot be persisted.
    pub async fn start_processing(&self, id: &str) -> Result<StartOutcome, AssessmentError> {
        let mut projects = self.inner.projects.write().await;
        let project = projects
            .get(id)
            .ok_or_else(|| AssessmentError::NotFound(id.to_string()))?;

        if project.status != ProjectStatus::Created {
            log::debug!("Not starting project {id}: already {}", project.status);
            return Ok(StartOutcome {
                project_id: id.to_string(),
                status: project.status,
                started: false,
            });
        }

        let mut next = project.clone();
        next.status = ProjectStatus::Processing;
        next.stage = None;
        next.processing_started_at = Some(Utc::now());
        self.inner.store.save(&next).await?;
        projects.insert(id.to_string(), next);
        drop(projects);

        log::info!("Queued project {id} for processing");
        self.notify();
        self.spawn_run(id.to_string());

        Ok(StartOutcome {
            project_id: id.to_string(),
            status: ProjectStatus::Processing,
            started: true,
        })
    }

    /// Current status of a project.
    ///
    /// # Errors
    ///
    /// Returns [`AssessmentError::NotFound`] for an unknown id.
    pub async fn get_status(&self, id: &str) -> Result<ProjectStatusView, AssessmentError> {
        self.with_project(id, |p| ProjectStatusView::from(p)).await
    }

    /// Results of a project, or a pending marker until it completes.
    ///
    /// # Errors
    ///
    /// Returns [`AssessmentError::NotFound`] for an unknown id.
    pub async fn get_results(&self, id: &str) -> Result<ResultsView, AssessmentError> {
        self.with_project(id, |p| ResultsView::from(p)).await
    }

    /// Full assessment result of a completed project.
    ///
    /// # Errors
    ///
    /// Returns [`AssessmentError::NotFound`] for an unknown id and
    /// [`AssessmentError::InvalidState`] if the project has not completed.
    pub async fn get_result(&self, id: &str) -> Result<AssessmentResult, AssessmentError> {
        let projects = self.inner.projects.read().await;
        let project = projects
            .get(id)
            .ok_or_else(|| AssessmentError::NotFound(id.to_string()))?;
        project
            .result
            .clone()
            .ok_or_else(|| AssessmentError::InvalidState {
                id: id.to_string(),
                status: project.status,
                message: "results are only available once processing completes".to_string(),
            })
    }

    /// All projects, oldest first.
    pub async fn list(&self) -> Vec<ProjectSummary> {
        let projects = self.inner.projects.read().await;
        let mut summaries: Vec<ProjectSummary> =
            projects.values().map(ProjectSummary::from).collect();
        drop(projects);
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Returns a failed project to `created` so it can be started again.
    ///
    /// # Errors
    ///
    /// Returns [`AssessmentError::NotFound`] for an unknown id,
    /// [`AssessmentError::InvalidState`] unless the project failed, or
    /// [`AssessmentError::Storage`].
    pub async fn reset(&self, id: &str) -> Result<ProjectStatusView, AssessmentError> {
        let mut projects = self.inner.projects.write().await;
        let project = projects
            .get(id)
            .ok_or_else(|| AssessmentError::NotFound(id.to_string()))?;

        if project.status != ProjectStatus::Failed {
            return Err(AssessmentError::InvalidState {
                id: id.to_string(),
                status: project.status,
                message: "only failed projects can be reset".to_string(),
            });
        }

        let mut next = project.clone();
        next.status = ProjectStatus::Created;
        next.stage = None;
        next.processing_started_at = None;
        next.failed_at = None;
        next.failure = None;
        self.inner.store.save(&next).await?;
        let view = ProjectStatusView::from(&next);
        projects.insert(id.to_string(), next);
        drop(projects);

        log::info!("Reset project {id}");
        self.notify();
        Ok(view)
    }

    /// Waits until a project reaches `completed` or `failed`.
    ///
    /// Returns immediately for a project not being processed.
    ///
    /// # Errors
    ///
    /// Returns [`AssessmentError::NotFound`] for an unknown id.
    pub async fn wait_for(&self, id: &str) -> Result<ProjectStatusView, AssessmentError> {
        let mut changes = self.inner.changes.subscribe();
        loop {
            let view = self.get_status(id).await?;
            if view.status != ProjectStatus::Processing {
                return Ok(view);
            }
            if changes.changed().await.is_err() {
                return Ok(view);
            }
        }
    }

    async fn with_project<T>(
        &self,
        id: &str,
        f: impl FnOnce(&Project) -> T,
    ) -> Result<T, AssessmentError> {
        let projects = self.inner.projects.read().await;
        projects
            .get(id)
            .map(f)
            .ok_or_else(|| AssessmentError::NotFound(id.to_string()))
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn spawn_run(&self, id: String) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(&id).await;
        });
    }

    /// Commits a change to a processing project.
    async fn commit(
        &self,
        id: &str,
        update: impl FnOnce(&mut Project),
    ) -> Result<(), AssessmentError> {
        let mut projects = self.inner.projects.write().await;
        let mut next = projects
            .get(id)
            .cloned()
            .ok_or_else(|| AssessmentError::NotFound(id.to_string()))?;
        update(&mut next);
        self.inner.store.save(&next).await?;
        projects.insert(id.to_string(), next);
        drop(projects);
        self.notify();
        Ok(())
    }

    async fn run(&self, id: &str) {
        let Ok(_permit) = Arc::clone(&self.inner.workers).acquire_owned().await else {
            log::error!("Worker pool closed, cannot process project {id}");
            return;
        };
        log::info!("Processing project {id}");

        let outcome = self.execute(id).await;

        let committed = match outcome {
            Ok(result) => {
                log::info!(
                    "Project {id} completed: {} elements, {} damaged",
                    result.total_elements,
                    result.damaged_elements
                );
                self.commit(id, |p| {
                    p.status = ProjectStatus::Completed;
                    p.stage = None;
                    p.completed_at = Some(Utc::now());
                    p.result = Some(result);
                })
                .await
            }
            Err(e) => {
                log::error!("Project {id} failed: {e}");
                self.fail(id, &e).await
            }
        };

        if let Err(e) = committed {
            log::error!("Could not record outcome of project {id}: {e}");
            if matches!(e, AssessmentError::Storage(_))
                && let Err(e) = self.fail(id, &e).await
            {
                log::error!("Project {id} left in processing: {e}");
            }
        }
    }

    async fn fail(&self, id: &str, error: &AssessmentError) -> Result<(), AssessmentError> {
        let failure = error.to_failure();
        self.commit(id, |p| {
            p.status = ProjectStatus::Failed;
            p.stage = None;
            p.failed_at = Some(Utc::now());
            p.failure = Some(failure);
        })
        .await
    }

    async fn execute(&self, id: &str) -> Result<AssessmentResult, AssessmentError> {
        let scene = self.inner.band_store.load_scene(id).await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let inner = Arc::clone(&self.inner);
        let task = tokio::task::spawn_blocking(move || {
            assess_scene(&scene, &inner.detector, &inner.config, |stage| {
                let _ = tx.send(stage);
            })
        });

        while let Some(stage) = rx.recv().await {
            self.enter_stage(id, stage).await?;
        }

        task.await
            .map_err(|e| AssessmentError::Processing(format!("pipeline task failed: {e}")))?
    }

    async fn enter_stage(&self, id: &str, stage: PipelineStage) -> Result<(), AssessmentError> {
        log::info!(
            "Project {id}: {} ({}/{})",
            stage.description(),
            stage.position() + 1,
            PipelineStage::all().len()
        );
        self.commit(id, |p| p.stage = Some(stage)).await
    }
}
