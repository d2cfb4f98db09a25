//! Scene storage keyed by project id.
//!
//! The engine never decodes imagery itself; it asks a [`BandStore`] for
//! the co-registered before/after [`Scene`] of a project. Two stores are
//! provided: [`FileBandStore`] reads `<root>/<project_id>.json` or
//! `<root>/<project_id>.msgpack`, and [`InMemoryBandStore`] holds scenes
//! registered at runtime (tests, the CLI `assess` command).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use damage_map_raster_models::Scene;

use crate::RasterError;

/// Supplier of before/after scenes for assessment projects.
#[async_trait]
pub trait BandStore: Send + Sync {
    /// Loads the scene registered for `project_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::SceneNotFound`] if no scene exists, or a
    /// decoding error if the stored scene is unreadable.
    async fn load_scene(&self, project_id: &str) -> Result<Scene, RasterError>;
}

/// On-disk encodings understood by [`read_scene_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneFormat {
    /// Plain JSON.
    Json,
    /// Compact `MessagePack`.
    MessagePack,
}

impl SceneFormat {
    /// File extension used for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MessagePack => "msgpack",
        }
    }

    /// Infers the format from a path's extension.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::UnsupportedFormat`] for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, RasterError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("msgpack" | "mp") => Ok(Self::MessagePack),
            _ => Err(RasterError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Decodes a scene from bytes in the given format.
///
/// # Errors
///
/// Returns a JSON or `MessagePack` decoding error.
pub fn decode_scene(bytes: &[u8], format: SceneFormat) -> Result<Scene, RasterError> {
    let scene = match format {
        SceneFormat::Json => serde_json::from_slice(bytes)?,
        SceneFormat::MessagePack => rmp_serde::from_slice(bytes)?,
    };
    Ok(scene)
}

/// Reads and decodes a scene file, inferring the format from its extension.
///
/// # Errors
///
/// Returns [`RasterError::Io`] if the file cannot be read, or a decoding
/// error.
pub async fn read_scene_file(path: &Path) -> Result<Scene, RasterError> {
    let format = SceneFormat::from_path(path)?;
    let bytes = tokio::fs::read(path).await.map_err(|e| RasterError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    decode_scene(&bytes, format)
}

/// Writes a scene file atomically (temp file, then rename).
///
/// # Errors
///
/// Returns [`RasterError::Io`] on write failure or an encoding error.
pub async fn write_scene_file(path: &Path, scene: &Scene) -> Result<(), RasterError> {
    let format = SceneFormat::from_path(path)?;
    let bytes = match format {
        SceneFormat::Json => serde_json::to_vec(scene)?,
        SceneFormat::MessagePack => rmp_serde::to_vec_named(scene)?,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RasterError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", format.extension()));
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| RasterError::Io {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| RasterError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

    Ok(())
}

/// Scenes stored as files in one directory, named by project id.
#[derive(Debug, Clone)]
pub struct FileBandStore {
    root: PathBuf,
}

impl FileBandStore {
    /// Creates a store reading from `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory the store reads from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a scene for `project_id` is stored at in the given format.
    #[must_use]
    pub fn scene_path(&self, project_id: &str, format: SceneFormat) -> PathBuf {
        self.root
            .join(format!("{project_id}.{}", format.extension()))
    }

    /// Stores a scene for `project_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError`] if encoding or writing fails.
    pub async fn save_scene(
        &self,
        project_id: &str,
        scene: &Scene,
        format: SceneFormat,
    ) -> Result<PathBuf, RasterError> {
        let path = self.scene_path(project_id, format);
        write_scene_file(&path, scene).await?;
        Ok(path)
    }
}

#[async_trait]
impl BandStore for FileBandStore {
    async fn load_scene(&self, project_id: &str) -> Result<Scene, RasterError> {
        for format in [SceneFormat::MessagePack, SceneFormat::Json] {
            let path = self.scene_path(project_id, format);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                log::debug!("Loading scene for {project_id} from {}", path.display());
                return read_scene_file(&path).await;
            }
        }
        Err(RasterError::SceneNotFound(project_id.to_string()))
    }
}

/// Scenes held in memory, registered by project id.
#[derive(Debug, Default)]
pub struct InMemoryBandStore {
    scenes: RwLock<BTreeMap<String, Scene>>,
}

impl InMemoryBandStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the scene for `project_id`.
    pub fn insert(&self, project_id: impl Into<String>, scene: Scene) {
        self.scenes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project_id.into(), scene);
    }

    /// Removes the scene for `project_id`, returning it if present.
    pub fn remove(&self, project_id: &str) -> Option<Scene> {
        self.scenes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(project_id)
    }
}

#[async_trait]
impl BandStore for InMemoryBandStore {
    async fn load_scene(&self, project_id: &str) -> Result<Scene, RasterError> {
        self.scenes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .cloned()
            .ok_or_else(|| RasterError::SceneNotFound(project_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use damage_map_raster_models::{Band, RasterBandSet, RasterGrid};

    fn scene() -> Scene {
        let grid = RasterGrid {
            width: 3,
            height: 2,
            origin_lon: 30.0,
            origin_lat: 10.0,
            pixel_width_deg: 0.0001,
            pixel_height_deg: 0.0001,
            resolution_m: 10.0,
            crs: "EPSG:4326".to_string(),
        };
        Scene::new(
            RasterBandSet::uniform(grid.clone(), &[(Band::Nir, 0.4), (Band::Red, 0.1)]),
            RasterBandSet::uniform(grid, &[(Band::Nir, 0.3), (Band::Red, 0.2)]),
        )
    }

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "damage_map_band_store_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn file_store_reads_json_and_msgpack() {
        let root = temp_root("formats");
        let store = FileBandStore::new(&root);
        let scene = scene();

        store
            .save_scene("a", &scene, SceneFormat::Json)
            .await
            .unwrap();
        store
            .save_scene("b", &scene, SceneFormat::MessagePack)
            .await
            .unwrap();

        assert_eq!(store.load_scene("a").await.unwrap(), scene);
        assert_eq!(store.load_scene("b").await.unwrap(), scene);
        assert!(!root.join("a.json.tmp").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn file_store_reports_missing_scene() {
        let root = temp_root("missing");
        let store = FileBandStore::new(&root);
        assert!(matches!(
            store.load_scene("nope").await,
            Err(RasterError::SceneNotFound(id)) if id == "nope"
        ));
    }

    #[tokio::test]
    async fn memory_store_round_trips_by_id() {
        let store = InMemoryBandStore::new();
        store.insert("p1", scene());
        assert_eq!(store.load_scene("p1").await.unwrap(), scene());
        assert!(store.remove("p1").is_some());
        assert!(store.load_scene("p1").await.is_err());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            SceneFormat::from_path(Path::new("scene.tif")),
            Err(RasterError::UnsupportedFormat(_))
        ));
    }
}
