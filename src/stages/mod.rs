//! Stage orchestration.
//!
//! A strict linear machine over `preprocess -> bbox -> pose2d -> pose3d ->
//! multi_view_vis`. Each stage requires the previous stage's artifact at its
//! deterministic context path, iterates the synchronized frame table in index
//! order, accumulates results in memory, and writes its artifact exactly
//! once, after every frame completed. A crash mid-stage leaves no artifact,
//! so re-running the stage starts clean.

pub mod bbox;
pub mod multi_view;
pub mod pose2d;
pub mod pose3d;
pub mod preprocess;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context as _, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::context::Context;
use crate::metadata::CaptureMetadata;
use crate::models::{
    self, Keypoints2d, PersonDetector, Pose3d, PoseEstimator2d, TriangulationBackend,
};
use crate::storage::{ArtifactStore, LocalArtifactStore};
use crate::ui::Ui;
use crate::video::{
    EgoFrameExtractor, FfmpegMuxer, JpegSequenceReader, VideoFrameReader, VideoMuxer, VrsExtractor,
};
use crate::{Mode, PipelineError};

/// The external collaborators one run works with. Built once from the
/// configuration; tests substitute their own backends.
pub struct StageToolkit {
    pub store: Box<dyn ArtifactStore>,
    pub detector: Box<dyn PersonDetector>,
    pub pose_estimator: Box<dyn PoseEstimator2d>,
    pub triangulator: Box<dyn TriangulationBackend>,
    pub video_reader: Box<dyn VideoFrameReader>,
    pub ego_extractor: Box<dyn EgoFrameExtractor>,
    pub muxer: Box<dyn VideoMuxer>,
    pub ui: Ui,
}

impl StageToolkit {
    pub fn from_config(config: &PipelineConfig, ui: Ui) -> Result<Self> {
        Ok(Self {
            store: Box::new(LocalArtifactStore::new()),
            detector: models::select_detector(&config.mode_bbox.detector_backend)?,
            pose_estimator: models::select_pose_estimator(&config.mode_pose2d.pose_backend)?,
            triangulator: models::select_triangulator(&config.mode_pose2d.pose_backend)?,
            video_reader: Box::new(JpegSequenceReader::new()),
            ego_extractor: Box::new(VrsExtractor::new(&config.mode_preprocess.vrs_bin_path)),
            muxer: Box::new(FfmpegMuxer::new()),
            ui,
        })
    }
}

/// Fail with a remediation hint when a required upstream artifact is absent.
pub fn require_artifact(store: &dyn ArtifactStore, path: &Path, run_first: Mode) -> Result<()> {
    if store.exists(path) {
        return Ok(());
    }
    Err(PipelineError::MissingArtifact {
        path: path.to_path_buf(),
        run_first,
    }
    .into())
}

// ----------------------------------------------------------------------------
// Stage artifact tables
// ----------------------------------------------------------------------------

/// Per-(frame, camera) stage artifact. Absent detections are `null`, never
/// zero-filled. The `stage` tag makes artifacts self-describing on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerCameraTable<T> {
    pub stage: String,
    pub entries: BTreeMap<u64, BTreeMap<String, Option<T>>>,
}

impl<T: Serialize + DeserializeOwned> PerCameraTable<T> {
    pub fn new(stage: Mode) -> Self {
        Self {
            stage: stage.as_str().to_string(),
            entries: BTreeMap::new(),
        }
    }

    pub fn save(&self, store: &dyn ArtifactStore, path: &Path) -> Result<()> {
        let raw = serde_json::to_vec(self).context("serialize stage table")?;
        store.put(path, &raw)
    }

    pub fn load(store: &dyn ArtifactStore, path: &Path, expected: Mode) -> Result<Self> {
        let raw = store.get(path)?;
        let table: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("invalid stage table {}", path.display()))?;
        if table.stage != expected.as_str() {
            return Err(anyhow!(
                "{} holds a `{}` table, expected `{}`",
                path.display(),
                table.stage,
                expected
            ));
        }
        Ok(table)
    }

    pub fn get(&self, index: u64, camera: &str) -> Option<&T> {
        self.entries.get(&index)?.get(camera)?.as_ref()
    }
}

/// Per-frame stage artifact (one fused value per synchronized index).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerFrameTable<T> {
    pub stage: String,
    pub entries: BTreeMap<u64, T>,
}

impl<T: Serialize + DeserializeOwned> PerFrameTable<T> {
    pub fn new(stage: Mode) -> Self {
        Self {
            stage: stage.as_str().to_string(),
            entries: BTreeMap::new(),
        }
    }

    pub fn save(&self, store: &dyn ArtifactStore, path: &Path) -> Result<()> {
        let raw = serde_json::to_vec(self).context("serialize stage table")?;
        store.put(path, &raw)
    }

    pub fn load(store: &dyn ArtifactStore, path: &Path, expected: Mode) -> Result<Self> {
        let raw = store.get(path)?;
        let table: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("invalid stage table {}", path.display()))?;
        if table.stage != expected.as_str() {
            return Err(anyhow!(
                "{} holds a `{}` table, expected `{}`",
                path.display(),
                table.stage,
                expected
            ));
        }
        Ok(table)
    }
}

pub type BBoxTable = PerCameraTable<[i32; 4]>;
pub type Pose2dTable = PerCameraTable<Keypoints2d>;
pub type Pose3dTable = PerFrameTable<Pose3d>;

// ----------------------------------------------------------------------------
// Dispatch
// ----------------------------------------------------------------------------

/// Resolve the capture metadata and context, then run the selected stage.
pub fn run_stage(config: &PipelineConfig, toolkit: &mut StageToolkit) -> Result<()> {
    let mode = config
        .mode
        .ok_or_else(|| anyhow!("no mode selected: set `mode` in the config or pass --mode"))?;

    let metadata = match &config.inputs.metadata_json_path {
        Some(path) => CaptureMetadata::from_json_file(toolkit.store.as_ref(), path)?,
        None => {
            let capture_dir = config
                .capture_dir()
                .ok_or_else(|| anyhow!("no capture directory configured"))?;
            CaptureMetadata::from_capture_dir(toolkit.store.as_ref(), capture_dir)?
        }
    };
    let ctx = Context::resolve(config, metadata);
    log::info!(
        "capture {}_{}: mode={}, cache={}",
        ctx.metadata.video_source,
        ctx.metadata.take_id,
        mode,
        ctx.cache_dir.display()
    );

    match mode {
        Mode::Preprocess => preprocess::run(&ctx, config, toolkit),
        Mode::Bbox => bbox::run(&ctx, toolkit),
        Mode::Pose2d => pose2d::run(&ctx, toolkit),
        Mode::Pose3d => pose3d::run(&ctx, toolkit),
        Mode::MultiViewVis => multi_view::run(&ctx, toolkit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryArtifactStore;

    #[test]
    fn missing_artifact_error_names_the_prerequisite_stage() {
        let store = InMemoryArtifactStore::new();
        let err = require_artifact(&store, Path::new("/cache/pose2d/pose2d.json"), Mode::Pose2d)
            .expect_err("missing");
        let kind = err.downcast_ref::<PipelineError>().expect("typed error");
        assert!(matches!(
            kind,
            PipelineError::MissingArtifact {
                run_first: Mode::Pose2d,
                ..
            }
        ));
    }

    #[test]
    fn stage_tables_are_schema_tagged() {
        let store = InMemoryArtifactStore::new();
        let path = Path::new("/cache/bbox/bbox.json");

        let mut table = BBoxTable::new(Mode::Bbox);
        table.entries.entry(0).or_default().insert(
            "cam01".to_string(),
            Some([10, 20, 110, 220]),
        );
        table
            .entries
            .entry(0)
            .or_default()
            .insert("cam02".to_string(), None);
        table.save(&store, path).expect("save");

        let raw = store.get(path).expect("bytes");
        let value: serde_json::Value = serde_json::from_slice(&raw).expect("json");
        assert_eq!(value["stage"], "bbox");
        assert!(value["entries"]["0"]["cam02"].is_null());

        let loaded = BBoxTable::load(&store, path, Mode::Bbox).expect("load");
        assert_eq!(loaded, table);
        assert_eq!(loaded.get(0, "cam01"), Some(&[10, 20, 110, 220]));
        assert_eq!(loaded.get(0, "cam02"), None);

        // Loading under the wrong stage tag is rejected.
        let err = BBoxTable::load(&store, path, Mode::Pose2d).expect_err("wrong stage");
        assert!(err.to_string().contains("expected `pose2d`"));
    }
}
