//! mvpose - multi-view ego/exo capture pipeline
//!
//! This crate turns one synchronized multi-camera capture (a head-mounted
//! egocentric rig plus several fixed exocentric cameras) into per-frame 3D
//! human-pose estimates, as a sequence of offline batch stages:
//!
//! `preprocess -> bbox -> pose2d -> pose3d -> multi_view_vis`
//!
//! Each stage reads the previous stage's cached artifact and writes its own;
//! stages are re-runnable independently against those artifacts.
//!
//! # Architecture
//!
//! - `sync`: the timestamp synchronizer that fuses independently-clocked
//!   camera streams into one dense frame table
//! - `geometry`: ground-plane fit and the cylinder region proposal that
//!   seeds the person detector from camera geometry alone
//! - `stages`: the stage runner - artifact preconditions, frame iteration,
//!   all-or-nothing artifact writes
//! - `models`: the interfaces this crate needs from the external detector,
//!   2D pose estimator and triangulator, plus deterministic stub backends
//! - `storage`: the artifact store seam (filesystem and in-memory backends)
//! - `tool`: scoped subprocess execution with checked exit status

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub mod camera;
pub mod config;
pub mod context;
pub mod geometry;
pub mod metadata;
pub mod models;
pub mod stages;
pub mod storage;
pub mod sync;
pub mod table;
pub mod tool;
pub mod ui;
pub mod video;
pub mod vis;

pub use camera::{CameraDescriptor, CameraView, PinholeCamera};
pub use config::PipelineConfig;
pub use context::Context;
pub use geometry::{check_and_convert_bbox, fit_camera_plane, region_proposal, BBoxThresholds};
pub use metadata::{CaptureMetadata, DeviceType, VideoInfo};
pub use models::{Detection, Keypoints2d, PersonDetector, Pose3d, PoseEstimator2d, TriangulationBackend};
pub use stages::{run_stage, StageToolkit};
pub use storage::{ArtifactStore, InMemoryArtifactStore, LocalArtifactStore};
pub use sync::{FrameRecord, SyncedFrameTable, TimestampSynchronizer, ViewEntry};
pub use tool::ExternalTool;

// -------------------- Pipeline modes --------------------

/// The stage selector. Stages form a strict linear chain; each one requires
/// the previous stage's artifact on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[value(name = "preprocess")]
    Preprocess,
    #[value(name = "bbox")]
    Bbox,
    #[value(name = "pose2d")]
    Pose2d,
    #[value(name = "pose3d")]
    Pose3d,
    #[value(name = "multi_view_vis")]
    MultiViewVis,
}

impl Mode {
    /// Stable name used in config files and remediation messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Preprocess => "preprocess",
            Mode::Bbox => "bbox",
            Mode::Pose2d => "pose2d",
            Mode::Pose3d => "pose3d",
            Mode::MultiViewVis => "multi_view_vis",
        }
    }

    pub fn parse(s: &str) -> Option<Mode> {
        match s {
            "preprocess" => Some(Mode::Preprocess),
            "bbox" => Some(Mode::Bbox),
            "pose2d" => Some(Mode::Pose2d),
            "pose3d" => Some(Mode::Pose3d),
            "multi_view_vis" => Some(Mode::MultiViewVis),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// -------------------- Error taxonomy --------------------

/// Fatal pipeline error kinds, carried inside `anyhow::Result` so callers can
/// downcast and distinguish "abort the stage" from per-item conditions.
///
/// Per-(frame, camera) rejections (proposal out of frame, detector found
/// nothing) are NOT errors: they are recorded as absent entries and the run
/// continues.
#[derive(Debug)]
pub enum PipelineError {
    /// A required upstream stage artifact is missing. `run_first` names the
    /// stage that produces it.
    MissingArtifact { path: PathBuf, run_first: Mode },
    /// Plane fit or region proposal over insufficient/invalid points. The
    /// camera rig is static, so this affects every frame identically.
    DegenerateGeometry { message: String },
    /// A requested frame or trajectory row has no match. Fatal for the whole
    /// preprocess stage: downstream stages assume a dense table.
    SynchronizationGap { message: String },
    /// An external tool exited unsuccessfully (or could not be spawned).
    ExternalTool {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::MissingArtifact { path, run_first } => write!(
                f,
                "missing stage artifact {}: run mode `{}` first",
                path.display(),
                run_first
            ),
            PipelineError::DegenerateGeometry { message } => {
                write!(f, "degenerate geometry: {}", message)
            }
            PipelineError::SynchronizationGap { message } => {
                write!(f, "synchronization gap: {}", message)
            }
            PipelineError::ExternalTool {
                tool,
                status,
                stderr,
            } => {
                let status = status
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "killed".to_string());
                write!(f, "external tool `{}` failed (status {})", tool, status)?;
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr.trim_end())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for PipelineError {}
