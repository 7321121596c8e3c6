//! Resolved run context.
//!
//! All directory layout decisions happen here, once, when the context is
//! constructed from the capture metadata and the run configuration. Every
//! stage reads paths from the context; nothing mutates it afterwards.

use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::metadata::CaptureMetadata;

/// Cache layout for one capture, keyed `{video_source}_{take_id}`.
#[derive(Clone, Debug)]
pub struct Context {
    pub metadata: CaptureMetadata,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_rel_dir: PathBuf,
    pub dataset_dir: PathBuf,
    pub dataset_rel_dir: PathBuf,
    pub dataset_json_path: PathBuf,
    pub frame_dir: PathBuf,
    pub exo_cam_names: Vec<String>,
    pub bbox_dir: PathBuf,
    pub vis_bbox_dir: PathBuf,
    pub pose2d_dir: PathBuf,
    pub vis_pose2d_dir: PathBuf,
    pub pose3d_dir: PathBuf,
    pub vis_pose3d_dir: PathBuf,
    pub detector_config: Option<PathBuf>,
    pub detector_checkpoint: Option<PathBuf>,
    pub pose_config: Option<PathBuf>,
    pub pose_checkpoint: Option<PathBuf>,
    pub dummy_pose_config: Option<PathBuf>,
    pub dummy_pose_checkpoint: Option<PathBuf>,
    pub human_height: f64,
}

impl Context {
    pub fn resolve(config: &PipelineConfig, metadata: CaptureMetadata) -> Self {
        let cache_rel_dir = PathBuf::from("cache").join(format!(
            "{}_{}",
            metadata.video_source, metadata.take_id
        ));
        let cache_dir = config.data_dir.join(&cache_rel_dir);
        let dataset_rel_dir = cache_rel_dir.join(&config.mode_preprocess.dataset_name);
        let dataset_dir = cache_dir.join(&config.mode_preprocess.dataset_name);
        let exo_cam_names = metadata.exo_cam_names();

        Context {
            data_dir: config.data_dir.clone(),
            dataset_json_path: dataset_dir.join("data.json"),
            frame_dir: dataset_dir.join("frames"),
            bbox_dir: dataset_dir.join("bbox"),
            vis_bbox_dir: dataset_dir.join("vis_bbox"),
            pose2d_dir: dataset_dir.join("pose2d"),
            vis_pose2d_dir: dataset_dir.join("vis_pose2d"),
            pose3d_dir: dataset_dir.join("pose3d"),
            vis_pose3d_dir: dataset_dir.join("vis_pose3d"),
            detector_config: config.mode_bbox.detector_config.clone(),
            detector_checkpoint: config.mode_bbox.detector_checkpoint.clone(),
            pose_config: config.mode_pose2d.pose_config.clone(),
            pose_checkpoint: config.mode_pose2d.pose_checkpoint.clone(),
            dummy_pose_config: config.mode_pose2d.dummy_pose_config.clone(),
            dummy_pose_checkpoint: config.mode_pose2d.dummy_pose_checkpoint.clone(),
            human_height: config.mode_bbox.human_height,
            cache_rel_dir,
            cache_dir,
            dataset_rel_dir,
            dataset_dir,
            exo_cam_names,
            metadata,
        }
    }

    /// Stage artifact paths, one per producing stage.
    pub fn bbox_artifact(&self) -> PathBuf {
        self.bbox_dir.join("bbox.json")
    }

    pub fn pose2d_artifact(&self) -> PathBuf {
        self.pose2d_dir.join("pose2d.json")
    }

    pub fn pose3d_artifact(&self) -> PathBuf {
        self.pose3d_dir.join("pose3d.json")
    }
}
