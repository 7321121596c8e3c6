//! Run configuration.
//!
//! A TOML file is deserialized into an `Option`-field mirror struct, resolved
//! into an immutable `PipelineConfig`, env overrides are layered on top, and
//! the result is validated once. Nothing mutates the config after load; path
//! resolution happens exactly once, in `Context::resolve`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::Mode;

const DEFAULT_DATASET_NAME: &str = "dataset";
const DEFAULT_VRS_BIN: &str = "vrs";
const DEFAULT_HUMAN_HEIGHT: f64 = 1.5;
const DEFAULT_EGO_STREAMS: &[&str] = &["214-1", "1201-1", "1201-2"];
const DEFAULT_BACKEND: &str = "stub";

/// Capture-time stream id -> record-key suffix. The record key is
/// `{ego_id}_{suffix}`.
fn default_stream_names() -> BTreeMap<String, String> {
    [
        ("211-1", "et"),
        ("214-1", "rgb"),
        ("1201-1", "slam_left"),
        ("1201-2", "slam_right"),
    ]
    .iter()
    .map(|(id, name)| (id.to_string(), name.to_string()))
    .collect()
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    mode: Option<String>,
    data_dir: Option<PathBuf>,
    inputs: Option<InputsFile>,
    mode_preprocess: Option<ModePreprocessFile>,
    mode_bbox: Option<ModeBboxFile>,
    mode_pose2d: Option<ModePose2dFile>,
}

#[derive(Debug, Deserialize, Default)]
struct InputsFile {
    metadata_json_path: Option<PathBuf>,
    input_capture_dir: Option<PathBuf>,
    capture_data_dir: Option<PathBuf>,
    from_frame_number: Option<usize>,
    to_frame_number: Option<usize>,
    ego_streams: Option<Vec<String>>,
    ego_stream_names: Option<BTreeMap<String, String>>,
    ego_trajectory_path: Option<PathBuf>,
    exo_trajectory_path: Option<PathBuf>,
    exo_timesync_name_to_calib_name: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ModePreprocessFile {
    download_video_files: Option<bool>,
    force_download: Option<bool>,
    extract_all_ego_frames: Option<bool>,
    vrs_bin_path: Option<String>,
    dataset_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModeBboxFile {
    detector_backend: Option<String>,
    detector_config: Option<PathBuf>,
    detector_checkpoint: Option<PathBuf>,
    human_height: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModePose2dFile {
    pose_backend: Option<String>,
    pose_config: Option<PathBuf>,
    pose_checkpoint: Option<PathBuf>,
    dummy_pose_config: Option<PathBuf>,
    dummy_pose_checkpoint: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: Option<Mode>,
    pub data_dir: PathBuf,
    pub inputs: InputsConfig,
    pub mode_preprocess: ModePreprocessConfig,
    pub mode_bbox: ModeBboxConfig,
    pub mode_pose2d: ModePose2dConfig,
}

#[derive(Debug, Clone)]
pub struct InputsConfig {
    /// Explicit capture descriptor; takes precedence over directory inference.
    pub metadata_json_path: Option<PathBuf>,
    pub input_capture_dir: Option<PathBuf>,
    pub capture_data_dir: Option<PathBuf>,
    /// Inclusive synchronized-index range to process.
    pub from_frame_number: usize,
    pub to_frame_number: usize,
    /// Egocentric sub-streams to align (capture-time stream ids).
    pub ego_streams: Vec<String>,
    pub ego_stream_names: BTreeMap<String, String>,
    pub ego_trajectory_path: Option<PathBuf>,
    pub exo_trajectory_path: Option<PathBuf>,
    /// Optional capture-time device name -> calibration-time name remap.
    pub exo_timesync_name_to_calib_name: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct ModePreprocessConfig {
    pub download_video_files: bool,
    pub force_download: bool,
    pub extract_all_ego_frames: bool,
    pub vrs_bin_path: String,
    pub dataset_name: String,
}

#[derive(Debug, Clone)]
pub struct ModeBboxConfig {
    pub detector_backend: String,
    pub detector_config: Option<PathBuf>,
    pub detector_checkpoint: Option<PathBuf>,
    pub human_height: f64,
}

#[derive(Debug, Clone)]
pub struct ModePose2dConfig {
    pub pose_backend: String,
    pub pose_config: Option<PathBuf>,
    pub pose_checkpoint: Option<PathBuf>,
    /// Lightweight model used by pose3d for visualization only.
    pub dummy_pose_config: Option<PathBuf>,
    pub dummy_pose_checkpoint: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
        let file: PipelineConfigFile = toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
        let mut cfg = Self::from_file(file)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self> {
        let mode = match file.mode.as_deref() {
            Some(raw) => Some(
                Mode::parse(raw)
                    .ok_or_else(|| anyhow!("unknown mode `{}` (expected one of preprocess, bbox, pose2d, pose3d, multi_view_vis)", raw))?,
            ),
            None => None,
        };
        let inputs = file.inputs.unwrap_or_default();
        let preprocess = file.mode_preprocess.unwrap_or_default();
        let bbox = file.mode_bbox.unwrap_or_default();
        let pose2d = file.mode_pose2d.unwrap_or_default();

        Ok(Self {
            mode,
            data_dir: file.data_dir.unwrap_or_else(|| PathBuf::from("data")),
            inputs: InputsConfig {
                metadata_json_path: inputs.metadata_json_path,
                input_capture_dir: inputs.input_capture_dir,
                capture_data_dir: inputs.capture_data_dir,
                from_frame_number: inputs.from_frame_number.unwrap_or(0),
                to_frame_number: inputs.to_frame_number.unwrap_or(0),
                ego_streams: inputs.ego_streams.unwrap_or_else(|| {
                    DEFAULT_EGO_STREAMS.iter().map(|s| s.to_string()).collect()
                }),
                ego_stream_names: inputs.ego_stream_names.unwrap_or_else(default_stream_names),
                ego_trajectory_path: inputs.ego_trajectory_path,
                exo_trajectory_path: inputs.exo_trajectory_path,
                exo_timesync_name_to_calib_name: inputs.exo_timesync_name_to_calib_name,
            },
            mode_preprocess: ModePreprocessConfig {
                download_video_files: preprocess.download_video_files.unwrap_or(false),
                force_download: preprocess.force_download.unwrap_or(false),
                extract_all_ego_frames: preprocess.extract_all_ego_frames.unwrap_or(false),
                vrs_bin_path: preprocess
                    .vrs_bin_path
                    .unwrap_or_else(|| DEFAULT_VRS_BIN.to_string()),
                dataset_name: preprocess
                    .dataset_name
                    .unwrap_or_else(|| DEFAULT_DATASET_NAME.to_string()),
            },
            mode_bbox: ModeBboxConfig {
                detector_backend: bbox
                    .detector_backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                detector_config: bbox.detector_config,
                detector_checkpoint: bbox.detector_checkpoint,
                human_height: bbox.human_height.unwrap_or(DEFAULT_HUMAN_HEIGHT),
            },
            mode_pose2d: ModePose2dConfig {
                pose_backend: pose2d
                    .pose_backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                pose_config: pose2d.pose_config,
                pose_checkpoint: pose2d.pose_checkpoint,
                dummy_pose_config: pose2d.dummy_pose_config,
                dummy_pose_checkpoint: pose2d.dummy_pose_checkpoint,
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("MVPOSE_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(raw) = std::env::var("MVPOSE_MODE") {
            if !raw.trim().is_empty() {
                self.mode = Some(
                    Mode::parse(raw.trim())
                        .ok_or_else(|| anyhow!("MVPOSE_MODE: unknown mode `{}`", raw))?,
                );
            }
        }
        if let Ok(bin) = std::env::var("MVPOSE_VRS_BIN") {
            if !bin.trim().is_empty() {
                self.mode_preprocess.vrs_bin_path = bin;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.inputs.metadata_json_path.is_none()
            && self.inputs.input_capture_dir.is_none()
            && self.inputs.capture_data_dir.is_none()
        {
            return Err(anyhow!(
                "one of inputs.metadata_json_path, inputs.input_capture_dir, \
                 inputs.capture_data_dir must be set"
            ));
        }
        if self.inputs.to_frame_number < self.inputs.from_frame_number {
            return Err(anyhow!(
                "inputs.to_frame_number ({}) must be >= inputs.from_frame_number ({})",
                self.inputs.to_frame_number,
                self.inputs.from_frame_number
            ));
        }
        if self.inputs.ego_streams.is_empty() {
            return Err(anyhow!("inputs.ego_streams must not be empty"));
        }
        for stream_id in &self.inputs.ego_streams {
            if !self.inputs.ego_stream_names.contains_key(stream_id) {
                return Err(anyhow!(
                    "inputs.ego_stream_names has no entry for stream `{}`",
                    stream_id
                ));
            }
        }
        if !(self.mode_bbox.human_height > 0.0) {
            return Err(anyhow!(
                "mode_bbox.human_height must be positive (got {})",
                self.mode_bbox.human_height
            ));
        }
        Ok(())
    }

    /// The capture directory used for metadata inference, when configured.
    pub fn capture_dir(&self) -> Option<&Path> {
        self.inputs
            .input_capture_dir
            .as_deref()
            .or(self.inputs.capture_data_dir.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<PipelineConfig> {
        let file: PipelineConfigFile = toml::from_str(toml_src).expect("parse toml");
        let mut cfg = PipelineConfig::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse(
            r#"
            mode = "preprocess"
            [inputs]
            capture_data_dir = "/captures/src01/take01"
            to_frame_number = 10
            "#,
        )
        .expect("config");
        assert_eq!(cfg.mode, Some(Mode::Preprocess));
        assert_eq!(cfg.inputs.from_frame_number, 0);
        assert_eq!(cfg.mode_preprocess.dataset_name, "dataset");
        assert_eq!(cfg.mode_bbox.human_height, 1.5);
        assert_eq!(cfg.inputs.ego_streams.len(), 3);
    }

    #[test]
    fn unknown_mode_fails_before_any_io() {
        let file: PipelineConfigFile = toml::from_str(
            r#"
            mode = "triangulate"
            [inputs]
            capture_data_dir = "/captures/a/b"
            "#,
        )
        .expect("parse toml");
        let err = PipelineConfig::from_file(file).expect_err("unknown mode");
        assert!(err.to_string().contains("unknown mode"));
    }

    #[test]
    fn rejects_inverted_frame_range() {
        let err = parse(
            r#"
            [inputs]
            capture_data_dir = "/captures/a/b"
            from_frame_number = 5
            to_frame_number = 2
            "#,
        )
        .expect_err("range");
        assert!(err.to_string().contains("to_frame_number"));
    }

    #[test]
    fn rejects_stream_without_record_name() {
        let err = parse(
            r#"
            [inputs]
            capture_data_dir = "/captures/a/b"
            ego_streams = ["999-9"]
            "#,
        )
        .expect_err("stream name");
        assert!(err.to_string().contains("999-9"));
    }
}
