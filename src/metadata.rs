//! Capture metadata.
//!
//! Identifies one capture: take id, video source, the egocentric device, and
//! the per-device video list. Loaded exactly once per run, either from an
//! explicit JSON descriptor or inferred from a capture directory listing, and
//! immutable afterwards.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::storage::ArtifactStore;

const DEFAULT_EGO_ID: &str = "aria01";
const EGO_DEVICE_MARKER: &str = "aria";
const WALKAROUND_DEVICE_MARKER: &str = "mobile";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Ego,
    Exo,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoInfo {
    pub device_id: String,
    pub device_type: DeviceType,
    pub is_ego: bool,
    /// Walkaround devices are recorded for calibration only and are excluded
    /// from the exocentric camera set.
    pub has_walkaround: bool,
    pub source_path: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub take_id: String,
    pub video_source: String,
    pub ego_id: String,
    pub timesync_csv_path: PathBuf,
    pub videos: Vec<VideoInfo>,
}

impl CaptureMetadata {
    /// Load from an explicit JSON descriptor.
    pub fn from_json_file(store: &dyn ArtifactStore, path: &Path) -> Result<Self> {
        let raw = store
            .get(path)
            .with_context(|| format!("failed to read metadata json {}", path.display()))?;
        let metadata: CaptureMetadata = serde_json::from_slice(&raw)
            .map_err(|e| anyhow!("invalid metadata json {}: {}", path.display(), e))?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Infer from a capture directory: `{source}/{take}/videos/*` holds one
    /// video per device, device ids taken from the file stems.
    pub fn from_capture_dir(store: &dyn ArtifactStore, capture_dir: &Path) -> Result<Self> {
        let take_id = capture_dir
            .file_name()
            .map(|c| c.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("capture dir {} has no take component", capture_dir.display()))?;
        let video_source = capture_dir
            .parent()
            .and_then(|p| p.file_name())
            .map(|c| c.to_string_lossy().into_owned())
            .ok_or_else(|| {
                anyhow!(
                    "capture dir {} has no video-source component",
                    capture_dir.display()
                )
            })?;

        let videos_dir = capture_dir.join("videos");
        let names = store
            .list(&videos_dir)
            .with_context(|| format!("failed to list {}", videos_dir.display()))?;
        let videos: Vec<VideoInfo> = names
            .iter()
            .filter_map(|name| {
                let stem = Path::new(name).file_stem()?.to_string_lossy().into_owned();
                let is_ego = stem.contains(EGO_DEVICE_MARKER);
                Some(VideoInfo {
                    device_type: if is_ego { DeviceType::Ego } else { DeviceType::Exo },
                    is_ego,
                    has_walkaround: is_ego || stem.contains(WALKAROUND_DEVICE_MARKER),
                    source_path: videos_dir.join(name),
                    device_id: stem,
                })
            })
            .collect();

        let metadata = CaptureMetadata {
            take_id,
            video_source,
            ego_id: DEFAULT_EGO_ID.to_string(),
            timesync_csv_path: capture_dir.join("timesync.csv"),
            videos,
        };
        metadata.validate()?;
        Ok(metadata)
    }

    fn validate(&self) -> Result<()> {
        if self.videos.is_empty() {
            return Err(anyhow!(
                "capture {}_{} has no videos",
                self.video_source,
                self.take_id
            ));
        }
        if self.exo_cam_names().is_empty() {
            return Err(anyhow!(
                "capture {}_{} has no exocentric cameras",
                self.video_source,
                self.take_id
            ));
        }
        Ok(())
    }

    /// Exocentric camera names: every non-ego device without walkaround.
    pub fn exo_cam_names(&self) -> Vec<String> {
        self.videos
            .iter()
            .filter(|v| !v.is_ego && !v.has_walkaround)
            .map(|v| v.device_id.clone())
            .collect()
    }

    pub fn video(&self, device_id: &str) -> Result<&VideoInfo> {
        self.videos
            .iter()
            .find(|v| v.device_id == device_id)
            .ok_or_else(|| anyhow!("no video for device `{}`", device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryArtifactStore;

    #[test]
    fn infers_devices_from_capture_dir() {
        let store = InMemoryArtifactStore::new();
        let capture = Path::new("/captures/uni01/take03");
        for name in ["aria01.vrs", "cam01.mp4", "cam02.mp4", "mobile01.mp4"] {
            store
                .put(&capture.join("videos").join(name), b"")
                .expect("seed");
        }

        let metadata = CaptureMetadata::from_capture_dir(&store, capture).expect("metadata");
        assert_eq!(metadata.take_id, "take03");
        assert_eq!(metadata.video_source, "uni01");
        assert_eq!(metadata.ego_id, "aria01");
        assert_eq!(metadata.exo_cam_names(), vec!["cam01", "cam02"]);

        let ego = metadata.video("aria01").expect("ego video");
        assert!(ego.is_ego);
        assert!(ego.has_walkaround);
        let mobile = metadata.video("mobile01").expect("mobile video");
        assert!(!mobile.is_ego);
        assert!(mobile.has_walkaround);
    }

    #[test]
    fn explicit_json_takes_the_descriptor_as_is() {
        let store = InMemoryArtifactStore::new();
        let json = r#"{
            "take_id": "take01",
            "video_source": "uni02",
            "ego_id": "aria01",
            "timesync_csv_path": "/captures/uni02/take01/timesync.csv",
            "videos": [
                {"device_id": "aria01", "device_type": "ego", "is_ego": true,
                 "has_walkaround": true, "source_path": "/captures/uni02/take01/videos/aria01.vrs"},
                {"device_id": "cam01", "device_type": "exo", "is_ego": false,
                 "has_walkaround": false, "source_path": "/captures/uni02/take01/videos/cam01.mp4"}
            ]
        }"#;
        let path = Path::new("/meta.json");
        store.put(path, json.as_bytes()).expect("seed");

        let metadata = CaptureMetadata::from_json_file(&store, path).expect("metadata");
        assert_eq!(metadata.exo_cam_names(), vec!["cam01"]);
        assert_eq!(
            metadata.timesync_csv_path,
            Path::new("/captures/uni02/take01/timesync.csv")
        );
    }

    #[test]
    fn rejects_capture_without_exo_cameras() {
        let store = InMemoryArtifactStore::new();
        let capture = Path::new("/captures/uni01/take04");
        store
            .put(&capture.join("videos/aria01.vrs"), b"")
            .expect("seed");
        assert!(CaptureMetadata::from_capture_dir(&store, capture).is_err());
    }
}
