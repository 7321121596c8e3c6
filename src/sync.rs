//! Multi-camera timestamp synchronization.
//!
//! The egocentric rig emits several independently-clocked sub-streams; the
//! exocentric cameras emit frame-numbered video. The synchronizer aligns all
//! of them onto one common frame-index timeline, anchored to two trajectory
//! tables (one per device class), and produces the dense `SyncedFrameTable`
//! every downstream stage iterates.
//!
//! Matching is asymmetric by design, preserved as observed in the capture
//! tooling: egocentric frames match their trajectory row by nearest timestamp
//! (ties broken by first occurrence in table order), while exocentric poses
//! are looked up purely by device identifier, one calibration row per device
//! for the whole session, with no timestamp reconciliation.
//!
//! Any missing stream, column, trajectory row or extracted frame aborts the
//! whole synchronization: partial tables are never produced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::camera::CameraDescriptor;
use crate::storage::ArtifactStore;
use crate::table::CsvTable;
use crate::PipelineError;

/// Calibration-table column identifying an exocentric device.
pub const EXO_UID_COLUMN: &str = "cam_uid";
/// Ego trajectory timestamp column, microseconds.
pub const EGO_TRAJECTORY_TS_COLUMN: &str = "tracking_timestamp_us";

/// One camera-or-stream view at one synchronized index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewEntry {
    /// Frame path relative to the dataset frame directory.
    pub frame_path: String,
    pub frame_number: u64,
    /// Capture timestamp in seconds. Egocentric streams carry one;
    /// exocentric views do not.
    pub t: Option<f64>,
    pub camera: CameraDescriptor,
    /// The raw trajectory row this view's pose came from.
    pub raw_pose: BTreeMap<String, String>,
}

/// All views at one synchronized index. Keys are stream/camera names; the
/// map is ordered so serialized tables are byte-stable.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameRecord {
    pub views: BTreeMap<String, ViewEntry>,
}

impl FrameRecord {
    pub fn view(&self, name: &str) -> Result<&ViewEntry> {
        self.views
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("frame record has no view `{}`", name))
    }
}

/// The synchronized frame table, persisted as `data.json` by preprocess and
/// read-only for every later stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncedFrameTable {
    pub cache_dir: String,
    pub dataset_dir: String,
    pub frames: Vec<FrameRecord>,
}

impl SyncedFrameTable {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn save(&self, store: &dyn ArtifactStore, path: &Path) -> Result<()> {
        let raw = serde_json::to_vec(self).context("serialize synced frame table")?;
        store.put(path, &raw)
    }

    pub fn load(store: &dyn ArtifactStore, path: &Path) -> Result<Self> {
        let raw = store.get(path)?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("invalid synced frame table {}", path.display()))
    }
}

/// Index of the row whose timestamp is nearest to `query`: strict minimum
/// absolute difference, ties broken by the first occurrence in table order.
pub fn nearest_timestamp_row(timestamps: &[f64], query: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (row, t) in timestamps.iter().enumerate() {
        let distance = (t - query).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((row, distance)),
        }
    }
    best.map(|(row, _)| row)
}

/// One extracted egocentric frame, keyed by its embedded timestamp string.
#[derive(Clone, Debug)]
pub struct EgoFrame {
    pub t: f64,
    /// Path relative to the frame directory.
    pub path: String,
}

/// Per-stream lookup from millisecond-precision timestamp strings to
/// extracted frame files.
#[derive(Debug, Default)]
pub struct EgoFrameIndex {
    by_stream: BTreeMap<String, BTreeMap<String, EgoFrame>>,
}

impl EgoFrameIndex {
    /// Scan `{frame_dir}/{ego_id}/{stream_id}/` for each stream. Extracted
    /// frame files embed their capture timestamp as the trailing
    /// `-<seconds>.<millis>` token of the file name.
    pub fn scan(
        store: &dyn ArtifactStore,
        frame_dir: &Path,
        ego_id: &str,
        stream_ids: &[String],
    ) -> Result<Self> {
        let mut by_stream = BTreeMap::new();
        for stream_id in stream_ids {
            let stream_dir = frame_dir.join(ego_id).join(stream_id);
            let names = store.list(&stream_dir).map_err(|e| {
                sync_gap(format!(
                    "no extracted frames for ego stream `{}`: {}",
                    stream_id, e
                ))
            })?;
            let mut frames = BTreeMap::new();
            for name in names.iter().filter(|n| n.ends_with(".jpg")) {
                if let Some((key, t)) = parse_frame_timestamp(name) {
                    frames.insert(
                        key,
                        EgoFrame {
                            t,
                            path: PathBuf::from(ego_id)
                                .join(stream_id)
                                .join(name)
                                .to_string_lossy()
                                .into_owned(),
                        },
                    );
                }
            }
            by_stream.insert(stream_id.clone(), frames);
        }
        Ok(Self { by_stream })
    }

    pub fn lookup(&self, stream_id: &str, timestamp_key: &str) -> Option<&EgoFrame> {
        self.by_stream.get(stream_id)?.get(timestamp_key)
    }
}

/// `rgb-93.533.jpg` -> (`93.533`, 93.533).
fn parse_frame_timestamp(file_name: &str) -> Option<(String, f64)> {
    let tail = file_name.rsplit('-').next()?;
    let mut pieces = tail.split('.');
    let seconds = pieces.next()?;
    let millis = pieces.next()?;
    let key = format!("{seconds}.{millis}");
    let t = key.parse::<f64>().ok()?;
    Some((key, t))
}

fn sync_gap(message: String) -> anyhow::Error {
    PipelineError::SynchronizationGap { message }.into()
}

pub struct TimestampSynchronizer<'a> {
    pub timesync: &'a CsvTable,
    pub ego_trajectory: &'a CsvTable,
    pub exo_trajectory: &'a CsvTable,
    pub ego_frames: &'a EgoFrameIndex,
    pub ego_id: &'a str,
    pub ego_streams: &'a [String],
    /// Stream id -> record-key suffix; the record key is `{ego_id}_{suffix}`.
    pub stream_names: &'a BTreeMap<String, String>,
    pub exo_cam_names: &'a [String],
    /// Optional capture-time device name -> calibration-time name remap.
    pub name_remap: Option<&'a BTreeMap<String, String>>,
}

impl TimestampSynchronizer<'_> {
    /// Build the dense table over the inclusive index range `[i1, i2]`.
    pub fn synchronize(&self, i1: usize, i2: usize) -> Result<Vec<FrameRecord>> {
        let ego_traj_us = self
            .ego_trajectory
            .f64_column(EGO_TRAJECTORY_TS_COLUMN)
            .context("ego trajectory")?;
        if ego_traj_us.is_empty() {
            return Err(sync_gap("ego trajectory table is empty".to_string()));
        }

        let mut frames = Vec::with_capacity(i2 - i1 + 1);
        for index in i1..=i2 {
            let mut record = FrameRecord::default();
            for stream_id in self.ego_streams {
                let (key, entry) = self.ego_entry(index, stream_id, &ego_traj_us)?;
                record.views.insert(key, entry);
            }
            for cam_name in self.exo_cam_names {
                let entry = self.exo_entry(index, cam_name)?;
                record.views.insert(cam_name.clone(), entry);
            }
            frames.push(record);
        }
        Ok(frames)
    }

    fn ego_entry(
        &self,
        index: usize,
        stream_id: &str,
        ego_traj_us: &[f64],
    ) -> Result<(String, ViewEntry)> {
        let t_ns = self
            .timesync
            .f64_at(&format!("{}_{}_capture_timestamp_ns", self.ego_id, stream_id), index)?;
        let t_seconds = t_ns / 1e9;
        let timestamp_key = format!("{t_seconds:.3}");

        let frame = self
            .ego_frames
            .lookup(stream_id, &timestamp_key)
            .ok_or_else(|| {
                sync_gap(format!(
                    "index {}: ego stream `{}` has no extracted frame at t={} \
                     (frame extraction must cover the whole requested range)",
                    index, stream_id, timestamp_key
                ))
            })?;

        let traj_row = nearest_timestamp_row(ego_traj_us, frame.t * 1e6)
            .ok_or_else(|| sync_gap("ego trajectory table is empty".to_string()))?;
        let raw_pose = self.ego_trajectory.row_map(traj_row)?;
        let camera = CameraDescriptor::from_pose_row(stream_id, &raw_pose, "device")?;

        let suffix = self
            .stream_names
            .get(stream_id)
            .ok_or_else(|| sync_gap(format!("no record name for ego stream `{}`", stream_id)))?;
        let key = format!("{}_{}", self.ego_id, suffix);

        Ok((
            key,
            ViewEntry {
                frame_path: frame.path.clone(),
                frame_number: index as u64,
                t: Some(frame.t),
                camera,
                raw_pose,
            },
        ))
    }

    fn exo_entry(&self, index: usize, cam_name: &str) -> Result<ViewEntry> {
        let frame_number = self
            .timesync
            .u64_at(&format!("{cam_name}_frame_number"), index)?;
        let frame_path = format!("{cam_name}/{frame_number:06}.jpg");

        let calib_name = self
            .name_remap
            .and_then(|remap| remap.get(cam_name).map(String::as_str))
            .unwrap_or(cam_name);
        let traj_row = self
            .exo_trajectory
            .find_first(EXO_UID_COLUMN, calib_name)?
            .ok_or_else(|| {
                sync_gap(format!(
                    "exo camera `{}` (calibration name `{}`) has no row in the \
                     exo trajectory table",
                    cam_name, calib_name
                ))
            })?;
        let raw_pose = self.exo_trajectory.row_map(traj_row)?;
        let camera = CameraDescriptor::from_pose_row(cam_name, &raw_pose, "cam")?;

        Ok(ViewEntry {
            frame_path,
            frame_number,
            t: None,
            camera,
            raw_pose,
        })
    }
}
