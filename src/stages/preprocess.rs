//! Preprocess stage: frame extraction + timestamp alignment.
//!
//! Extracts egocentric frames through the external extraction tool (bounded
//! to the requested capture window unless configured otherwise), dumps the
//! requested exocentric frames, then runs the timestamp synchronizer and
//! persists the dense frame table as `data.json`. The frame directory is
//! rebuilt from scratch on every run.

use anyhow::{anyhow, Result};

use crate::config::PipelineConfig;
use crate::context::Context;
use crate::stages::StageToolkit;
use crate::sync::{EgoFrameIndex, SyncedFrameTable, TimestampSynchronizer};
use crate::table::CsvTable;
use crate::vis;
use crate::PipelineError;

/// Slack added around the ego extraction window, one frame at 30 fps.
const EXTRACTION_WINDOW_SLACK_S: f64 = 1.0 / 30.0;

pub fn run(ctx: &Context, config: &PipelineConfig, toolkit: &mut StageToolkit) -> Result<()> {
    let StageToolkit {
        store,
        video_reader,
        ego_extractor,
        ui,
        ..
    } = toolkit;
    let store = store.as_ref();

    if config.mode_preprocess.download_video_files {
        log::info!(
            "download_video_files set (force_download={}): raw assets are fetched by the \
             capture tooling; expecting local sources",
            config.mode_preprocess.force_download
        );
    }

    let timesync = CsvTable::from_store(store, &ctx.metadata.timesync_csv_path)?;
    let i1 = config.inputs.from_frame_number;
    let i2 = config.inputs.to_frame_number;
    if i2 >= timesync.len() {
        return Err(PipelineError::SynchronizationGap {
            message: format!(
                "timesync table has {} rows, requested range [{}, {}]",
                timesync.len(),
                i1,
                i2
            ),
        }
        .into());
    }

    store.remove_tree(&ctx.frame_dir)?;
    store.create_dir_all(&ctx.frame_dir)?;

    // Egocentric extraction, bounded to the requested window unless the
    // whole recording was asked for.
    let ego_id = &ctx.metadata.ego_id;
    let ego_video = ctx.metadata.video(ego_id)?;
    let window = if config.mode_preprocess.extract_all_ego_frames {
        None
    } else {
        let mut t1 = f64::INFINITY;
        let mut t2 = f64::NEG_INFINITY;
        for stream_id in &config.inputs.ego_streams {
            let column = format!("{ego_id}_{stream_id}_capture_timestamp_ns");
            t1 = t1.min(timesync.f64_at(&column, i1)? / 1e9);
            t2 = t2.max(timesync.f64_at(&column, i2)? / 1e9);
        }
        Some((t1 - EXTRACTION_WINDOW_SLACK_S, t2 + EXTRACTION_WINDOW_SLACK_S))
    };
    let ego_frame_dir = ctx.frame_dir.join(ego_id);
    store.create_dir_all(&ego_frame_dir)?;
    {
        let _stage = ui.stage(&format!("Extract {ego_id} frames"));
        ego_extractor.extract(store, &ego_video.source_path, &ego_frame_dir, window)?;
    }

    // Exocentric frames, one JPEG per requested frame number.
    for cam_name in &ctx.exo_cam_names {
        let video = ctx.metadata.video(cam_name)?;
        let frame_indices: Vec<u64> = (i1..=i2)
            .map(|row| timesync.u64_at(&format!("{cam_name}_frame_number"), row))
            .collect::<Result<_>>()?;
        let frames = video_reader.read_frames(store, &video.source_path, &frame_indices)?;
        let progress = ui.frames(&format!("extract {cam_name}"), frames.len() as u64);
        for (frame_number, image) in &frames {
            let out_path = ctx
                .frame_dir
                .join(cam_name)
                .join(format!("{frame_number:06}.jpg"));
            store.put(&out_path, &vis::encode_jpeg(image)?)?;
            progress.inc();
        }
        progress.finish();
    }

    // Synchronize everything onto the common frame-index timeline.
    let ego_frames = EgoFrameIndex::scan(store, &ctx.frame_dir, ego_id, &config.inputs.ego_streams)?;
    let ego_trajectory_path = config
        .inputs
        .ego_trajectory_path
        .as_ref()
        .ok_or_else(|| anyhow!("inputs.ego_trajectory_path must be set for preprocess"))?;
    let exo_trajectory_path = config
        .inputs
        .exo_trajectory_path
        .as_ref()
        .ok_or_else(|| anyhow!("inputs.exo_trajectory_path must be set for preprocess"))?;
    let ego_trajectory = CsvTable::from_store(store, ego_trajectory_path)?;
    let exo_trajectory = CsvTable::from_store(store, exo_trajectory_path)?;

    let synchronizer = TimestampSynchronizer {
        timesync: &timesync,
        ego_trajectory: &ego_trajectory,
        exo_trajectory: &exo_trajectory,
        ego_frames: &ego_frames,
        ego_id,
        ego_streams: &config.inputs.ego_streams,
        stream_names: &config.inputs.ego_stream_names,
        exo_cam_names: &ctx.exo_cam_names,
        name_remap: config.inputs.exo_timesync_name_to_calib_name.as_ref(),
    };
    let frames = {
        let _stage = ui.stage("Synchronize streams");
        synchronizer.synchronize(i1, i2)?
    };

    let table = SyncedFrameTable {
        cache_dir: ctx.cache_rel_dir.display().to_string(),
        dataset_dir: ctx.dataset_rel_dir.display().to_string(),
        frames,
    };
    table.save(store, &ctx.dataset_json_path)?;
    log::info!(
        "wrote {} ({} frames)",
        ctx.dataset_json_path.display(),
        table.len()
    );
    Ok(())
}
