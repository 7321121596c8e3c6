//! BBox stage: geometric region proposal -> external detector -> validation.
//!
//! The ground plane is fit once from the exocentric camera centers (the rig
//! is static). Per frame and camera, a human-height cylinder anchored at the
//! egocentric SLAM midpoint is projected into the camera, validated into a
//! proposal box, and handed to the detector as a search region. The
//! detector's own box - not the proposal - is what gets recorded; a rejected
//! proposal or an empty detection is recorded as absent and the run
//! continues.

use anyhow::{anyhow, Result};
use nalgebra::Point3;

use crate::camera::{CameraView, PinholeCamera};
use crate::context::Context;
use crate::geometry::{check_and_convert_bbox, fit_camera_plane, region_proposal, BBoxThresholds};
use crate::stages::{require_artifact, BBoxTable, StageToolkit};
use crate::sync::SyncedFrameTable;
use crate::vis;
use crate::Mode;

/// Record-key suffixes of the stereo SLAM streams whose midpoint anchors the
/// proposal volume.
const ANCHOR_SUFFIXES: (&str, &str) = ("slam_left", "slam_right");

pub fn run(ctx: &Context, toolkit: &mut StageToolkit) -> Result<()> {
    let StageToolkit {
        store,
        detector,
        ui,
        ..
    } = toolkit;
    let store = store.as_ref();

    require_artifact(store, &ctx.dataset_json_path, Mode::Preprocess)?;
    let dataset = SyncedFrameTable::load(store, &ctx.dataset_json_path)?;
    if dataset.is_empty() {
        return Err(anyhow!("synced frame table is empty"));
    }

    // Static rig: one plane fit, reused for every frame.
    let first = &dataset.frames[0];
    let centers: Vec<Point3<f64>> = ctx
        .exo_cam_names
        .iter()
        .map(|cam| first.view(cam).map(|view| view.camera.center()))
        .collect::<Result<_>>()?;
    let plane = fit_camera_plane(&centers)?;
    log::info!(
        "camera plane normal: [{:.4}, {:.4}, {:.4}]",
        plane.unit_normal.x,
        plane.unit_normal.y,
        plane.unit_normal.z
    );

    let left_key = format!("{}_{}", ctx.metadata.ego_id, ANCHOR_SUFFIXES.0);
    let right_key = format!("{}_{}", ctx.metadata.ego_id, ANCHOR_SUFFIXES.1);
    let thresholds = BBoxThresholds::default();

    let mut table = BBoxTable::new(Mode::Bbox);
    let progress = ui.frames("bbox", dataset.len() as u64);
    for (index, record) in dataset.frames.iter().enumerate() {
        let index = index as u64;
        let left = record.view(&left_key)?;
        let right = record.view(&right_key)?;
        let anchor = Point3::from((left.camera.center().coords + right.camera.center().coords) / 2.0);
        let proposal = region_proposal(&anchor, &plane.unit_normal, ctx.human_height, None)?;

        for cam_name in &ctx.exo_cam_names {
            let view = record.view(cam_name)?;
            let camera = PinholeCamera::from_descriptor(&view.camera);
            let points_2d = camera.project(&proposal);
            let (width, height) = camera.image_size();
            let proposal_bbox = check_and_convert_bbox(&points_2d, width, height, &thresholds);

            let image_path = ctx.frame_dir.join(&view.frame_path);
            let mut bbox_xyxy: Option<[i32; 4]> = None;
            if let Some(p) = proposal_bbox {
                let proposals = [[p[0] as f64, p[1] as f64, p[2] as f64, p[3] as f64, 1.0]];
                let detections = detector.detect(&image_path, &proposals)?;
                // Single human per scene: the first detection wins.
                bbox_xyxy = detections.first().map(|d| {
                    [
                        d.bbox[0].round() as i32,
                        d.bbox[1].round() as i32,
                        d.bbox[2].round() as i32,
                        d.bbox[3].round() as i32,
                    ]
                });
            }

            // Vis side effect, written whether or not anything was detected.
            let mut image = vis::decode_image(&store.get(&image_path)?)?;
            if let Some(bbox) = bbox_xyxy {
                vis::draw_bbox_xyxy(&mut image, bbox, vis::GREEN, 4);
            }
            store.put(
                &ctx.vis_bbox_dir.join(cam_name).join(format!("{index:05}.jpg")),
                &vis::encode_jpeg(&image)?,
            )?;

            table
                .entries
                .entry(index)
                .or_default()
                .insert(cam_name.clone(), bbox_xyxy);
        }
        progress.inc();
    }
    progress.finish();

    table.save(store, &ctx.bbox_artifact())?;
    log::info!("wrote {}", ctx.bbox_artifact().display());
    Ok(())
}
