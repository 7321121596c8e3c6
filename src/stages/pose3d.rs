//! Pose3d stage: multi-view triangulation.
//!
//! One fused 3D pose per synchronized index, triangulated from every
//! exocentric view's 2D keypoints. The pose is projected back into each
//! camera for the per-camera vis sequence that multi_view_vis composites.

use anyhow::Result;

use crate::camera::{CameraView, PinholeCamera};
use crate::context::Context;
use crate::models::Keypoints2d;
use crate::stages::{require_artifact, Pose2dTable, Pose3dTable, StageToolkit};
use crate::sync::SyncedFrameTable;
use crate::vis;
use crate::Mode;

pub fn run(ctx: &Context, toolkit: &mut StageToolkit) -> Result<()> {
    let StageToolkit {
        store,
        triangulator,
        ui,
        ..
    } = toolkit;
    let store = store.as_ref();

    require_artifact(store, &ctx.pose2d_artifact(), Mode::Pose2d)?;
    let dataset = SyncedFrameTable::load(store, &ctx.dataset_json_path)?;
    let poses2d = Pose2dTable::load(store, &ctx.pose2d_artifact(), Mode::Pose2d)?;

    let mut table = Pose3dTable::new(Mode::Pose3d);
    let progress = ui.frames("pose3d", dataset.len() as u64);
    for (index, record) in dataset.frames.iter().enumerate() {
        let index = index as u64;

        let mut views = std::collections::BTreeMap::new();
        for cam_name in &ctx.exo_cam_names {
            let view = record.view(cam_name)?;
            views.insert(
                cam_name.clone(),
                (view.camera.clone(), poses2d.get(index, cam_name).cloned()),
            );
        }
        let pose3d = triangulator.triangulate(&views)?;

        for cam_name in &ctx.exo_cam_names {
            let view = record.view(cam_name)?;
            let camera = PinholeCamera::from_descriptor(&view.camera);
            let points_3d: Vec<nalgebra::Point3<f64>> = pose3d
                .iter()
                .map(|kp| nalgebra::Point3::new(kp[0], kp[1], kp[2]))
                .collect();
            let projected: Keypoints2d = camera
                .project(&points_3d)
                .iter()
                .zip(&pose3d)
                .map(|(p, kp)| [p.x, p.y, kp[3]])
                .collect();

            let image_path = ctx.frame_dir.join(&view.frame_path);
            let mut image = vis::decode_image(&store.get(&image_path)?)?;
            vis::draw_keypoints(&mut image, &projected, 0.3, vis::RED);
            store.put(
                &ctx.vis_pose3d_dir.join(cam_name).join(format!("{index:05}.jpg")),
                &vis::encode_jpeg(&image)?,
            )?;
        }

        table.entries.insert(index, pose3d);
        progress.inc();
    }
    progress.finish();

    table.save(store, &ctx.pose3d_artifact())?;
    log::info!("wrote {}", ctx.pose3d_artifact().display());
    Ok(())
}
