//! Pose2d stage: per-camera 2D keypoint estimation inside the bbox-stage
//! boxes. A camera with no recorded bbox gets an absent pose and an
//! unannotated vis frame.

use anyhow::Result;

use crate::context::Context;
use crate::stages::{require_artifact, BBoxTable, Pose2dTable, StageToolkit};
use crate::sync::SyncedFrameTable;
use crate::vis;
use crate::Mode;

pub fn run(ctx: &Context, toolkit: &mut StageToolkit) -> Result<()> {
    let StageToolkit {
        store,
        pose_estimator,
        ui,
        ..
    } = toolkit;
    let store = store.as_ref();

    require_artifact(store, &ctx.bbox_artifact(), Mode::Bbox)?;
    let dataset = SyncedFrameTable::load(store, &ctx.dataset_json_path)?;
    let bboxes = BBoxTable::load(store, &ctx.bbox_artifact(), Mode::Bbox)?;

    let mut table = Pose2dTable::new(Mode::Pose2d);
    let progress = ui.frames("pose2d", dataset.len() as u64);
    for (index, record) in dataset.frames.iter().enumerate() {
        let index = index as u64;
        for cam_name in &ctx.exo_cam_names {
            let view = record.view(cam_name)?;
            let image_path = ctx.frame_dir.join(&view.frame_path);

            let keypoints = match bboxes.get(index, cam_name) {
                Some(bbox) => {
                    let bbox = [
                        bbox[0] as f64,
                        bbox[1] as f64,
                        bbox[2] as f64,
                        bbox[3] as f64,
                        1.0,
                    ];
                    Some(pose_estimator.estimate(&image_path, bbox)?)
                }
                None => None,
            };

            let mut image = vis::decode_image(&store.get(&image_path)?)?;
            if let Some(keypoints) = &keypoints {
                vis::draw_keypoints(&mut image, keypoints, 0.3, vis::GREEN);
            }
            store.put(
                &ctx.vis_pose2d_dir.join(cam_name).join(format!("{index:05}.jpg")),
                &vis::encode_jpeg(&image)?,
            )?;

            table
                .entries
                .entry(index)
                .or_default()
                .insert(cam_name.clone(), keypoints);
        }
        progress.inc();
    }
    progress.finish();

    table.save(store, &ctx.pose2d_artifact())?;
    log::info!("wrote {}", ctx.pose2d_artifact().display());
    Ok(())
}
