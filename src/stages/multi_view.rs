//! Multi-view composite rendering.
//!
//! Tiles every camera's pose3d vis sequence into a 2-column grid per frame,
//! then muxes the composites into one video. The frame list comes from the
//! first camera; a frame present for the first camera but missing for any
//! other is a hard error - the grid assumes dense, equal-length sequences.

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::context::Context;
use crate::stages::{require_artifact, StageToolkit};
use crate::storage::ArtifactStore;
use crate::vis;
use crate::Mode;

#[derive(Clone, Copy, Debug)]
pub struct CompositorSettings {
    /// Per-cell reference resolution every camera image is resized to.
    pub read_width: u32,
    pub read_height: u32,
    /// Final composite resolution. Must be even in both dimensions; the
    /// muxer rejects odd frame sizes.
    pub write_width: u32,
    pub write_height: u32,
    pub padding: u32,
    pub fps: u32,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            read_width: 3840,
            read_height: 2160,
            write_width: 3840,
            write_height: 2160,
            padding: 5,
            fps: 30,
        }
    }
}

pub fn run(ctx: &Context, toolkit: &mut StageToolkit) -> Result<()> {
    let StageToolkit { store, muxer, ui, .. } = toolkit;
    let store = store.as_ref();

    require_artifact(store, &ctx.pose3d_artifact(), Mode::Pose3d)?;

    let settings = CompositorSettings::default();
    let write_dir = ctx.vis_pose3d_dir.join("multi_view");
    let image_names = {
        let _stage = ui.stage("Compose multi-view frames");
        compose_frames(
            store,
            &ctx.vis_pose3d_dir,
            &write_dir,
            &ctx.exo_cam_names,
            &settings,
        )?
    };
    log::info!("composited {} frames", image_names.len());

    let output = ctx.vis_pose3d_dir.join("exo.mp4");
    {
        let _stage = ui.stage("Mux composite video");
        muxer.mux(store, &write_dir, &output, settings.fps)?;
    }
    log::info!("wrote {}", output.display());
    Ok(())
}

/// Tile each frame of every camera into one composite. Returns the composed
/// image names, in timeline order.
pub fn compose_frames(
    store: &dyn ArtifactStore,
    read_dir: &Path,
    write_dir: &Path,
    camera_names: &[String],
    settings: &CompositorSettings,
) -> Result<Vec<String>> {
    let first_camera = camera_names
        .first()
        .ok_or_else(|| anyhow!("no cameras to composite"))?;
    let image_names: Vec<String> = store
        .list(&read_dir.join(first_camera))?
        .into_iter()
        .filter(|name| name.ends_with(".jpg"))
        .collect();

    let columns = 2u32;
    let rows = (camera_names.len() as u32 + columns - 1) / columns;
    // Even-dimensioned intermediate before the final resize; the grid with
    // padding is generally odd-sized.
    let total_width = columns * settings.read_width;
    let total_height = rows * settings.read_height;

    store.create_dir_all(write_dir)?;
    for image_name in &image_names {
        let mut cells = Vec::with_capacity(camera_names.len());
        for camera_name in camera_names {
            let path = read_dir.join(camera_name).join(image_name);
            if !store.exists(&path) {
                return Err(anyhow!(
                    "camera `{}` is missing frame image `{}` present for `{}`",
                    camera_name,
                    image_name,
                    first_camera
                ));
            }
            let image = vis::decode_image(&store.get(&path)?)?;
            cells.push(vis::resize_to(&image, settings.read_width, settings.read_height));
        }

        let canvas = vis::tile_grid(&cells, settings.read_width, settings.read_height, settings.padding);
        let canvas = vis::resize_to(&canvas, total_width, total_height);
        let canvas = vis::resize_to(&canvas, settings.write_width, settings.write_height);
        store.put(&write_dir.join(image_name), &vis::encode_jpeg(&canvas)?)?;
    }
    Ok(image_names)
}
