//! Visualization drawing and image helpers.
//!
//! Per-frame overlays (proposal boxes, keypoints, projected skeletons) and
//! the grid-canvas assembly used by the multi-view compositor. Drawing is
//! plain pixel writes on `RgbImage`; everything is bounds-checked so
//! off-image annotations are silently clipped.

use std::io::Cursor;

use anyhow::{Context as _, Result};
use image::{imageops, ImageFormat, Rgb, RgbImage};

use crate::models::pose2d::{Keypoints2d, COCO_SKELETON};

pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

pub fn decode_image(raw: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(raw).context("decode image")?;
    Ok(image.to_rgb8())
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut raw), ImageFormat::Jpeg)
        .context("encode jpeg")?;
    Ok(raw)
}

fn put_pixel_checked(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

pub fn draw_bbox_xyxy(image: &mut RgbImage, bbox: [i32; 4], color: Rgb<u8>, thickness: i32) {
    let [x1, y1, x2, y2] = bbox.map(i64::from);
    for t in 0..thickness as i64 {
        for x in x1..=x2 {
            put_pixel_checked(image, x, y1 + t, color);
            put_pixel_checked(image, x, y2 - t, color);
        }
        for y in y1..=y2 {
            put_pixel_checked(image, x1 + t, y, color);
            put_pixel_checked(image, x2 - t, y, color);
        }
    }
}

pub fn draw_point(image: &mut RgbImage, x: f64, y: f64, color: Rgb<u8>, radius: i64) {
    let (cx, cy) = (x.round() as i64, y.round() as i64);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_checked(image, cx + dx, cy + dy, color);
            }
        }
    }
}

fn draw_line(image: &mut RgbImage, from: (f64, f64), to: (f64, f64), color: Rgb<u8>) {
    let (mut x0, mut y0) = (from.0.round() as i64, from.1.round() as i64);
    let (x1, y1) = (to.0.round() as i64, to.1.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_pixel_checked(image, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Keypoint dots plus the COCO skeleton edges. Low-confidence keypoints
/// (below `min_confidence`) are skipped.
pub fn draw_keypoints(
    image: &mut RgbImage,
    keypoints: &Keypoints2d,
    min_confidence: f64,
    color: Rgb<u8>,
) {
    for (a, b) in COCO_SKELETON {
        let (Some(ka), Some(kb)) = (keypoints.get(a), keypoints.get(b)) else {
            continue;
        };
        if ka[2] >= min_confidence && kb[2] >= min_confidence {
            draw_line(image, (ka[0], ka[1]), (kb[0], kb[1]), color);
        }
    }
    for kp in keypoints {
        if kp[2] >= min_confidence {
            draw_point(image, kp[0], kp[1], color, 3);
        }
    }
}

/// Tile per-camera images into a 2-column grid on a white canvas.
///
/// Every image must already be `cell_width` x `cell_height`; cells are
/// separated by `padding` pixels.
pub fn tile_grid(
    images: &[RgbImage],
    cell_width: u32,
    cell_height: u32,
    padding: u32,
) -> RgbImage {
    let columns = 2u32;
    let rows = (images.len() as u32 + columns - 1) / columns;
    let canvas_width = columns * cell_width + (columns - 1) * padding;
    let canvas_height = rows * cell_height + rows.saturating_sub(1) * padding;
    let mut canvas = RgbImage::from_pixel(canvas_width, canvas_height, WHITE);
    for (index, cell) in images.iter().enumerate() {
        let col = index as u32 % columns;
        let row = index as u32 / columns;
        let origin_x = col * (cell_width + padding);
        let origin_y = row * (cell_height + padding);
        imageops::overlay(&mut canvas, cell, origin_x as i64, origin_y as i64);
    }
    canvas
}

/// Resize to exactly `width` x `height`.
pub fn resize_to(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.width() == width && image.height() == height {
        return image.clone();
    }
    imageops::resize(image, width, height, imageops::FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_round_trip_keeps_dimensions() {
        let image = RgbImage::from_pixel(32, 24, Rgb([10, 200, 30]));
        let raw = encode_jpeg(&image).expect("encode");
        let decoded = decode_image(&raw).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn bbox_drawing_clips_to_the_image() {
        let mut image = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        draw_bbox_xyxy(&mut image, [-10, -10, 70, 70], GREEN, 2);
        draw_point(&mut image, 25.0, 25.0, RED, 4);
        assert_eq!(*image.get_pixel(25, 25), RED);
    }

    #[test]
    fn grid_of_four_is_two_by_two_with_padding() {
        let cells: Vec<RgbImage> = (0..4)
            .map(|i| RgbImage::from_pixel(10, 8, Rgb([i as u8 * 60, 0, 0])))
            .collect();
        let canvas = tile_grid(&cells, 10, 8, 5);
        assert_eq!((canvas.width(), canvas.height()), (25, 21));
        // Top-left pixel of each cell.
        assert_eq!(*canvas.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*canvas.get_pixel(15, 0), Rgb([60, 0, 0]));
        assert_eq!(*canvas.get_pixel(0, 13), Rgb([120, 0, 0]));
        assert_eq!(*canvas.get_pixel(15, 13), Rgb([180, 0, 0]));
        // Padding stays white.
        assert_eq!(*canvas.get_pixel(12, 0), WHITE);
        assert_eq!(*canvas.get_pixel(0, 10), WHITE);
    }

    #[test]
    fn grid_of_three_still_has_two_rows() {
        let cells: Vec<RgbImage> = (0..3).map(|_| RgbImage::from_pixel(10, 8, WHITE)).collect();
        let canvas = tile_grid(&cells, 10, 8, 5);
        assert_eq!((canvas.width(), canvas.height()), (25, 21));
    }
}
