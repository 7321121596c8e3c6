//! 2D pose estimator interface and the COCO-17 keypoint layout.

use std::path::Path;

use anyhow::Result;

pub const KEYPOINT_COUNT: usize = 17;

/// COCO keypoint order shared by the 2D and 3D tables.
pub const COCO_KEYPOINT_NAMES: [&str; KEYPOINT_COUNT] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// Limb edges over the COCO keypoint indices, for skeleton drawing.
pub const COCO_SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    (5, 11),
    (6, 12),
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
];

/// 17 keypoints, `[x, y, confidence]` each, in COCO order.
pub type Keypoints2d = Vec<[f64; 3]>;

/// 2D pose estimator backend trait.
///
/// Runs on one image restricted to one person bbox (`[x1, y1, x2, y2,
/// confidence]`) and returns the 17 COCO keypoints.
pub trait PoseEstimator2d {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn estimate(&mut self, image_path: &Path, bbox: [f64; 5]) -> Result<Keypoints2d>;
}
