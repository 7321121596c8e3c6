//! Multi-view triangulation interface.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::camera::CameraDescriptor;
use crate::models::pose2d::Keypoints2d;

/// One triangulated pose: 17 keypoints, `[x, y, z, confidence]` each, in
/// COCO order. One per frame index - triangulation fuses all exocentric
/// views.
pub type Pose3d = Vec<[f64; 4]>;

/// Triangulation backend trait.
///
/// Receives every exocentric view for one synchronized frame: camera
/// descriptor plus that camera's 2D keypoints, absent where the pose2d
/// stage recorded no detection. The backend decides how to fuse views with
/// missing keypoints.
pub trait TriangulationBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn triangulate(
        &mut self,
        views: &BTreeMap<String, (CameraDescriptor, Option<Keypoints2d>)>,
    ) -> Result<Pose3d>;
}
