//! Camera interface.
//!
//! Camera-model construction and world-to-image projection are external
//! collaborators; `CameraView` is the interface the pipeline needs from them
//! (center, image size, batch projection). `PinholeCamera` is the reference
//! implementation used for exocentric views and by the tests.

use nalgebra::{Point2, Point3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_IMAGE_WIDTH: u32 = 3840;
const DEFAULT_IMAGE_HEIGHT: u32 = 2160;

/// Serializable camera description attached to every view entry: pose row
/// fields resolved into position/orientation plus pinhole intrinsics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub name: String,
    pub image_width: u32,
    pub image_height: u32,
    /// Camera center in world coordinates.
    pub position: [f64; 3],
    /// World-from-camera rotation, quaternion `[x, y, z, w]`.
    pub orientation: [f64; 4],
    pub focal: [f64; 2],
    pub principal_point: [f64; 2],
}

impl CameraDescriptor {
    /// Build from a trajectory-table row. Pose columns follow the
    /// `{t,q}{x,y,z,w}_world_{kind}` convention (`kind` is `device` for the
    /// ego rig, `cam` for exocentric cameras); intrinsic columns are optional
    /// and default to a 4K pinhole when absent.
    pub fn from_pose_row(
        name: &str,
        row: &BTreeMap<String, String>,
        kind: &str,
    ) -> anyhow::Result<Self> {
        let field = |key: String| -> anyhow::Result<f64> {
            let raw = row
                .get(&key)
                .ok_or_else(|| anyhow::anyhow!("pose row for `{}` has no column `{}`", name, key))?;
            raw.parse::<f64>()
                .map_err(|_| anyhow::anyhow!("pose row for `{}`: `{}` is not a number: `{}`", name, key, raw))
        };
        let optional = |key: &str, default: f64| -> f64 {
            row.get(key)
                .and_then(|raw| raw.parse::<f64>().ok())
                .unwrap_or(default)
        };

        let position = [
            field(format!("tx_world_{kind}"))?,
            field(format!("ty_world_{kind}"))?,
            field(format!("tz_world_{kind}"))?,
        ];
        let orientation = [
            field(format!("qx_world_{kind}"))?,
            field(format!("qy_world_{kind}"))?,
            field(format!("qz_world_{kind}"))?,
            field(format!("qw_world_{kind}"))?,
        ];
        let image_width = optional("image_width", DEFAULT_IMAGE_WIDTH as f64) as u32;
        let image_height = optional("image_height", DEFAULT_IMAGE_HEIGHT as f64) as u32;
        // A plausible 4K focal when calibration does not carry intrinsics.
        let default_focal = image_width.max(image_height) as f64 * 0.46;
        Ok(Self {
            name: name.to_string(),
            image_width,
            image_height,
            position,
            orientation,
            focal: [optional("fx", default_focal), optional("fy", default_focal)],
            principal_point: [
                optional("cx", image_width as f64 / 2.0),
                optional("cy", image_height as f64 / 2.0),
            ],
        })
    }

    pub fn center(&self) -> Point3<f64> {
        Point3::new(self.position[0], self.position[1], self.position[2])
    }
}

/// What the pipeline needs from a camera model.
pub trait CameraView {
    /// Camera center in world coordinates.
    fn center(&self) -> Point3<f64>;

    fn image_size(&self) -> (u32, u32);

    /// Batch world-to-image projection. Points behind the camera map to
    /// far-outside coordinates so downstream bbox validation rejects them.
    fn project(&self, points: &[Point3<f64>]) -> Vec<Point2<f64>>;
}

/// Distortion-free pinhole camera.
pub struct PinholeCamera {
    center: Point3<f64>,
    cam_from_world: Rotation3<f64>,
    focal: [f64; 2],
    principal_point: [f64; 2],
    image_width: u32,
    image_height: u32,
}

const BEHIND_CAMERA: f64 = -1.0e6;

impl PinholeCamera {
    pub fn from_descriptor(descriptor: &CameraDescriptor) -> Self {
        let [qx, qy, qz, qw] = descriptor.orientation;
        let world_from_cam =
            UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self {
            center: descriptor.center(),
            cam_from_world: world_from_cam.to_rotation_matrix().inverse(),
            focal: descriptor.focal,
            principal_point: descriptor.principal_point,
            image_width: descriptor.image_width,
            image_height: descriptor.image_height,
        }
    }
}

impl CameraView for PinholeCamera {
    fn center(&self) -> Point3<f64> {
        self.center
    }

    fn image_size(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    fn project(&self, points: &[Point3<f64>]) -> Vec<Point2<f64>> {
        points
            .iter()
            .map(|p| {
                let local: Vector3<f64> = self.cam_from_world * (p - self.center);
                if local.z <= 1e-9 {
                    return Point2::new(BEHIND_CAMERA, BEHIND_CAMERA);
                }
                Point2::new(
                    self.focal[0] * local.x / local.z + self.principal_point[0],
                    self.focal[1] * local.y / local.z + self.principal_point[1],
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis_aligned_camera() -> CameraDescriptor {
        CameraDescriptor {
            name: "cam01".to_string(),
            image_width: 640,
            image_height: 480,
            position: [0.0, 0.0, 0.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
            focal: [100.0, 100.0],
            principal_point: [320.0, 240.0],
        }
    }

    #[test]
    fn identity_camera_projects_through_the_principal_point() {
        let camera = PinholeCamera::from_descriptor(&axis_aligned_camera());
        let projected = camera.project(&[
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(0.0, -1.0, 2.0),
        ]);
        assert_eq!(projected[0], Point2::new(320.0, 240.0));
        assert_eq!(projected[1], Point2::new(370.0, 240.0));
        assert_eq!(projected[2], Point2::new(320.0, 190.0));
    }

    #[test]
    fn points_behind_the_camera_land_far_outside() {
        let camera = PinholeCamera::from_descriptor(&axis_aligned_camera());
        let projected = camera.project(&[Point3::new(0.0, 0.0, -2.0)]);
        assert!(projected[0].x < -1.0e5);
    }

    #[test]
    fn descriptor_from_pose_row_with_defaults() {
        let mut row = BTreeMap::new();
        for (key, value) in [
            ("tx_world_cam", "1.0"),
            ("ty_world_cam", "2.0"),
            ("tz_world_cam", "3.0"),
            ("qx_world_cam", "0.0"),
            ("qy_world_cam", "0.0"),
            ("qz_world_cam", "0.0"),
            ("qw_world_cam", "1.0"),
        ] {
            row.insert(key.to_string(), value.to_string());
        }
        let descriptor = CameraDescriptor::from_pose_row("cam01", &row, "cam").expect("descriptor");
        assert_eq!(descriptor.center(), Point3::new(1.0, 2.0, 3.0));
        assert_eq!(descriptor.image_width, 3840);

        let missing = CameraDescriptor::from_pose_row("cam01", &BTreeMap::new(), "cam");
        assert!(missing.is_err());
    }
}
