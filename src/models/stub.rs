//! Stub model backends for testing and pipeline plumbing.
//!
//! All three are deterministic: identical inputs produce identical outputs,
//! so stage artifacts built against the stubs are byte-for-byte reproducible.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use crate::camera::CameraDescriptor;
use crate::models::detector::{Detection, PersonDetector};
use crate::models::pose2d::{Keypoints2d, PoseEstimator2d, KEYPOINT_COUNT};
use crate::models::triangulator::{Pose3d, TriangulationBackend};

/// Echoes each proposal region back as a detection.
pub struct StubDetector;

impl StubDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image_path: &Path, proposals: &[[f64; 5]]) -> Result<Vec<Detection>> {
        Ok(proposals
            .iter()
            .map(|p| Detection {
                bbox: [p[0], p[1], p[2], p[3]],
                score: 0.9,
            })
            .collect())
    }
}

/// Places the 17 keypoints evenly down the vertical center line of the bbox.
pub struct StubPoseEstimator;

impl StubPoseEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubPoseEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseEstimator2d for StubPoseEstimator {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn estimate(&mut self, _image_path: &Path, bbox: [f64; 5]) -> Result<Keypoints2d> {
        let [x1, y1, x2, y2, _] = bbox;
        let center_x = (x1 + x2) / 2.0;
        let height = y2 - y1;
        Ok((0..KEYPOINT_COUNT)
            .map(|k| {
                let fraction = (k as f64 + 1.0) / (KEYPOINT_COUNT as f64 + 1.0);
                [center_x, y1 + fraction * height, 1.0]
            })
            .collect())
    }
}

/// Averages normalized keypoint positions across views onto a fixed plane.
/// Placeholder fusion; real triangulation is an external collaborator.
pub struct StubTriangulator;

impl StubTriangulator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubTriangulator {
    fn default() -> Self {
        Self::new()
    }
}

impl TriangulationBackend for StubTriangulator {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn triangulate(
        &mut self,
        views: &BTreeMap<String, (CameraDescriptor, Option<Keypoints2d>)>,
    ) -> Result<Pose3d> {
        let mut pose = vec![[0.0f64; 4]; KEYPOINT_COUNT];
        for k in 0..KEYPOINT_COUNT {
            let mut x = 0.0;
            let mut y = 0.0;
            let mut confidence = 0.0;
            let mut count = 0usize;
            for (camera, keypoints) in views.values() {
                let Some(keypoints) = keypoints else { continue };
                let Some(kp) = keypoints.get(k) else { continue };
                x += kp[0] / camera.image_width as f64;
                y += kp[1] / camera.image_height as f64;
                confidence += kp[2];
                count += 1;
            }
            if count > 0 {
                let n = count as f64;
                pose[k] = [x / n, y / n, 0.0, confidence / n];
            }
        }
        Ok(pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_detector_echoes_proposals() {
        let mut detector = StubDetector::new();
        let detections = detector
            .detect(Path::new("img.jpg"), &[[10.0, 20.0, 110.0, 220.0, 1.0]])
            .expect("detect");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, [10.0, 20.0, 110.0, 220.0]);
        assert!(detector.detect(Path::new("img.jpg"), &[]).expect("detect").is_empty());
    }

    #[test]
    fn stub_pose_fills_the_bbox_vertically() {
        let mut estimator = StubPoseEstimator::new();
        let keypoints = estimator
            .estimate(Path::new("img.jpg"), [100.0, 0.0, 200.0, 180.0, 1.0])
            .expect("estimate");
        assert_eq!(keypoints.len(), KEYPOINT_COUNT);
        assert!(keypoints.iter().all(|kp| kp[0] == 150.0));
        assert!(keypoints[0][1] < keypoints[16][1]);
        assert!(keypoints[16][1] < 180.0);
    }

    #[test]
    fn stub_triangulator_skips_absent_views() {
        let camera = CameraDescriptor {
            name: "cam01".to_string(),
            image_width: 100,
            image_height: 100,
            position: [0.0, 0.0, 0.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
            focal: [100.0, 100.0],
            principal_point: [50.0, 50.0],
        };
        let keypoints: Keypoints2d = (0..KEYPOINT_COUNT).map(|_| [50.0, 50.0, 0.8]).collect();
        let views: BTreeMap<String, (CameraDescriptor, Option<Keypoints2d>)> = [
            ("cam01".to_string(), (camera.clone(), Some(keypoints))),
            ("cam02".to_string(), (camera, None)),
        ]
        .into_iter()
        .collect();

        let mut triangulator = StubTriangulator::new();
        let pose = triangulator.triangulate(&views).expect("triangulate");
        assert_eq!(pose.len(), KEYPOINT_COUNT);
        assert!((pose[0][0] - 0.5).abs() < 1e-12);
        assert!((pose[0][3] - 0.8).abs() < 1e-12);
    }
}
