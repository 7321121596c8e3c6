//! External model interfaces.
//!
//! The learned person detector, the 2D pose estimator and the multi-view
//! triangulator are external collaborators; these traits are the interfaces
//! the pipeline needs from them. Deterministic stub backends ship for tests
//! and for running the pipeline plumbing without model weights.
//!
//! Backends are selected by the configured name; asking for a backend that
//! is not compiled in is an error at stage start, before any I/O.

pub mod detector;
pub mod pose2d;
pub mod stub;
pub mod triangulator;

pub use detector::{Detection, PersonDetector};
pub use pose2d::{Keypoints2d, PoseEstimator2d, COCO_KEYPOINT_NAMES, COCO_SKELETON, KEYPOINT_COUNT};
pub use stub::{StubDetector, StubPoseEstimator, StubTriangulator};
pub use triangulator::{Pose3d, TriangulationBackend};

use anyhow::{anyhow, Result};

pub fn select_detector(name: &str) -> Result<Box<dyn PersonDetector>> {
    match name {
        "stub" => Ok(Box::new(StubDetector::new())),
        other => Err(anyhow!("detector backend `{}` is not compiled in", other)),
    }
}

pub fn select_pose_estimator(name: &str) -> Result<Box<dyn PoseEstimator2d>> {
    match name {
        "stub" => Ok(Box::new(StubPoseEstimator::new())),
        other => Err(anyhow!("pose backend `{}` is not compiled in", other)),
    }
}

pub fn select_triangulator(name: &str) -> Result<Box<dyn TriangulationBackend>> {
    match name {
        "stub" => Ok(Box::new(StubTriangulator::new())),
        other => Err(anyhow!(
            "triangulation backend `{}` is not compiled in",
            other
        )),
    }
}
