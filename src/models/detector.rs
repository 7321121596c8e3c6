//! Person detector interface.

use std::path::Path;

use anyhow::Result;

/// One detection: `[x1, y1, x2, y2]` plus the detector's own score.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: [f64; 4],
    pub score: f64,
}

/// Detector backend trait.
///
/// The pipeline hands the detector a geometric proposal box (confidence
/// appended) as a search region; the detector's own output, not the
/// proposal, is what gets recorded. An empty result means no person in
/// this view - an expected per-camera outcome, not an error.
pub trait PersonDetector {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one image, restricted to the proposal regions.
    /// `proposals` are `[x1, y1, x2, y2, confidence]`.
    fn detect(&mut self, image_path: &Path, proposals: &[[f64; 5]]) -> Result<Vec<Detection>>;
}
