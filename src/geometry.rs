//! Camera-geometry primitives: ground-plane fit, cylinder region proposal,
//! projected-bbox validation.
//!
//! These are pure functions. The rig is static, so the plane fit runs once
//! per run and its normal is reused for every frame.

use anyhow::Result;
use nalgebra::{DMatrix, Point2, Point3, Vector3};

use crate::PipelineError;

const CYLINDER_SEGMENTS: usize = 32;
const DEFAULT_PROPOSAL_RADIUS: f64 = 0.4;
const COLLINEARITY_TOLERANCE: f64 = 1e-9;

/// Best-fit plane `ax + by + cz + d = 0` over a point set, with its unit
/// normal.
#[derive(Clone, Debug)]
pub struct GroundPlane {
    pub coefficients: [f64; 4],
    pub unit_normal: Vector3<f64>,
}

fn degenerate(message: impl Into<String>) -> anyhow::Error {
    PipelineError::DegenerateGeometry {
        message: message.into(),
    }
    .into()
}

/// Least-squares plane fit over the exocentric camera centers.
///
/// Centroid + SVD of the centered point matrix; the normal is the singular
/// vector of the smallest singular value. Fails for fewer than 3 points or
/// collinear points, where the plane is undefined.
pub fn fit_camera_plane(points: &[Point3<f64>]) -> Result<GroundPlane> {
    if points.len() < 3 {
        return Err(degenerate(format!(
            "plane fit needs at least 3 points, got {}",
            points.len()
        )));
    }

    let n = points.len() as f64;
    let centroid = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / n;

    let centered = DMatrix::from_fn(points.len(), 3, |row, col| {
        points[row].coords[col] - centroid[col]
    });
    let svd = centered.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| degenerate("plane fit: SVD did not produce V^T"))?;

    // Singular values are sorted descending; rank < 2 means the points do not
    // span a plane.
    let singular = &svd.singular_values;
    if singular[1] <= COLLINEARITY_TOLERANCE * singular[0].max(1.0) {
        return Err(degenerate("plane fit: points are collinear"));
    }

    let normal_row = v_t.row(2);
    let normal = Vector3::new(normal_row[0], normal_row[1], normal_row[2]);
    let unit_normal = normal.normalize();
    let d = -unit_normal.dot(&centroid);

    Ok(GroundPlane {
        coefficients: [unit_normal.x, unit_normal.y, unit_normal.z, d],
        unit_normal,
    })
}

/// Vertex set of the solid prior: a human-height cylinder anchored at the
/// egocentric device center.
///
/// The axis runs opposite the ground normal; the center sits half the human
/// height below the anchor along the normal, so the volume spans roughly
/// ground level to head height.
pub fn region_proposal(
    anchor: &Point3<f64>,
    unit_normal: &Vector3<f64>,
    human_height: f64,
    radius: Option<f64>,
) -> Result<Vec<Point3<f64>>> {
    let radius = radius.unwrap_or(DEFAULT_PROPOSAL_RADIUS);
    let norm = unit_normal.norm();
    if !norm.is_finite() || norm < 1e-12 {
        return Err(degenerate("region proposal: invalid ground normal"));
    }
    let normal = unit_normal / norm;
    let axis = -normal;
    let center = anchor - normal * (human_height * 0.5);

    // Orthonormal basis spanning the cylinder cross-section.
    let helper = if axis.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let e1 = axis.cross(&helper).normalize();
    let e2 = axis.cross(&e1);

    let half = axis * (human_height * 0.5);
    let mut vertices = Vec::with_capacity(CYLINDER_SEGMENTS * 2);
    for ring_offset in [-1.0, 1.0] {
        let ring_center = center + half * ring_offset;
        for segment in 0..CYLINDER_SEGMENTS {
            let theta = 2.0 * std::f64::consts::PI * segment as f64 / CYLINDER_SEGMENTS as f64;
            let rim = e1 * (radius * theta.cos()) + e2 * (radius * theta.sin());
            vertices.push(ring_center + rim);
        }
    }
    Ok(vertices)
}

#[derive(Clone, Copy, Debug)]
pub struct BBoxThresholds {
    /// Minimum bbox area as a fraction of image area.
    pub min_area_ratio: f64,
    /// Aspect ratio (height/width) bounds.
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
}

impl Default for BBoxThresholds {
    fn default() -> Self {
        Self {
            min_area_ratio: 0.005,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 5.0,
        }
    }
}

/// Convert projected proposal points into a sanity-checked bbox, or reject.
///
/// `None` is the expected per-camera outcome when the proposal is out of
/// frame, too small, or too skewed (a sliver seen edge-on); it is not an
/// error.
pub fn check_and_convert_bbox(
    points: &[Point2<f64>],
    image_width: u32,
    image_height: u32,
    thresholds: &BBoxThresholds,
) -> Option<[i32; 4]> {
    let width = image_width as f64;
    let height = image_height as f64;
    let in_frame: Vec<&Point2<f64>> = points
        .iter()
        .filter(|p| p.x >= 0.0 && p.x <= width && p.y >= 0.0 && p.y <= height)
        .collect();

    // Out of frame.
    if in_frame.is_empty() {
        return None;
    }

    let mut x1 = f64::INFINITY;
    let mut y1 = f64::INFINITY;
    let mut x2 = f64::NEG_INFINITY;
    let mut y2 = f64::NEG_INFINITY;
    for p in &in_frame {
        x1 = x1.min(p.x);
        y1 = y1.min(p.y);
        x2 = x2.max(p.x);
        y2 = y2.max(p.y);
    }

    let bbox_width = x2 - x1;
    let bbox_height = y2 - y1;
    let area_ratio = (bbox_width * bbox_height) / (width * height);
    if area_ratio < thresholds.min_area_ratio {
        return None;
    }

    let aspect_ratio = bbox_height / bbox_width;
    if aspect_ratio > thresholds.max_aspect_ratio || aspect_ratio < thresholds.min_aspect_ratio {
        return None;
    }

    Some([
        x1.round() as i32,
        y1.round() as i32,
        x2.round() as i32,
        y2.round() as i32,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_normal_is_orthogonal_to_coplanar_points() {
        let points = vec![
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(4.0, 0.0, 2.0),
            Point3::new(4.0, 3.0, 2.0),
            Point3::new(0.0, 3.0, 2.0),
        ];
        let plane = fit_camera_plane(&points).expect("plane");
        for (a, b) in [(0, 1), (1, 2), (0, 3), (2, 3)] {
            let edge = points[b] - points[a];
            assert!(
                plane.unit_normal.dot(&edge).abs() < 1e-9,
                "normal not orthogonal to edge {:?}",
                edge
            );
        }
        assert!((plane.unit_normal.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn plane_fit_rejects_degenerate_input() {
        let two = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        assert!(fit_camera_plane(&two).is_err());

        let collinear = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(2.0, 2.0, 2.0),
            Point3::new(3.0, 3.0, 3.0),
        ];
        let err = fit_camera_plane(&collinear).expect_err("collinear");
        assert!(err.to_string().contains("collinear"));
    }

    #[test]
    fn cylinder_extent_along_normal_equals_human_height() {
        let anchor = Point3::new(1.0, 2.0, 3.0);
        let normal = Vector3::new(0.0, 0.0, 1.0);
        for radius in [0.2, 0.4, 1.0] {
            let vertices =
                region_proposal(&anchor, &normal, 1.7, Some(radius)).expect("proposal");
            let heights: Vec<f64> = vertices.iter().map(|v| v.coords.dot(&normal)).collect();
            let min = heights.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = heights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert!(
                ((max - min) - 1.7).abs() < 1e-9,
                "extent {} for radius {}",
                max - min,
                radius
            );
        }
    }

    #[test]
    fn cylinder_spans_ground_to_anchor_height() {
        let anchor = Point3::new(0.0, 0.0, 1.6);
        let normal = Vector3::new(0.0, 0.0, 1.0);
        let vertices = region_proposal(&anchor, &normal, 1.6, None).expect("proposal");
        let zs: Vec<f64> = vertices.iter().map(|v| v.z).collect();
        let min = zs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = zs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(min.abs() < 1e-9, "bottom ring at {}", min);
        assert!((max - 1.6).abs() < 1e-9, "top ring at {}", max);
    }

    #[test]
    fn region_proposal_rejects_invalid_normal() {
        let anchor = Point3::origin();
        assert!(region_proposal(&anchor, &Vector3::zeros(), 1.5, None).is_err());
        assert!(
            region_proposal(&anchor, &Vector3::new(f64::NAN, 0.0, 0.0), 1.5, None).is_err()
        );
    }

    #[test]
    fn bbox_rejections_and_containment() {
        let thresholds = BBoxThresholds::default();

        // All points out of frame.
        let out = vec![Point2::new(-10.0, -10.0), Point2::new(-5.0, -20.0)];
        assert_eq!(check_and_convert_bbox(&out, 640, 480, &thresholds), None);

        // Too small relative to the image.
        let tiny = vec![Point2::new(100.0, 100.0), Point2::new(102.0, 102.0)];
        assert_eq!(check_and_convert_bbox(&tiny, 640, 480, &thresholds), None);

        // Too skewed: a near-vertical sliver.
        let sliver = vec![Point2::new(100.0, 10.0), Point2::new(104.0, 470.0)];
        assert_eq!(check_and_convert_bbox(&sliver, 640, 480, &thresholds), None);

        // Valid box: fully contained in the image.
        let ok = vec![
            Point2::new(100.2, 50.7),
            Point2::new(300.9, 50.7),
            Point2::new(100.2, 400.1),
            Point2::new(300.9, 400.1),
        ];
        let bbox = check_and_convert_bbox(&ok, 640, 480, &thresholds).expect("bbox");
        assert_eq!(bbox, [100, 51, 301, 400]);
        assert!(bbox[0] >= 0 && bbox[2] <= 640);
        assert!(bbox[1] >= 0 && bbox[3] <= 480);
    }

    #[test]
    fn bbox_ignores_points_outside_the_frame() {
        let thresholds = BBoxThresholds::default();
        let mixed = vec![
            Point2::new(-50.0, 240.0),
            Point2::new(100.0, 100.0),
            Point2::new(300.0, 100.0),
            Point2::new(100.0, 400.0),
            Point2::new(300.0, 400.0),
            Point2::new(900.0, 240.0),
        ];
        let bbox = check_and_convert_bbox(&mixed, 640, 480, &thresholds).expect("bbox");
        assert_eq!(bbox, [100, 100, 300, 400]);
    }
}
