//! Cylinder feature records and ingestion validation.
//!
//! A `CylinderFeature` is the pipeline's only input: one record per
//! cylindrical face found by an external geometry extractor. The pipeline
//! never mutates these records, it only aggregates over them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when malformed feature records reach the pipeline.
#[derive(Error, Debug)]
pub enum FeatureError {
    /// A coordinate or measurement is NaN or infinite.
    #[error("record {index}: non-finite value in field '{field}'")]
    NonFinite { index: usize, field: &'static str },

    /// Radius must be non-negative.
    #[error("record {index}: negative radius {radius}")]
    NegativeRadius { index: usize, radius: f64 },
}

/// Result type for feature validation.
pub type Result<T> = std::result::Result<T, FeatureError>;

/// A single cylindrical feature extracted from a CAD body.
///
/// `connected_planes` is the number of planar faces the extractor found
/// touching this cylinder (topologically or by proximity). Heat-stake
/// columns carry fin plates, so a high count is the strongest single
/// signal that a cylinder belongs to a stake rather than a hole.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CylinderFeature {
    /// Axis location point (x, y, z), in model units (mm).
    pub center: [f64; 3],
    /// Cylinder radius in mm.
    pub radius: f64,
    /// Extent of the face along the cylinder axis, in mm.
    pub height: f64,
    /// Axis direction, unit-ish vector.
    pub direction: [f64; 3],
    /// Number of planar faces connected to this cylinder.
    pub connected_planes: u32,
}

impl CylinderFeature {
    /// Check a single record for non-finite values and negative radius.
    ///
    /// `index` is the record's position in the input sequence and is only
    /// used to make the error message actionable.
    pub fn validate(&self, index: usize) -> Result<()> {
        let finite3 = |v: &[f64; 3]| v.iter().all(|c| c.is_finite());

        if !finite3(&self.center) {
            return Err(FeatureError::NonFinite { index, field: "center" });
        }
        if !finite3(&self.direction) {
            return Err(FeatureError::NonFinite { index, field: "direction" });
        }
        if !self.radius.is_finite() {
            return Err(FeatureError::NonFinite { index, field: "radius" });
        }
        if !self.height.is_finite() {
            return Err(FeatureError::NonFinite { index, field: "height" });
        }
        if self.radius < 0.0 {
            return Err(FeatureError::NegativeRadius {
                index,
                radius: self.radius,
            });
        }
        Ok(())
    }
}

/// Validate a batch of feature records before they enter the pipeline.
///
/// Rejecting bad records here keeps NaN out of every centroid mean
/// downstream; a single poisoned coordinate would otherwise propagate
/// silently through the whole detection set.
///
/// # Errors
///
/// Returns the first `FeatureError` encountered, in input order.
pub fn validate_features(features: &[CylinderFeature]) -> Result<()> {
    for (i, feature) in features.iter().enumerate() {
        feature.validate(i)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cylinder(center: [f64; 3], radius: f64) -> CylinderFeature {
        CylinderFeature {
            center,
            radius,
            height: 10.0,
            direction: [0.0, 0.0, 1.0],
            connected_planes: 4,
        }
    }

    #[test]
    fn test_valid_record_passes() {
        let features = vec![cylinder([1.0, 2.0, 3.0], 2.5)];
        assert!(validate_features(&features).is_ok());
    }

    #[test]
    fn test_nan_center_rejected() {
        let features = vec![
            cylinder([0.0, 0.0, 0.0], 1.0),
            cylinder([f64::NAN, 0.0, 0.0], 1.0),
        ];

        let err = validate_features(&features).unwrap_err();
        match err {
            FeatureError::NonFinite { index, field } => {
                assert_eq!(index, 1);
                assert_eq!(field, "center");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_infinite_direction_rejected() {
        let mut bad = cylinder([0.0, 0.0, 0.0], 1.0);
        bad.direction = [f64::INFINITY, 0.0, 0.0];

        let err = validate_features(&[bad]).unwrap_err();
        assert!(matches!(err, FeatureError::NonFinite { field: "direction", .. }));
    }

    #[test]
    fn test_negative_radius_rejected() {
        let features = vec![cylinder([0.0, 0.0, 0.0], -0.5)];

        let err = validate_features(&features).unwrap_err();
        assert!(matches!(err, FeatureError::NegativeRadius { index: 0, .. }));
    }

    #[test]
    fn test_zero_radius_allowed() {
        // Degenerate but finite; the family grouper will bucket it away.
        let features = vec![cylinder([0.0, 0.0, 0.0], 0.0)];
        assert!(validate_features(&features).is_ok());
    }
}
