//! Small 3D helpers shared by the detection stages.
//!
//! Centroid, spread and deviation math lives here so every stage computes
//! them the same way. All functions treat an empty input as zero rather
//! than panicking; callers are expected to have filtered empty groups out.

/// Euclidean distance between two 3D points.
#[inline]
pub fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Arithmetic mean of a set of 3D points.
///
/// Returns the origin for an empty slice.
pub fn centroid(points: &[[f64; 3]]) -> [f64; 3] {
    if points.is_empty() {
        return [0.0; 3];
    }

    let mut sum = [0.0f64; 3];
    for p in points {
        sum[0] += p[0];
        sum[1] += p[1];
        sum[2] += p[2];
    }

    let n = points.len() as f64;
    [sum[0] / n, sum[1] / n, sum[2] / n]
}

/// Maximum distance from any point to the given center.
pub fn max_spread(points: &[[f64; 3]], center: &[f64; 3]) -> f64 {
    points
        .iter()
        .map(|p| distance(p, center))
        .fold(0.0, f64::max)
}

/// Mean of a slice of scalars; zero for an empty slice.
#[inline]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation of a slice of scalars.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Axis-aligned bounding-box volume of a set of 3D points.
///
/// Returns zero when any axis extent is degenerate (all points coplanar
/// or fewer than two points).
pub fn bbox_volume(points: &[[f64; 3]]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for p in points {
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }

    (max[0] - min[0]) * (max[1] - min[1]) * (max[2] - min[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_distance() {
        let d = distance(&[0.0, 0.0, 0.0], &[3.0, 4.0, 0.0]);
        assert!((d - 5.0).abs() < EPS);
    }

    #[test]
    fn test_centroid_is_mean() {
        let points = vec![[0.0, 0.0, 0.0], [2.0, 4.0, 6.0], [4.0, 2.0, 0.0]];
        let c = centroid(&points);
        assert!((c[0] - 2.0).abs() < EPS);
        assert!((c[1] - 2.0).abs() < EPS);
        assert!((c[2] - 2.0).abs() < EPS);
    }

    #[test]
    fn test_centroid_empty() {
        assert_eq!(centroid(&[]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_max_spread() {
        let points = vec![[1.0, 0.0, 0.0], [-3.0, 0.0, 0.0], [0.0, 2.0, 0.0]];
        let s = max_spread(&points, &[0.0, 0.0, 0.0]);
        assert!((s - 3.0).abs() < EPS);
    }

    #[test]
    fn test_std_dev() {
        // Population std-dev of [2, 4, 4, 4, 5, 5, 7, 9] is exactly 2.
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&values) - 2.0).abs() < EPS);
    }

    #[test]
    fn test_bbox_volume() {
        let points = vec![[0.0, 0.0, 0.0], [2.0, 3.0, 4.0]];
        assert!((bbox_volume(&points) - 24.0).abs() < EPS);
    }

    #[test]
    fn test_bbox_volume_degenerate() {
        // Coplanar points collapse one axis to zero extent.
        let points = vec![[0.0, 0.0, 1.0], [2.0, 3.0, 1.0], [1.0, 1.0, 1.0]];
        assert_eq!(bbox_volume(&points), 0.0);
    }
}
