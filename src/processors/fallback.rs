//! Fallback classifier for cylinders the family path rejected.
//!
//! Cylinders without enough fin evidence can still form a stake if they
//! cluster like one. This path clusters the leftover population by
//! density, scores each cluster against the geometric signature of a
//! heat-stake assembly, and vetoes the signatures typical of drilled
//! hole patterns. It is deliberately stricter than the family path: a
//! cluster must look right on several independent criteria at once.

use log::{debug, info};

use super::clustering::dbscan;
use crate::config::FallbackConfig;
use crate::core::features::CylinderFeature;
use crate::core::geometry;
use crate::core::stake::{
    Confidence, Stake, StakeValidation, DEFAULT_FAMILY, KIND_CLUSTER_GROUP,
};

/// Maximum achievable cluster score.
const MAX_SCORE: f64 = 5.0;

/// Geometric statistics of one candidate cluster.
#[derive(Debug, Clone)]
struct ClusterStats {
    count: usize,
    spread: f64,
    avg_radius: f64,
    avg_height: f64,
    max_height: f64,
    /// Sum of per-axis population std-devs of the member axis
    /// directions. Near zero for perfectly parallel cylinders.
    orientation_spread: f64,
    bbox_volume: f64,
}

fn cluster_stats(members: &[CylinderFeature]) -> ClusterStats {
    let centers: Vec<[f64; 3]> = members.iter().map(|c| c.center).collect();
    let centroid = geometry::centroid(&centers);

    let radii: Vec<f64> = members.iter().map(|c| c.radius).collect();
    let heights: Vec<f64> = members.iter().map(|c| c.height).collect();

    let orientation_spread = (0..3)
        .map(|axis| {
            let components: Vec<f64> = members.iter().map(|c| c.direction[axis]).collect();
            geometry::std_dev(&components)
        })
        .sum();

    ClusterStats {
        count: members.len(),
        spread: geometry::max_spread(&centers, &centroid),
        avg_radius: geometry::mean(&radii),
        avg_height: geometry::mean(&heights),
        max_height: heights.iter().copied().fold(0.0, f64::max),
        orientation_spread,
        bbox_volume: geometry::bbox_volume(&centers),
    }
}

/// Multi-criteria score, each criterion contributing a tiered partial.
///
/// The tiers encode the domain heuristics: a stake assembly is spread
/// out (a single feature is compact), thin (locators are fat), tall
/// (hole rims are flat), and its fins point in varied directions
/// (drilled holes are suspiciously parallel).
fn score_cluster(stats: &ClusterStats) -> f64 {
    let mut score = 0.0;

    score += if stats.spread >= 15.0 {
        1.0
    } else if stats.spread >= 9.0 {
        0.9
    } else if stats.spread >= 7.0 {
        0.5
    } else {
        0.0
    };

    score += if stats.avg_radius <= 3.0 {
        1.0
    } else if stats.avg_radius <= 5.0 {
        0.7
    } else if stats.avg_radius <= 8.0 {
        0.3
    } else {
        0.0
    };

    score += if stats.max_height > 15.0 || stats.avg_height > 10.0 {
        1.0
    } else if stats.max_height > 10.0 || stats.avg_height > 8.0 {
        0.7
    } else if stats.max_height > 5.0 || stats.avg_height > 5.0 {
        0.3
    } else {
        0.0
    };

    score += if stats.orientation_spread > 0.1 {
        1.0
    } else if stats.orientation_spread > 0.05 {
        0.7
    } else if stats.orientation_spread > 0.02 {
        0.3
    } else {
        0.0
    };

    // Degenerate bounding boxes (coplanar clusters) get a flat middling
    // density instead of dividing by zero.
    let density = if stats.bbox_volume > 0.0 {
        stats.count as f64 / stats.bbox_volume * 1000.0
    } else {
        0.3
    };
    score += if density > 0.5 {
        0.5
    } else if density > 0.1 {
        0.3
    } else {
        0.0
    };

    // Cardinality bonus: seven is the canonical fin count.
    score += if stats.count == 7 {
        0.5
    } else if (5..=9).contains(&stats.count) {
        0.3
    } else {
        0.0
    };

    score
}

/// Hole-pattern veto: reject regardless of score when the cluster's
/// signature matches a drilled hole pattern.
fn hole_veto(stats: &ClusterStats) -> Option<String> {
    if stats.spread < 8.0 && stats.orientation_spread < 0.02 {
        return Some(format!(
            "hole pattern: compact (spread {:.1}) and parallel (orientation {:.3})",
            stats.spread, stats.orientation_spread
        ));
    }
    if stats.spread < 10.0 && stats.orientation_spread < 0.01 && stats.avg_height < 8.0 {
        return Some(format!(
            "hole pattern: flat parallel cluster (spread {:.1}, avg height {:.1})",
            stats.spread, stats.avg_height
        ));
    }
    if stats.avg_radius > 8.0 && stats.orientation_spread < 0.05 {
        return Some(format!(
            "hole pattern: large parallel bores (avg radius {:.1})",
            stats.avg_radius
        ));
    }
    None
}

fn confidence_from_ratio(ratio: f64) -> Confidence {
    if ratio >= 0.85 {
        Confidence::High
    } else if ratio >= 0.70 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Classify the leftover cylinder population.
///
/// Filters to small-radius cylinders, clusters them by density (noise
/// points are discarded and never scored), then accepts each cluster
/// iff its score clears `score_threshold × 5.0`, its size lies within
/// the accepted bounds and the hole veto does not fire.
///
/// # Returns
///
/// `(accepted, rejected)` stake lists. Rejected entries keep their
/// statistics and carry rejection reasons for diagnostics; they never
/// appear in final pipeline output.
pub fn classify_leftovers(
    cylinders: &[CylinderFeature],
    config: &FallbackConfig,
) -> (Vec<Stake>, Vec<Stake>) {
    let viable: Vec<CylinderFeature> = cylinders
        .iter()
        .filter(|c| c.radius < config.max_candidate_radius)
        .copied()
        .collect();

    if viable.len() < config.min_samples {
        return (Vec::new(), Vec::new());
    }

    info!(
        "fallback classifier: {} viable of {} leftover cylinders",
        viable.len(),
        cylinders.len()
    );

    let centers: Vec<[f64; 3]> = viable.iter().map(|c| c.center).collect();
    let labels = dbscan(&centers, config.eps, config.min_samples);
    let num_clusters = labels.iter().copied().max().map_or(0, |m| m + 1);

    let (min_count, max_count) = if config.strict_mode { (5, 9) } else { (5, 25) };
    let threshold = config.score_threshold * MAX_SCORE;

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for label in 0..num_clusters {
        let members: Vec<CylinderFeature> = labels
            .iter()
            .zip(&viable)
            .filter(|(&l, _)| l == label)
            .map(|(_, c)| *c)
            .collect();

        let stats = cluster_stats(&members);
        let score = score_cluster(&stats);
        let veto = hole_veto(&stats);
        debug!(
            "LEGACY-{label}: {} cylinders, spread {:.1}, score {score:.2}, veto {:?}",
            stats.count, stats.spread, veto
        );

        let mut reasons = Vec::new();
        if score < threshold {
            reasons.push(format!("score {score:.2} below threshold {threshold:.2}"));
        }
        if stats.count < min_count || stats.count > max_count {
            reasons.push(format!(
                "cluster size {} outside [{min_count}, {max_count}]",
                stats.count
            ));
        }

        let confidence = if let Some(reason) = veto {
            reasons.insert(0, reason);
            Confidence::RejectedHole
        } else if reasons.is_empty() {
            confidence_from_ratio(score / MAX_SCORE)
        } else {
            Confidence::Rejected
        };

        let stake = Stake::from_group(
            format!("LEGACY-{label}"),
            DEFAULT_FAMILY.to_string(),
            members,
            StakeValidation {
                confidence,
                kind: KIND_CLUSTER_GROUP.to_string(),
                score,
                merge_distance: None,
                num_merged: None,
                reasons,
            },
        );

        match confidence {
            Confidence::Rejected | Confidence::RejectedHole => rejected.push(stake),
            _ => accepted.push(stake),
        }
    }

    info!(
        "fallback classifier: {} accepted, {} rejected",
        accepted.len(),
        rejected.len()
    );
    (accepted, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Seven cylinders on a ring: the canonical stake fin layout.
    fn canonical_stake_cluster() -> Vec<CylinderFeature> {
        (0..7)
            .map(|k| {
                let theta = 2.0 * std::f64::consts::PI * k as f64 / 7.0;
                CylinderFeature {
                    center: [
                        15.5 * theta.cos(),
                        15.5 * theta.sin(),
                        0.5 * (k % 2) as f64,
                    ],
                    radius: 2.0,
                    height: 12.0,
                    // Fins lean outward, so axes vary between members.
                    direction: [0.3 * theta.cos(), 0.3 * theta.sin(), 0.95],
                    connected_planes: 1,
                }
            })
            .collect()
    }

    #[test]
    fn test_canonical_seven_fin_cluster_accepted_high() {
        let cylinders = canonical_stake_cluster();
        let (accepted, rejected) = classify_leftovers(&cylinders, &FallbackConfig::default());

        assert_eq!(accepted.len(), 1);
        assert!(rejected.is_empty());

        let stake = &accepted[0];
        assert_eq!(stake.cluster_id, "LEGACY-0");
        assert_eq!(stake.family_id, DEFAULT_FAMILY);
        assert_eq!(stake.validation.confidence, Confidence::High);
        assert_eq!(stake.validation.kind, KIND_CLUSTER_GROUP);
        assert!(stake.validation.score >= 0.86 * MAX_SCORE);
        assert_eq!(stake.analysis.num_cylinders, 7);
    }

    #[test]
    fn test_parallel_compact_large_radius_cluster_vetoed_as_hole() {
        // Four parallel radius-9 bores at square corners: spread ~4.95,
        // orientation spread 0. Trips the avg_radius > 8 veto.
        let cylinders: Vec<CylinderFeature> = [
            [3.5, 3.5],
            [3.5, -3.5],
            [-3.5, 3.5],
            [-3.5, -3.5],
        ]
        .iter()
        .map(|&[x, y]| CylinderFeature {
            center: [x, y, 0.0],
            radius: 9.0,
            height: 20.0,
            direction: [0.0, 0.0, 1.0],
            connected_planes: 0,
        })
        .collect();

        let config = FallbackConfig {
            min_samples: 3,
            ..FallbackConfig::default()
        };
        let (accepted, rejected) = classify_leftovers(&cylinders, &config);

        assert!(accepted.is_empty());
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].validation.confidence, Confidence::RejectedHole);
        assert!(rejected[0].validation.reasons[0].contains("hole pattern"));
    }

    #[test]
    fn test_low_score_cluster_rejected_with_reason() {
        // Compact but non-parallel: escapes the veto, fails the score.
        let cylinders: Vec<CylinderFeature> = (0..5)
            .map(|k| {
                let theta = 2.0 * std::f64::consts::PI * k as f64 / 5.0;
                CylinderFeature {
                    center: [6.0 * theta.cos(), 6.0 * theta.sin(), 0.0],
                    radius: 2.0,
                    height: 3.0,
                    direction: [0.4 * theta.cos(), 0.4 * theta.sin(), 0.9],
                    connected_planes: 0,
                }
            })
            .collect();

        let (accepted, rejected) = classify_leftovers(&cylinders, &FallbackConfig::default());

        assert!(accepted.is_empty());
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].validation.confidence, Confidence::Rejected);
        assert!(rejected[0]
            .validation
            .reasons
            .iter()
            .any(|r| r.contains("below threshold")));
    }

    #[test]
    fn test_noise_points_never_scored() {
        let mut cylinders = canonical_stake_cluster();
        // One isolated cylinder far from the ring.
        cylinders.push(CylinderFeature {
            center: [500.0, 500.0, 0.0],
            radius: 2.0,
            height: 12.0,
            direction: [0.0, 0.0, 1.0],
            connected_planes: 0,
        });

        let (accepted, rejected) = classify_leftovers(&cylinders, &FallbackConfig::default());
        let total: usize = accepted
            .iter()
            .chain(&rejected)
            .map(|s| s.analysis.num_cylinders)
            .sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn test_large_radius_cylinders_filtered_out() {
        let cylinders: Vec<CylinderFeature> = (0..6)
            .map(|k| CylinderFeature {
                center: [k as f64 * 5.0, 0.0, 0.0],
                radius: 12.0,
                height: 30.0,
                direction: [0.0, 0.0, 1.0],
                connected_planes: 0,
            })
            .collect();

        let (accepted, rejected) = classify_leftovers(&cylinders, &FallbackConfig::default());
        assert!(accepted.is_empty());
        assert!(rejected.is_empty());
    }

    #[test]
    fn test_empty_and_undersized_inputs_degrade_to_empty() {
        let config = FallbackConfig::default();
        let (accepted, rejected) = classify_leftovers(&[], &config);
        assert!(accepted.is_empty() && rejected.is_empty());

        let few = canonical_stake_cluster()[..3].to_vec();
        let (accepted, rejected) = classify_leftovers(&few, &config);
        assert!(accepted.is_empty() && rejected.is_empty());
    }

    #[test]
    fn test_strict_mode_tightens_count_bounds() {
        // Eleven well-spread, varied cylinders: accepted normally,
        // rejected in strict mode (outside 7 +/- 2).
        let cylinders: Vec<CylinderFeature> = (0..11)
            .map(|k| {
                let theta = 2.0 * std::f64::consts::PI * k as f64 / 11.0;
                CylinderFeature {
                    center: [
                        16.0 * theta.cos(),
                        16.0 * theta.sin(),
                        0.5 * (k % 3) as f64,
                    ],
                    radius: 2.0,
                    height: 12.0,
                    direction: [0.3 * theta.cos(), 0.3 * theta.sin(), 0.95],
                    connected_planes: 0,
                }
            })
            .collect();

        let config = FallbackConfig::default();
        let (accepted, _) = classify_leftovers(&cylinders, &config);
        assert_eq!(accepted.len(), 1);

        let strict = FallbackConfig {
            strict_mode: true,
            ..config
        };
        let (accepted, rejected) = classify_leftovers(&cylinders, &strict);
        assert!(accepted.is_empty());
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0]
            .validation
            .reasons
            .iter()
            .any(|r| r.contains("outside [5, 9]")));
    }

    #[test]
    fn test_degenerate_bbox_uses_flat_density() {
        // Coplanar ring: bbox volume is zero, density falls back to the
        // flat 0.3 tier and the cluster is still scoreable.
        let cylinders: Vec<CylinderFeature> = (0..7)
            .map(|k| {
                let theta = 2.0 * std::f64::consts::PI * k as f64 / 7.0;
                CylinderFeature {
                    center: [15.5 * theta.cos(), 15.5 * theta.sin(), 0.0],
                    radius: 2.0,
                    height: 12.0,
                    direction: [0.3 * theta.cos(), 0.3 * theta.sin(), 0.95],
                    connected_planes: 0,
                }
            })
            .collect();

        let (accepted, _) = classify_leftovers(&cylinders, &FallbackConfig::default());
        assert_eq!(accepted.len(), 1);
        // 1.0 + 1.0 + 1.0 + 1.0 + 0.3 + 0.5
        assert!((accepted[0].validation.score - 4.8).abs() < 1e-9);
    }
}
