//! Stake records: the pipeline's unit of output.
//!
//! A `Stake` is one consolidated heat-stake detection. It owns every raw
//! cylinder that was absorbed into it; a cylinder never appears in two
//! final stakes.

use serde::{Deserialize, Serialize};

use super::features::CylinderFeature;
use super::geometry;

/// Family label for stakes produced by merging several families.
pub const MERGED_FAMILY: &str = "MERGED";
/// Family label for stakes outside any radius family (fallback path).
pub const DEFAULT_FAMILY: &str = "DEFAULT";

/// Detection kind for duplicate-merger output.
pub const KIND_FAMILY_GROUP: &str = "FAMILY_GROUP";
/// Detection kind for fusion-engine output.
pub const KIND_MERGED_FAMILIES: &str = "MERGED_FAMILIES";
/// Detection kind for fallback-classifier output.
pub const KIND_CLUSTER_GROUP: &str = "CLUSTER_GROUP";

/// Confidence bucket assigned to a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
    /// Rejected by score or cluster-size bounds.
    Rejected,
    /// Forcibly rejected by the hole-pattern veto.
    RejectedHole,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
            Confidence::Rejected => "REJECTED",
            Confidence::RejectedHole => "REJECTED_HOLE",
        };
        f.write_str(s)
    }
}

/// Aggregate geometry of a stake's member cylinders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeAnalysis {
    /// Arithmetic mean of all member cylinder centers. Always recomputed
    /// from the raw cylinders, never copied from a parent stake.
    pub centroid: [f64; 3],
    /// Number of member cylinders.
    pub num_cylinders: usize,
    /// Mean of member radii.
    pub avg_radius: f64,
    /// Maximum distance from any member center to the centroid.
    pub max_spread: f64,
    /// Best observed connected-plane count among members.
    pub connected_planes: u32,
}

impl StakeAnalysis {
    /// Compute the aggregate analysis for a group of cylinders.
    ///
    /// `connected_planes` takes the maximum over members: under-counting
    /// from detection gaps is far more common than over-counting, so the
    /// best-observed evidence wins.
    pub fn from_cylinders(cylinders: &[CylinderFeature]) -> Self {
        let centers: Vec<[f64; 3]> = cylinders.iter().map(|c| c.center).collect();
        let centroid = geometry::centroid(&centers);
        let radii: Vec<f64> = cylinders.iter().map(|c| c.radius).collect();

        Self {
            centroid,
            num_cylinders: cylinders.len(),
            avg_radius: geometry::mean(&radii),
            max_spread: geometry::max_spread(&centers, &centroid),
            connected_planes: cylinders
                .iter()
                .map(|c| c.connected_planes)
                .max()
                .unwrap_or(0),
        }
    }
}

/// Validation verdict attached to a stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeValidation {
    pub confidence: Confidence,
    /// Detection kind: `FAMILY_GROUP`, `MERGED_FAMILIES` or `CLUSTER_GROUP`.
    pub kind: String,
    pub score: f64,
    /// Centroid distance of the merged pair, when produced by a
    /// cross-family fusion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_distance: Option<f64>,
    /// Number of parent stakes consumed by a fusion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_merged: Option<usize>,
    /// Human-readable rejection reasons (diagnostics only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl StakeValidation {
    /// Verdict for an accepted detection with no fusion metadata.
    pub fn accepted(confidence: Confidence, kind: &str, score: f64) -> Self {
        Self {
            confidence,
            kind: kind.to_string(),
            score,
            merge_distance: None,
            num_merged: None,
            reasons: Vec::new(),
        }
    }
}

/// One consolidated heat-stake detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stake {
    /// Unique human-readable id, e.g. `GRP1-2`, `LEGACY-0`,
    /// `MERGED-GRP1+GRP2-1`.
    pub cluster_id: String,
    /// Family label: `GRP1..GRPk`, `DEFAULT` or `MERGED`.
    pub family_id: String,
    /// Contributing family labels; non-empty only when
    /// `family_id == MERGED`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub original_families: Vec<String>,
    /// Every raw cylinder absorbed into this stake.
    pub cylinders: Vec<CylinderFeature>,
    pub analysis: StakeAnalysis,
    pub validation: StakeValidation,
}

impl Stake {
    /// Build a stake from a cylinder group, computing its analysis.
    pub fn from_group(
        cluster_id: String,
        family_id: String,
        cylinders: Vec<CylinderFeature>,
        validation: StakeValidation,
    ) -> Self {
        let analysis = StakeAnalysis::from_cylinders(&cylinders);
        Self {
            cluster_id,
            family_id,
            original_families: Vec::new(),
            cylinders,
            analysis,
            validation,
        }
    }
}
