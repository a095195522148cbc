//! Duplicate merging: collapse near-duplicate detections within a family.
//!
//! A geometry extractor often reports one physical stake column as
//! several cylinder faces a few millimetres apart. Clustering each
//! family's centers with `min_samples = 1` assigns every candidate to
//! some group (isolated candidates become singleton groups; there is no
//! noise label at this stage) and each group becomes one stake with a
//! true center-of-mass.

use log::debug;

use super::clustering::dbscan;
use crate::core::features::CylinderFeature;
use crate::core::stake::{Confidence, Stake, StakeValidation, KIND_FAMILY_GROUP};

/// Flat score for family-phase detections. The family path is trusted
/// more than the fallback path by construction.
const FAMILY_GROUP_SCORE: f64 = 5.0;

/// Merge near-duplicate candidates within one family into stakes.
///
/// Groups candidates by density clustering over their 3D centers with
/// neighborhood radius `merge_distance`, then emits one stake per group
/// with `cluster_id` `"{family_id}-{group + 1}"`, confidence HIGH, kind
/// `FAMILY_GROUP` and a flat score.
pub fn merge_close_candidates(
    family_id: &str,
    candidates: &[CylinderFeature],
    merge_distance: f64,
) -> Vec<Stake> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let centers: Vec<[f64; 3]> = candidates.iter().map(|c| c.center).collect();
    let labels = dbscan(&centers, merge_distance, 1);

    // min_samples = 1 guarantees no noise labels and contiguous group
    // ids 0..k in first-seen order.
    let num_groups = labels.iter().copied().max().map_or(0, |m| m + 1);

    let mut stakes = Vec::with_capacity(num_groups as usize);
    for group in 0..num_groups {
        let members: Vec<CylinderFeature> = labels
            .iter()
            .zip(candidates)
            .filter(|(&label, _)| label == group)
            .map(|(_, c)| *c)
            .collect();

        debug!(
            "{family_id}: group {} absorbs {} cylinders",
            group + 1,
            members.len()
        );

        stakes.push(Stake::from_group(
            format!("{family_id}-{}", group + 1),
            family_id.to_string(),
            members,
            StakeValidation::accepted(Confidence::High, KIND_FAMILY_GROUP, FAMILY_GROUP_SCORE),
        ));
    }

    stakes
}
