//! Pipeline orchestration: from raw cylinder records to classified stakes.
//!
//! Composes the detection stages in two phases. The family phase
//! (grouping, duplicate merging, fusion) handles cylinders with fin
//! evidence; the fallback phase density-clusters whatever the family
//! phase never saw. Both result sets are concatenated into the final
//! detection set. Every stage runs to completion over its in-memory
//! batch before the next starts; there is no shared state across stage
//! boundaries.

use log::{info, warn};

use super::dedup::merge_close_candidates;
use super::fallback::classify_leftovers;
use super::families::group_by_families;
use super::fusion::FusionEngine;
use crate::config::PipelineConfig;
use crate::core::features::{validate_features, CylinderFeature, FeatureError};
use crate::core::stake::Stake;

/// Final result of a detection run.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    /// Accepted stakes from both phases, family phase first.
    pub stakes: Vec<Stake>,
    /// Rejected fallback clusters, kept for diagnostics only.
    pub rejected: Vec<Stake>,
}

/// The full detection pipeline.
pub struct StakeDetector {
    config: PipelineConfig,
}

impl StakeDetector {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PipelineConfig::default())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline over a batch of cylinder features.
    ///
    /// # Errors
    ///
    /// Returns a `FeatureError` if any record carries non-finite values
    /// or a negative radius. Empty or insufficient input is not an
    /// error: every stage degrades to an empty result list.
    pub fn detect(&self, cylinders: &[CylinderFeature]) -> Result<DetectionOutcome, FeatureError> {
        validate_features(cylinders)?;

        // Split the population by fin evidence.
        let min_planes = self.config.detection.min_connected_planes;
        let (population, leftovers): (Vec<CylinderFeature>, Vec<CylinderFeature>) = cylinders
            .iter()
            .copied()
            .partition(|c| c.connected_planes >= min_planes);

        info!(
            "detection start: {} cylinders, {} with >= {min_planes} connected planes",
            cylinders.len(),
            population.len()
        );

        // Family phase.
        let family_results = if population.is_empty() {
            warn!("no candidates with fin evidence; skipping family phase");
            Vec::new()
        } else {
            self.run_family_phase(&population)
        };

        // Fallback phase over the rejected population.
        let (fallback_results, rejected) = classify_leftovers(&leftovers, &self.config.fallback);

        let mut stakes = family_results;
        stakes.extend(fallback_results);

        // Optional second fusion pass over the combined results, letting
        // rules against DEFAULT pick up fallback detections.
        if self.config.fusion.include_fallback {
            let engine = FusionEngine::new(self.config.fusion.clone());
            stakes = engine.merge_all(regroup_by_family(stakes));
        }

        info!(
            "detection complete: {} stakes, {} rejected clusters",
            stakes.len(),
            rejected.len()
        );
        Ok(DetectionOutcome { stakes, rejected })
    }

    fn run_family_phase(&self, population: &[CylinderFeature]) -> Vec<Stake> {
        let families = group_by_families(population, self.config.detection.min_family_size);

        let family_stakes: Vec<(String, Vec<Stake>)> = families
            .iter()
            .map(|(label, members)| {
                let stakes =
                    merge_close_candidates(label, members, self.config.detection.merge_distance);
                (label.clone(), stakes)
            })
            .collect();

        let engine = FusionEngine::new(self.config.fusion.clone());
        engine.merge_all(family_stakes)
    }
}

/// Regroup a flat stake list by `family_id`, preserving first-occurrence
/// family order and stake order within each family.
fn regroup_by_family(stakes: Vec<Stake>) -> Vec<(String, Vec<Stake>)> {
    let mut groups: Vec<(String, Vec<Stake>)> = Vec::new();
    for stake in stakes {
        match groups.iter_mut().find(|(family, _)| *family == stake.family_id) {
            Some((_, members)) => members.push(stake),
            None => groups.push((stake.family_id.clone(), vec![stake])),
        }
    }
    groups
}
