//! Family fusion: consolidate stakes that fragmented across families.
//!
//! The extractor (or the CAD design itself) can split one physical
//! stake column into several radius families, e.g. a ring + boss pair
//! detected as two families. Fusion rules merge such fragments back
//! into one logical stake, and same-family rules mop up spurious
//! duplicates the fixed dedup radius missed.
//!
//! Rules run in a fixed priority order over an arena of stakes with a
//! per-stake `used` claim flag: once an earlier rule consumes a stake it
//! is retired and unavailable to later rules, so the order changes the
//! outcome and is preserved exactly.

use std::collections::HashMap;

use log::{debug, info};

use crate::config::FusionConfig;
use crate::core::geometry::distance;
use crate::core::stake::{
    Confidence, Stake, StakeAnalysis, StakeValidation, KIND_MERGED_FAMILIES, MERGED_FAMILY,
};

/// Base score for a merged stake; each corroborating parent adds 0.5.
const MERGED_BASE_SCORE: f64 = 6.0;
const MERGED_PARENT_BONUS: f64 = 0.5;

/// Applies configured fusion rules over a set of family stakes.
pub struct FusionEngine {
    config: FusionConfig,
}

/// Arena of stakes under fusion. `used[i]` marks stake `i` as claimed by
/// an earlier rule; claimed stakes never appear standalone in the output
/// and cannot be fused twice.
struct Arena {
    stakes: Vec<Stake>,
    used: Vec<bool>,
}

impl Arena {
    fn new(stakes: Vec<Stake>) -> Self {
        let used = vec![false; stakes.len()];
        Self { stakes, used }
    }

    /// Indices of unclaimed stakes belonging to `family`, in arena order.
    fn family_members(&self, family: &str) -> Vec<usize> {
        (0..self.stakes.len())
            .filter(|&i| !self.used[i] && self.stakes[i].family_id == family)
            .collect()
    }
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Append a custom fusion rule at the end of the priority order.
    pub fn add_rule(&mut self, family1: &str, family2: &str, max_distance: f64) {
        info!("fusion rule added: {family1}+{family2} at {max_distance}mm");
        self.config.add_rule(family1, family2, max_distance);
    }

    /// Run every fusion rule in priority order over the given stakes.
    ///
    /// Input stakes are flattened in the order given. The output carries
    /// the merged stakes (in rule order) followed by every stake no rule
    /// claimed, unchanged and in input order. No stake is lost and none
    /// is duplicated. An empty priority table returns the input as-is.
    pub fn merge_all(&self, family_stakes: Vec<(String, Vec<Stake>)>) -> Vec<Stake> {
        let flat: Vec<Stake> = family_stakes
            .into_iter()
            .flat_map(|(_, stakes)| stakes)
            .collect();

        let mut arena = Arena::new(flat);
        let mut merged = Vec::new();
        let mut seq = 0usize;

        for rule in &self.config.priority {
            let (family1, family2) = (rule[0].as_str(), rule[1].as_str());
            let max_distance = self.config.max_distance(family1, family2);
            debug!("fusion rule {family1}+{family2}: max distance {max_distance}mm");

            if family1 == family2 {
                self.merge_same_family(&mut arena, family1, max_distance, &mut seq, &mut merged);
            } else {
                self.merge_cross_family(
                    &mut arena,
                    family1,
                    family2,
                    max_distance,
                    &mut seq,
                    &mut merged,
                );
            }
        }

        log_fusion_summary(&merged);

        // Emit unclaimed stakes unchanged, preserving input order.
        let Arena { stakes, used } = arena;
        let mut out = merged;
        out.extend(
            stakes
                .into_iter()
                .zip(used)
                .filter(|(_, claimed)| !claimed)
                .map(|(stake, _)| stake),
        );
        out
    }

    /// Cross-family rule: each unclaimed `family1` stake greedily claims
    /// its nearest unclaimed `family2` stake strictly under
    /// `max_distance`. First-come claims win; this is a greedy pass, not
    /// an optimal assignment. Equal distances resolve to the lower
    /// arena index.
    fn merge_cross_family(
        &self,
        arena: &mut Arena,
        family1: &str,
        family2: &str,
        max_distance: f64,
        seq: &mut usize,
        out: &mut Vec<Stake>,
    ) {
        let ids1 = arena.family_members(family1);
        let ids2 = arena.family_members(family2);
        if ids1.is_empty() || ids2.is_empty() {
            return;
        }

        for &i in &ids1 {
            if arena.used[i] {
                continue;
            }
            let centroid1 = arena.stakes[i].analysis.centroid;

            let mut closest: Option<(f64, usize)> = None;
            for &j in &ids2 {
                if arena.used[j] {
                    continue;
                }
                let d = distance(&centroid1, &arena.stakes[j].analysis.centroid);
                if d < max_distance && closest.map_or(true, |(best, _)| d < best) {
                    closest = Some((d, j));
                }
            }

            if let Some((d, j)) = closest {
                let merged = self.create_merged_stake(
                    &[&arena.stakes[i], &arena.stakes[j]],
                    &[family1, family2],
                    Some(d),
                    seq,
                );
                info!(
                    "fused {} + {} at {d:.2}mm into {} ({} cylinders)",
                    arena.stakes[i].cluster_id,
                    arena.stakes[j].cluster_id,
                    merged.cluster_id,
                    merged.analysis.num_cylinders
                );
                arena.used[i] = true;
                arena.used[j] = true;
                out.push(merged);
            }
        }
    }

    /// Same-family rule: pick each successive unclaimed stake as a seed
    /// and absorb every remaining unclaimed stake within `max_distance`
    /// of the seed's centroid. This is a one-to-many star merge around
    /// the seed, not mutual nearest-neighbor matching. Seeds that attract
    /// nobody stay unclaimed and are emitted standalone.
    fn merge_same_family(
        &self,
        arena: &mut Arena,
        family: &str,
        max_distance: f64,
        seq: &mut usize,
        out: &mut Vec<Stake>,
    ) {
        let ids = arena.family_members(family);

        for (pos, &seed) in ids.iter().enumerate() {
            if arena.used[seed] {
                continue;
            }
            let seed_centroid = arena.stakes[seed].analysis.centroid;

            // Only stakes after the seed are eligible: earlier ones were
            // already considered as seeds themselves.
            let mut group = vec![seed];
            for &other in &ids[pos + 1..] {
                if arena.used[other] {
                    continue;
                }
                let d = distance(&seed_centroid, &arena.stakes[other].analysis.centroid);
                if d < max_distance {
                    group.push(other);
                }
            }

            if group.len() > 1 {
                let parents: Vec<&Stake> = group.iter().map(|&k| &arena.stakes[k]).collect();
                let families = vec![family; group.len()];
                let merged = self.create_merged_stake(&parents, &families, None, seq);
                info!(
                    "fused {} {family} stakes into {} ({} cylinders)",
                    group.len(),
                    merged.cluster_id,
                    merged.analysis.num_cylinders
                );
                for &k in &group {
                    arena.used[k] = true;
                }
                out.push(merged);
            }
        }
    }

    /// Build one merged stake from a set of parents.
    ///
    /// The centroid is recomputed as the mean of the underlying raw
    /// cylinder centers, never the mean of the parents' centroids: a
    /// parent that already absorbed many cylinders must weigh
    /// proportionally, not once.
    fn create_merged_stake(
        &self,
        parents: &[&Stake],
        families: &[&str],
        merge_distance: Option<f64>,
        seq: &mut usize,
    ) -> Stake {
        let cylinders: Vec<_> = parents
            .iter()
            .flat_map(|p| p.cylinders.iter().copied())
            .collect();

        let mut analysis = StakeAnalysis::from_cylinders(&cylinders);
        analysis.connected_planes = parents
            .iter()
            .map(|p| p.analysis.connected_planes)
            .max()
            .unwrap_or(0);

        // De-duplicate contributing families, preserving first occurrence.
        let mut original_families: Vec<String> = Vec::new();
        for &f in families {
            if !original_families.iter().any(|known| known == f) {
                original_families.push(f.to_string());
            }
        }

        *seq += 1;
        let cluster_id = format!("MERGED-{}-{seq}", original_families.join("+"));

        Stake {
            cluster_id,
            family_id: MERGED_FAMILY.to_string(),
            original_families,
            cylinders,
            analysis,
            validation: StakeValidation {
                confidence: Confidence::High,
                kind: KIND_MERGED_FAMILIES.to_string(),
                score: MERGED_BASE_SCORE + MERGED_PARENT_BONUS * parents.len() as f64,
                merge_distance,
                num_merged: Some(parents.len()),
                reasons: Vec::new(),
            },
        }
    }
}

/// Log per-combination fusion counts after a merge pass.
fn log_fusion_summary(merged: &[Stake]) {
    if merged.is_empty() {
        return;
    }

    let mut by_combination: HashMap<String, (usize, usize)> = HashMap::new();
    for stake in merged {
        let mut families = stake.original_families.clone();
        families.sort();
        let entry = by_combination.entry(families.join("+")).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += stake.analysis.num_cylinders;
    }

    let mut combinations: Vec<_> = by_combination.into_iter().collect();
    combinations.sort();
    for (combination, (count, cylinders)) in combinations {
        info!(
            "fusion summary {combination}: {count} stakes, {:.1} cylinders on average",
            cylinders as f64 / count as f64
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::CylinderFeature;
    use crate::core::stake::KIND_FAMILY_GROUP;

    fn cylinder(center: [f64; 3]) -> CylinderFeature {
        CylinderFeature {
            center,
            radius: 2.0,
            height: 10.0,
            direction: [0.0, 0.0, 1.0],
            connected_planes: 4,
        }
    }

    fn stake(id: &str, family: &str, centers: &[[f64; 3]]) -> Stake {
        Stake::from_group(
            id.to_string(),
            family.to_string(),
            centers.iter().map(|&c| cylinder(c)).collect(),
            StakeValidation::accepted(Confidence::High, KIND_FAMILY_GROUP, 5.0),
        )
    }

    fn engine() -> FusionEngine {
        FusionEngine::new(FusionConfig::default())
    }

    fn total_cylinders(stakes: &[Stake]) -> usize {
        stakes.iter().map(|s| s.cylinders.len()).sum()
    }

    #[test]
    fn test_cross_family_pair_merges_under_rule_distance() {
        // GRP1+GRP2 rule max distance is 20; centroids 18 apart.
        let input = vec![
            ("GRP1".to_string(), vec![stake("GRP1-1", "GRP1", &[[0.0, 0.0, 0.0]])]),
            ("GRP2".to_string(), vec![stake("GRP2-1", "GRP2", &[[18.0, 0.0, 0.0]])]),
        ];

        let out = engine().merge_all(input);
        assert_eq!(out.len(), 1);

        let merged = &out[0];
        assert_eq!(merged.family_id, MERGED_FAMILY);
        assert_eq!(
            merged.original_families,
            vec!["GRP1".to_string(), "GRP2".to_string()]
        );
        assert_eq!(merged.analysis.num_cylinders, 2);
        assert!((merged.analysis.centroid[0] - 9.0).abs() < 1e-9);
        assert_eq!(merged.validation.num_merged, Some(2));
        assert!((merged.validation.score - 7.0).abs() < 1e-9);
        let d = merged.validation.merge_distance.unwrap();
        assert!((d - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_cross_family_pair_beyond_rule_distance_stays_separate() {
        let input = vec![
            ("GRP1".to_string(), vec![stake("GRP1-1", "GRP1", &[[0.0, 0.0, 0.0]])]),
            ("GRP2".to_string(), vec![stake("GRP2-1", "GRP2", &[[22.0, 0.0, 0.0]])]),
        ];

        let out = engine().merge_all(input);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.family_id != MERGED_FAMILY));
    }

    #[test]
    fn test_merged_centroid_weighs_raw_cylinders_not_parents() {
        // Parent A holds three cylinders near x=0, parent B one at x=16.
        // Mean of the four raw centers is 4.0; mean of the two parent
        // centroids would be 8.0.
        let input = vec![
            (
                "GRP1".to_string(),
                vec![stake(
                    "GRP1-1",
                    "GRP1",
                    &[[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
                )],
            ),
            ("GRP2".to_string(), vec![stake("GRP2-1", "GRP2", &[[16.0, 0.0, 0.0]])]),
        ];

        let out = engine().merge_all(input);
        assert_eq!(out.len(), 1);
        assert!((out[0].analysis.centroid[0] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_family_star_merge() {
        // B and C are both within the GRP1+GRP1 distance (30) of seed A
        // but 56 apart from each other. The star merge around A must
        // still produce exactly one merged stake with 3 contributors.
        let input = vec![(
            "GRP1".to_string(),
            vec![
                stake("GRP1-1", "GRP1", &[[0.0, 0.0, 0.0]]),
                stake("GRP1-2", "GRP1", &[[28.0, 0.0, 0.0]]),
                stake("GRP1-3", "GRP1", &[[-28.0, 0.0, 0.0]]),
            ],
        )];

        let out = engine().merge_all(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].validation.num_merged, Some(3));
        assert_eq!(out[0].original_families, vec!["GRP1".to_string()]);
        assert!((out[0].validation.score - 7.5).abs() < 1e-9);
        assert!(out[0].validation.merge_distance.is_none());
    }

    #[test]
    fn test_same_family_singleton_left_untouched() {
        let input = vec![(
            "GRP1".to_string(),
            vec![
                stake("GRP1-1", "GRP1", &[[0.0, 0.0, 0.0]]),
                stake("GRP1-2", "GRP1", &[[100.0, 0.0, 0.0]]),
            ],
        )];

        let out = engine().merge_all(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].cluster_id, "GRP1-1");
        assert_eq!(out[1].cluster_id, "GRP1-2");
    }

    #[test]
    fn test_priority_order_retires_stakes_for_later_rules() {
        // GRP1+GRP2 runs before GRP2+GRP2. The lone GRP2 neighbor gets
        // claimed by the cross-family rule, leaving the second GRP2
        // stake nothing to pair with.
        let input = vec![
            ("GRP1".to_string(), vec![stake("GRP1-1", "GRP1", &[[0.0, 0.0, 0.0]])]),
            (
                "GRP2".to_string(),
                vec![
                    stake("GRP2-1", "GRP2", &[[18.0, 0.0, 0.0]]),
                    stake("GRP2-2", "GRP2", &[[30.0, 0.0, 0.0]]),
                ],
            ),
        ];

        let out = engine().merge_all(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].family_id, MERGED_FAMILY);
        assert_eq!(
            out[0].original_families,
            vec!["GRP1".to_string(), "GRP2".to_string()]
        );
        assert_eq!(out[1].cluster_id, "GRP2-2");
    }

    #[test]
    fn test_greedy_first_come_claim() {
        // Both GRP1 stakes are within range of the single GRP2 stake;
        // the first-processed one wins the claim.
        let input = vec![
            (
                "GRP1".to_string(),
                vec![
                    stake("GRP1-1", "GRP1", &[[0.0, 0.0, 0.0]]),
                    stake("GRP1-2", "GRP1", &[[10.0, 0.0, 0.0]]),
                ],
            ),
            ("GRP2".to_string(), vec![stake("GRP2-1", "GRP2", &[[5.0, 0.0, 0.0]])]),
        ];

        let out = engine().merge_all(input);
        let merged: Vec<&Stake> = out.iter().filter(|s| s.family_id == MERGED_FAMILY).collect();
        assert_eq!(merged.len(), 1);
        assert!(merged[0]
            .cylinders
            .iter()
            .any(|c| (c.center[0] - 0.0).abs() < 1e-9));
        // GRP1-2 remains standalone.
        assert!(out.iter().any(|s| s.cluster_id == "GRP1-2"));
    }

    #[test]
    fn test_empty_priority_is_identity() {
        let mut config = FusionConfig::default();
        config.priority.clear();
        let engine = FusionEngine::new(config);

        let stakes = vec![
            stake("GRP1-1", "GRP1", &[[0.0, 0.0, 0.0]]),
            stake("GRP2-1", "GRP2", &[[5.0, 0.0, 0.0]]),
        ];
        let input = vec![
            ("GRP1".to_string(), vec![stakes[0].clone()]),
            ("GRP2".to_string(), vec![stakes[1].clone()]),
        ];

        let out = engine.merge_all(input);
        assert_eq!(out, stakes);
    }

    #[test]
    fn test_no_stake_lost_or_duplicated() {
        let input = vec![
            (
                "GRP1".to_string(),
                vec![
                    stake("GRP1-1", "GRP1", &[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]]),
                    stake("GRP1-2", "GRP1", &[[25.0, 0.0, 0.0]]),
                    stake("GRP1-3", "GRP1", &[[300.0, 0.0, 0.0]]),
                ],
            ),
            (
                "GRP2".to_string(),
                vec![
                    stake("GRP2-1", "GRP2", &[[10.0, 0.0, 0.0]]),
                    stake("GRP2-2", "GRP2", &[[500.0, 0.0, 0.0]]),
                ],
            ),
        ];
        let input_cylinders = input
            .iter()
            .flat_map(|(_, stakes)| stakes.iter())
            .map(|s| s.cylinders.len())
            .sum::<usize>();

        let out = engine().merge_all(input);
        assert_eq!(total_cylinders(&out), input_cylinders);

        // Parent accounting: merged parents + standalone == input stakes.
        let parents: usize = out
            .iter()
            .map(|s| s.validation.num_merged.unwrap_or(1))
            .sum();
        assert_eq!(parents, 5);
    }

    #[test]
    fn test_merged_cluster_ids_are_unique_and_traceable() {
        let input = vec![
            (
                "GRP1".to_string(),
                vec![
                    stake("GRP1-1", "GRP1", &[[0.0, 0.0, 0.0]]),
                    stake("GRP1-2", "GRP1", &[[100.0, 0.0, 0.0]]),
                ],
            ),
            (
                "GRP2".to_string(),
                vec![
                    stake("GRP2-1", "GRP2", &[[15.0, 0.0, 0.0]]),
                    stake("GRP2-2", "GRP2", &[[110.0, 0.0, 0.0]]),
                ],
            ),
        ];

        let out = engine().merge_all(input);
        let merged_ids: Vec<&str> = out
            .iter()
            .filter(|s| s.family_id == MERGED_FAMILY)
            .map(|s| s.cluster_id.as_str())
            .collect();
        assert_eq!(merged_ids.len(), 2);
        assert!(merged_ids.iter().all(|id| id.starts_with("MERGED-GRP1+GRP2-")));
        assert_ne!(merged_ids[0], merged_ids[1]);
    }

    #[test]
    fn test_custom_rule_fuses_new_family_pair() {
        let mut engine = engine();
        engine.add_rule("GRP3", "GRP3", 25.0);

        let input = vec![(
            "GRP3".to_string(),
            vec![
                stake("GRP3-1", "GRP3", &[[0.0, 0.0, 0.0]]),
                stake("GRP3-2", "GRP3", &[[20.0, 0.0, 0.0]]),
            ],
        )];

        let out = engine.merge_all(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].original_families, vec!["GRP3".to_string()]);
    }
}
