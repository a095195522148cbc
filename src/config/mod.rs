//! Configuration types for the stake detection pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Configuration for the family-phase detection stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum connected planar faces for a cylinder to qualify as a
    /// stake candidate (fin evidence).
    #[serde(default = "default_min_connected_planes")]
    pub min_connected_planes: u32,

    /// Neighborhood radius for intra-family duplicate merging (mm).
    #[serde(default = "default_merge_distance")]
    pub merge_distance: f64,

    /// Minimum members for a radius bucket to count as a family.
    #[serde(default = "default_min_family_size")]
    pub min_family_size: usize,
}

fn default_min_connected_planes() -> u32 {
    3
}

fn default_merge_distance() -> f64 {
    15.0
}

fn default_min_family_size() -> usize {
    3
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_connected_planes: default_min_connected_planes(),
            merge_distance: default_merge_distance(),
            min_family_size: default_min_family_size(),
        }
    }
}

/// Configuration for the family fusion engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Max centroid distance (mm) per family combination, keyed
    /// `"FAMILY1+FAMILY2"`. Pairs are unordered: both key orders match.
    #[serde(default = "default_max_distances")]
    pub max_distances: HashMap<String, f64>,

    /// Fusion rules in priority order. Earlier rules claim stakes first,
    /// so this order changes the outcome and must be preserved.
    #[serde(default = "default_priority")]
    pub priority: Vec<[String; 2]>,

    /// Distance used for rules with no `max_distances` entry (mm).
    #[serde(default = "default_rule_distance")]
    pub default_max_distance: f64,

    /// Run a second fusion pass over the combined family + fallback
    /// results, letting rules against DEFAULT pick up fallback stakes.
    #[serde(default)]
    pub include_fallback: bool,
}

fn default_max_distances() -> HashMap<String, f64> {
    let mut distances = HashMap::new();
    distances.insert("GRP1+GRP2".to_string(), 20.0);
    distances.insert("GRP2+DEFAULT".to_string(), 25.0);
    distances.insert("GRP1+GRP1".to_string(), 30.0);
    distances.insert("GRP2+GRP2".to_string(), 25.0);
    distances.insert("GRP3+GRP3".to_string(), 25.0);
    distances
}

fn default_priority() -> Vec<[String; 2]> {
    vec![
        ["GRP1".to_string(), "GRP2".to_string()],
        ["GRP2".to_string(), "DEFAULT".to_string()],
        ["GRP1".to_string(), "GRP1".to_string()],
        ["GRP2".to_string(), "GRP2".to_string()],
    ]
}

fn default_rule_distance() -> f64 {
    20.0
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_distances: default_max_distances(),
            priority: default_priority(),
            default_max_distance: default_rule_distance(),
            include_fallback: false,
        }
    }
}

impl FusionConfig {
    /// Look up the max merge distance for a family pair, trying both key
    /// orders before falling back to the default.
    pub fn max_distance(&self, family1: &str, family2: &str) -> f64 {
        let forward = format!("{family1}+{family2}");
        if let Some(&d) = self.max_distances.get(&forward) {
            return d;
        }
        let reverse = format!("{family2}+{family1}");
        self.max_distances
            .get(&reverse)
            .copied()
            .unwrap_or(self.default_max_distance)
    }

    /// Append a custom fusion rule at the end of the priority order.
    pub fn add_rule(&mut self, family1: &str, family2: &str, max_distance: f64) {
        self.max_distances
            .insert(format!("{family1}+{family2}"), max_distance);

        let rule = [family1.to_string(), family2.to_string()];
        if !self.priority.contains(&rule) {
            self.priority.push(rule);
        }
    }
}

/// Configuration for the fallback density-based classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// DBSCAN neighborhood radius over cylinder centers (mm).
    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Minimum points per DBSCAN cluster (the point itself counts).
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Cylinders at or above this radius are assumed structural and
    /// never considered (mm).
    #[serde(default = "default_max_candidate_radius")]
    pub max_candidate_radius: f64,

    /// Restrict accepted cluster sizes to 7 +/- 2 instead of [5, 25].
    #[serde(default)]
    pub strict_mode: bool,

    /// Fraction of the maximum score (5.0) a cluster must reach.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
}

fn default_eps() -> f64 {
    25.0
}

fn default_min_samples() -> usize {
    5
}

fn default_max_candidate_radius() -> f64 {
    10.0
}

fn default_score_threshold() -> f64 {
    0.86
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_samples: default_min_samples(),
            max_candidate_radius: default_max_candidate_radius(),
            strict_mode: false,
            score_threshold: default_score_threshold(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
