//! Detection processing stages.

pub mod clustering;
pub mod dedup;
pub mod fallback;
pub mod families;
pub mod fusion;
pub mod pipeline;

// Re-export key types for convenience
pub use clustering::dbscan;
pub use dedup::merge_close_candidates;
pub use fallback::classify_leftovers;
pub use families::group_by_families;
pub use fusion::FusionEngine;
pub use pipeline::{DetectionOutcome, StakeDetector};
