//! Heat stake detection pipeline for extracted CAD geometry.
//!
//! This crate provides tools for:
//! - Loading cylinder feature CSVs produced by a geometry extractor
//! - Grouping stake candidates into radius families
//! - Merging duplicate detections and fusing multi-part stakes
//! - Density-based fallback classification of low-evidence cylinders
//!
//! # Example
//!
//! ```no_run
//! use stake_pipeline::core::loaders::load_cylinders_csv;
//! use stake_pipeline::processors::pipeline::StakeDetector;
//!
//! let cylinders = load_cylinders_csv("cylinders.csv").unwrap();
//! let outcome = StakeDetector::with_defaults().detect(&cylinders).unwrap();
//! println!("{} stakes detected", outcome.stakes.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{DetectionConfig, FallbackConfig, FusionConfig, PipelineConfig};
pub use core::features::CylinderFeature;
pub use core::stake::Stake;
pub use processors::pipeline::{DetectionOutcome, StakeDetector};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
