//! Core data types and I/O operations.

pub mod features;
pub mod geometry;
pub mod loaders;
pub mod stake;
pub mod writers;

pub use features::{validate_features, CylinderFeature, FeatureError};
pub use loaders::{load_cylinders_csv, LoaderError};
pub use stake::{Confidence, Stake, StakeAnalysis, StakeValidation};
pub use writers::{
    write_cylinder_report_csv, write_diagnostics_csv, write_stakes_csv, WriteError,
};
