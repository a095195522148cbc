//! Data writers for detection results.
//!
//! This module provides functions for exporting detection results:
//! - Stake summary CSV (one row per stake)
//! - Diagnostic CSV with per-stake rejection reasons

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::features::CylinderFeature;
use super::geometry;
use super::stake::Stake;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to flush data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

/// Write a stake summary CSV.
///
/// One row per stake: id, family, centroid, cylinder count, average
/// radius, connected planes, confidence, kind and score.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `stakes` - Stakes to export
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_stakes_csv(path: &Path, stakes: &[Stake]) -> Result<()> {
    let mut writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    writer
        .write_record([
            "cluster_id",
            "family_id",
            "x",
            "y",
            "z",
            "num_cylinders",
            "avg_radius",
            "connected_planes",
            "confidence",
            "kind",
            "score",
        ])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for stake in stakes {
        writer
            .write_record(&[
                stake.cluster_id.clone(),
                stake.family_id.clone(),
                format!("{:.3}", stake.analysis.centroid[0]),
                format!("{:.3}", stake.analysis.centroid[1]),
                format!("{:.3}", stake.analysis.centroid[2]),
                stake.analysis.num_cylinders.to_string(),
                format!("{:.3}", stake.analysis.avg_radius),
                stake.analysis.connected_planes.to_string(),
                stake.validation.confidence.to_string(),
                stake.validation.kind.clone(),
                format!("{:.2}", stake.validation.score),
            ])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write a diagnostic CSV covering accepted and rejected stakes.
///
/// Adds spread, merge provenance and the rejection reasons (joined with
/// "; ") to the summary columns so rejected clusters can be audited.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_diagnostics_csv(path: &Path, stakes: &[Stake], rejected: &[Stake]) -> Result<()> {
    let mut writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    writer
        .write_record([
            "cluster_id",
            "family_id",
            "original_families",
            "x",
            "y",
            "z",
            "num_cylinders",
            "avg_radius",
            "max_spread",
            "confidence",
            "kind",
            "score",
            "num_merged",
            "reasons",
        ])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for stake in stakes.iter().chain(rejected) {
        writer
            .write_record(&[
                stake.cluster_id.clone(),
                stake.family_id.clone(),
                stake.original_families.join("+"),
                format!("{:.3}", stake.analysis.centroid[0]),
                format!("{:.3}", stake.analysis.centroid[1]),
                format!("{:.3}", stake.analysis.centroid[2]),
                stake.analysis.num_cylinders.to_string(),
                format!("{:.3}", stake.analysis.avg_radius),
                format!("{:.3}", stake.analysis.max_spread),
                stake.validation.confidence.to_string(),
                stake.validation.kind.clone(),
                format!("{:.2}", stake.validation.score),
                stake
                    .validation
                    .num_merged
                    .map_or(String::new(), |n| n.to_string()),
                stake.validation.reasons.join("; "),
            ])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write a per-cylinder survey CSV.
///
/// One row per input cylinder with its geometry, fin evidence, whether
/// it qualifies as a potential stake under `min_planes`, and its
/// distance to the model origin. Rows are sorted by that distance,
/// descending, so the most remote candidates come first.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_cylinder_report_csv(
    path: &Path,
    cylinders: &[CylinderFeature],
    min_planes: u32,
) -> Result<()> {
    let mut writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    writer
        .write_record([
            "index",
            "x",
            "y",
            "z",
            "radius",
            "height",
            "connected_planes",
            "potential_stake",
            "distance_to_origin",
        ])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    let mut rows: Vec<(usize, f64)> = cylinders
        .iter()
        .enumerate()
        .map(|(i, c)| (i, geometry::distance(&c.center, &[0.0, 0.0, 0.0])))
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (index, dist) in rows {
        let cyl = &cylinders[index];
        writer
            .write_record(&[
                index.to_string(),
                format!("{:.3}", cyl.center[0]),
                format!("{:.3}", cyl.center[1]),
                format!("{:.3}", cyl.center[2]),
                format!("{:.3}", cyl.radius),
                format!("{:.3}", cyl.height),
                cyl.connected_planes.to_string(),
                (cyl.connected_planes >= min_planes).to_string(),
                format!("{dist:.3}"),
            ])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}
