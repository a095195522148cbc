//! Data loaders for cylinder feature CSV files.
//!
//! A cylinder CSV is the hand-off format from the upstream geometry
//! extractor: one row per detected cylinder face with its center,
//! radius, height, axis direction and the number of connected planar
//! faces (fin evidence).

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

use super::features::CylinderFeature;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Required coordinate and radius columns.
const REQUIRED_COLUMNS: [&str; 4] = ["x", "y", "z", "radius"];

/// Load cylinder features from a CSV file.
///
/// The CSV must have a header row. Column names are matched
/// case-insensitively:
/// - Required: `x`, `y`, `z`, `radius`
/// - Optional: `height` (default 0), `dx`, `dy`, `dz` (default upright
///   axis `0, 0, 1`), `connected_planes` (default 0)
///
/// # Arguments
///
/// * `path` - Path to the cylinder CSV file
///
/// # Returns
///
/// One `CylinderFeature` per data row, in file order.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a required column is
/// missing, a cell fails to parse as a number, or the file has no data
/// rows.
pub fn load_cylinders_csv<P: AsRef<Path>>(path: P) -> Result<Vec<CylinderFeature>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    // Map lowercase header names to column indices.
    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|name| !col_map.contains_key(**name))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }

    let get_f64 = |record: &csv::StringRecord, name: &str, default: f64| -> Result<f64> {
        match col_map.get(name).and_then(|&i| record.get(i)) {
            None | Some("") => Ok(default),
            Some(cell) => cell.trim().parse().map_err(|_| {
                LoaderError::ParseError(format!("invalid {name} value: {cell}"))
            }),
        }
    };

    let mut cylinders = Vec::new();
    for result in reader.records() {
        let record = result?;

        let connected_planes = match col_map
            .get("connected_planes")
            .and_then(|&i| record.get(i))
        {
            None | Some("") => 0,
            Some(cell) => cell.trim().parse().map_err(|_| {
                LoaderError::ParseError(format!("invalid connected_planes value: {cell}"))
            })?,
        };

        cylinders.push(CylinderFeature {
            center: [
                get_f64(&record, "x", 0.0)?,
                get_f64(&record, "y", 0.0)?,
                get_f64(&record, "z", 0.0)?,
            ],
            radius: get_f64(&record, "radius", 0.0)?,
            height: get_f64(&record, "height", 0.0)?,
            direction: [
                get_f64(&record, "dx", 0.0)?,
                get_f64(&record, "dy", 0.0)?,
                get_f64(&record, "dz", 1.0)?,
            ],
            connected_planes,
        });
    }

    if cylinders.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(cylinders)
}
