//! Command-line interface for the stake detection pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Instant;

use crate::core::loaders::load_cylinders_csv;
use crate::core::stake::Stake;
use crate::core::writers::{write_cylinder_report_csv, write_diagnostics_csv, write_stakes_csv};
use crate::processors::pipeline::StakeDetector;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "stake-pipeline")]
#[command(about = "Heat stake detection pipeline for extracted CAD geometry", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect heat stakes in a cylinder feature CSV
    Detect {
        /// Input cylinder CSV file
        input: PathBuf,

        /// Minimum connected planes for the family phase
        #[arg(long)]
        min_planes: Option<u32>,

        /// Duplicate merge radius within a family (mm)
        #[arg(long)]
        merge_distance: Option<f64>,

        /// Fallback clustering neighborhood radius (mm)
        #[arg(long)]
        eps: Option<f64>,

        /// Fallback minimum samples per cluster
        #[arg(long)]
        min_samples: Option<usize>,

        /// Fallback score acceptance threshold (0..1)
        #[arg(long)]
        score_threshold: Option<f64>,

        /// Restrict fallback clusters to 5-9 cylinders
        #[arg(long)]
        strict: bool,

        /// Extra fusion rules, e.g. "GRP1+GRP3=22.5,GRP3+GRP3=18"
        #[arg(long)]
        custom_rules: Option<String>,

        /// Output CSV for the detected stakes
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print rejected fallback clusters with reasons
        #[arg(long)]
        show_rejected: bool,
    },

    /// Survey a cylinder CSV and explain cluster accept/reject verdicts
    Diagnose {
        /// Input cylinder CSV file
        input: PathBuf,

        /// Output CSV for the per-cylinder survey
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output CSV for the per-cluster diagnostic table
        #[arg(long)]
        clusters: Option<PathBuf>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.len() > 39 {
            format!("{}...", &value[..36])
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Detect {
            input,
            min_planes,
            merge_distance,
            eps,
            min_samples,
            score_threshold,
            strict,
            custom_rules,
            output,
            show_rejected,
        } => {
            cmd_detect(
                &input,
                min_planes,
                merge_distance,
                eps,
                min_samples,
                score_threshold,
                strict,
                custom_rules,
                output,
                show_rejected,
                config,
            );
        }
        Commands::Diagnose {
            input,
            output,
            clusters,
        } => {
            cmd_diagnose(&input, output, clusters, config);
        }
    }
}

/// Parse a `"GRP1+GRP2=22.5,GRP3+GRP3=18"` rule list.
fn parse_custom_rules(spec: &str) -> Result<Vec<(String, String, f64)>, String> {
    let mut rules = Vec::new();
    for entry in spec.split(',').filter(|e| !e.trim().is_empty()) {
        let (pair, dist) = entry
            .split_once('=')
            .ok_or_else(|| format!("rule '{entry}' is missing '='"))?;
        let (left, right) = pair
            .split_once('+')
            .ok_or_else(|| format!("rule '{entry}' is missing '+'"))?;
        let distance: f64 = dist
            .trim()
            .parse()
            .map_err(|_| format!("rule '{entry}' has an invalid distance"))?;
        rules.push((left.trim().to_string(), right.trim().to_string(), distance));
    }
    Ok(rules)
}

#[allow(clippy::too_many_arguments)]
fn cmd_detect(
    input: &PathBuf,
    min_planes: Option<u32>,
    merge_distance: Option<f64>,
    eps: Option<f64>,
    min_samples: Option<usize>,
    score_threshold: Option<f64>,
    strict: bool,
    custom_rules: Option<String>,
    output: Option<PathBuf>,
    show_rejected: bool,
    mut config: PipelineConfig,
) {
    let start = Instant::now();

    // Apply CLI overrides on top of the loaded config
    if let Some(v) = min_planes {
        config.detection.min_connected_planes = v;
    }
    if let Some(v) = merge_distance {
        config.detection.merge_distance = v;
    }
    if let Some(v) = eps {
        config.fallback.eps = v;
    }
    if let Some(v) = min_samples {
        config.fallback.min_samples = v;
    }
    if let Some(v) = score_threshold {
        config.fallback.score_threshold = v;
    }
    if strict {
        config.fallback.strict_mode = true;
    }
    if let Some(spec) = custom_rules.as_deref() {
        match parse_custom_rules(spec) {
            Ok(rules) => {
                for (left, right, distance) in rules {
                    config.fusion.add_rule(&left, &right, distance);
                }
            }
            Err(e) => {
                error!("Invalid --custom-rules: {}", e);
                std::process::exit(1);
            }
        }
    }

    println!("Detecting heat stakes...");
    println!("Input: {}", input.display());

    let cylinders = match load_cylinders_csv(input) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load cylinder CSV: {}", e);
            std::process::exit(1);
        }
    };

    let spinner = create_spinner("Running detection pipeline...");

    let detector = StakeDetector::new(config);
    let outcome = match detector.detect(&cylinders) {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Detection failed: {}", e);
            std::process::exit(1);
        }
    };
    spinner.finish_and_clear();

    for stake in &outcome.stakes {
        println!(
            "  {} [{}] at ({:.1}, {:.1}, {:.1}): {} cylinders, r~{:.1}mm, {} ({:.1})",
            stake.cluster_id,
            stake.family_id,
            stake.analysis.centroid[0],
            stake.analysis.centroid[1],
            stake.analysis.centroid[2],
            stake.analysis.num_cylinders,
            stake.analysis.avg_radius,
            stake.validation.confidence,
            stake.validation.score,
        );
    }

    if show_rejected {
        print_rejected(&outcome.rejected);
    }

    if let Some(path) = &output {
        if let Err(e) = write_stakes_csv(path, &outcome.stakes) {
            error!("Failed to write output CSV: {}", e);
            std::process::exit(1);
        }
        println!("Wrote {} stakes to {}", outcome.stakes.len(), path.display());
    }

    let merged_count = outcome
        .stakes
        .iter()
        .filter(|s| s.validation.num_merged.is_some())
        .count();

    print_summary(
        "Detection Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Cylinders", cylinders.len().to_string()),
            ("Stakes found", outcome.stakes.len().to_string()),
            ("Merged stakes", merged_count.to_string()),
            ("Rejected clusters", outcome.rejected.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_diagnose(
    input: &PathBuf,
    output: Option<PathBuf>,
    clusters: Option<PathBuf>,
    config: PipelineConfig,
) {
    let start = Instant::now();

    println!("Diagnosing cylinder CSV...");
    println!("Input: {}", input.display());

    let cylinders = match load_cylinders_csv(input) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load cylinder CSV: {}", e);
            std::process::exit(1);
        }
    };

    // Radius census: how the population would bucket into families.
    let mut census: Vec<(i64, usize)> = Vec::new();
    for cyl in &cylinders {
        let key = (cyl.radius * 10.0).round() as i64;
        match census.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => census.push((key, 1)),
        }
    }
    census.sort_unstable_by_key(|&(k, n)| (std::cmp::Reverse(n), k));

    println!("Radius census (top 5):");
    for (key, count) in census.iter().take(5) {
        println!("  r~{:.1}mm: {} cylinders", *key as f64 / 10.0, count);
    }

    let min_planes = config.detection.min_connected_planes;
    let qualifying = cylinders
        .iter()
        .filter(|c| c.connected_planes >= min_planes)
        .count();

    // Most remote potential stakes: far-flung candidates are the ones
    // operators usually want to double-check against the model.
    let mut remote: Vec<(usize, f64)> = cylinders
        .iter()
        .enumerate()
        .filter(|(_, c)| c.connected_planes >= min_planes)
        .map(|(i, c)| {
            let d = (c.center[0] * c.center[0]
                + c.center[1] * c.center[1]
                + c.center[2] * c.center[2])
                .sqrt();
            (i, d)
        })
        .collect();
    remote.sort_by(|a, b| b.1.total_cmp(&a.1));

    println!("Most remote potential stakes (top 5):");
    for (index, dist) in remote.iter().take(5) {
        let cyl = &cylinders[*index];
        println!(
            "  #{index} at ({:.1}, {:.1}, {:.1}): r {:.1}mm, {} fins, {dist:.1}mm from origin",
            cyl.center[0], cyl.center[1], cyl.center[2], cyl.radius, cyl.connected_planes
        );
    }

    if let Some(path) = &output {
        if let Err(e) = write_cylinder_report_csv(path, &cylinders, min_planes) {
            error!("Failed to write cylinder report: {}", e);
            std::process::exit(1);
        }
        println!("Wrote per-cylinder survey to {}", path.display());
    }

    let spinner = create_spinner("Running detection pipeline...");

    let detector = StakeDetector::new(config);
    let outcome = match detector.detect(&cylinders) {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Detection failed: {}", e);
            std::process::exit(1);
        }
    };
    spinner.finish_and_clear();

    print_rejected(&outcome.rejected);

    if let Some(path) = &clusters {
        if let Err(e) = write_diagnostics_csv(path, &outcome.stakes, &outcome.rejected) {
            error!("Failed to write cluster diagnostics: {}", e);
            std::process::exit(1);
        }
        println!("Wrote cluster diagnostics to {}", path.display());
    }

    print_summary(
        "Diagnosis Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Cylinders", cylinders.len().to_string()),
            ("With fin evidence", qualifying.to_string()),
            ("Radius buckets", census.len().to_string()),
            ("Stakes found", outcome.stakes.len().to_string()),
            ("Rejected clusters", outcome.rejected.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn print_rejected(rejected: &[Stake]) {
    if rejected.is_empty() {
        println!("No rejected clusters.");
        return;
    }

    println!("Rejected clusters:");
    for stake in rejected {
        println!(
            "  {} at ({:.1}, {:.1}, {:.1}): {} cylinders, {} ({:.1})",
            stake.cluster_id,
            stake.analysis.centroid[0],
            stake.analysis.centroid[1],
            stake.analysis.centroid[2],
            stake.analysis.num_cylinders,
            stake.validation.confidence,
            stake.validation.score,
        );
        for reason in &stake.validation.reasons {
            println!("    - {}", reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_custom_rules() {
        let rules = parse_custom_rules("GRP1+GRP3=22.5, GRP3+GRP3=18").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0], ("GRP1".to_string(), "GRP3".to_string(), 22.5));
        assert_eq!(rules[1], ("GRP3".to_string(), "GRP3".to_string(), 18.0));
    }

    #[test]
    fn test_parse_custom_rules_rejects_malformed() {
        assert!(parse_custom_rules("GRP1+GRP3").is_err());
        assert!(parse_custom_rules("GRP1=22.5").is_err());
        assert!(parse_custom_rules("GRP1+GRP3=abc").is_err());
    }
}
