//! quadtag-bench: CLI tool for detector tuning and diagnostics.
//!
//! Runs the tag detector on a given image file with a codebook loaded
//! from JSON and configurable thresholds, printing the detections and
//! per-stage diagnostics. Useful for:
//!
//! - Tuning edge, line-fit and decode thresholds against real images
//! - Measuring per-stage durations to identify bottlenecks
//! - Seeing which stage loses a tag (segments, quads, decode rejections)
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin quadtag-bench -- --codebook crates/quadtag-bench/codebooks/demo16h5.json [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use quadtag_pipeline::{
    DetectionDiagnostics, Detector, DetectorConfig, TagCodebook, TagDetection,
};

/// Tag detector tuning and diagnostics.
///
/// Detects fiducial tags in an image and prints each detection along
/// with per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "quadtag-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Path to the tag family codebook (JSON: name, bits, min_hamming, codes).
    #[arg(long)]
    codebook: PathBuf,

    /// Black border width in bits.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_BLACK_BORDER)]
    black_border: u32,

    /// Gaussian sigma for the decode profile (0 disables smoothing).
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_DECODE_SIGMA)]
    decode_sigma: f32,

    /// Gaussian sigma for the segmentation profile.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_SEGMENT_SIGMA)]
    segment_sigma: f32,

    /// Gradient magnitude noise floor.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MIN_MAGNITUDE)]
    min_magnitude: f64,

    /// Pairwise edge orientation tolerance in radians.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MAX_EDGE_ANGLE)]
    max_edge_angle: f64,

    /// Component orientation-spread allowance.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_THETA_MERGE_K)]
    theta_merge_k: f64,

    /// Component magnitude-spread allowance.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MAGNITUDE_MERGE_K)]
    magnitude_merge_k: f64,

    /// Minimum points per cluster.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MIN_CLUSTER_PIXELS)]
    min_cluster_pixels: usize,

    /// Maximum minor/major eigenvalue ratio of a line fit.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MAX_FIT_ANISOTROPY)]
    max_fit_anisotropy: f64,

    /// Shortest accepted segment in pixels.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MIN_SEGMENT_LENGTH)]
    min_segment_length: f64,

    /// Corner gap allowance as a fraction of segment length.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_CHAIN_LENGTH_RATIO)]
    chain_length_ratio: f64,

    /// Constant corner gap allowance in pixels.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_CHAIN_MIN_GAP)]
    chain_min_gap: f64,

    /// Minimum turn between chained segments in radians.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MIN_TURN_ANGLE)]
    min_turn_angle: f64,

    /// Minimum quad area in square pixels.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MIN_QUAD_AREA)]
    min_quad_area: f64,

    /// Minimum quad compactness (1 for a square).
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MIN_QUAD_COMPACTNESS)]
    min_quad_compactness: f64,

    /// Minimum light ring minus dark border contrast.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MIN_DECODE_CONTRAST)]
    min_decode_contrast: f64,

    /// Fraction of border cells allowed to read as light.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_MAX_BORDER_ERROR_FRACTION)]
    max_border_error_fraction: f64,

    /// Maximum corrected bit errors (defaults to what the codebook can correct).
    #[arg(long)]
    max_hamming: Option<u32>,

    /// Overlap fraction above which two detections conflict.
    #[arg(long, default_value_t = DetectorConfig::DEFAULT_OVERLAP_THRESHOLD)]
    overlap_threshold: f64,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output detections and diagnostics as JSON instead of a report.
    #[arg(long)]
    json: bool,

    /// Full detector config as a JSON string.
    ///
    /// When provided, all other threshold flags are ignored. Missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Log level (off, error, warn, info, debug, trace). `RUST_LOG` overrides it.
    #[arg(long, default_value_t = LevelFilter::Warn)]
    log_level: LevelFilter,
}

/// Build a [`DetectorConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual threshold flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<DetectorConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(DetectorConfig {
        black_border: cli.black_border,
        decode_sigma: cli.decode_sigma,
        segment_sigma: cli.segment_sigma,
        min_magnitude: cli.min_magnitude,
        max_edge_angle: cli.max_edge_angle,
        theta_merge_k: cli.theta_merge_k,
        magnitude_merge_k: cli.magnitude_merge_k,
        min_cluster_pixels: cli.min_cluster_pixels,
        max_fit_anisotropy: cli.max_fit_anisotropy,
        min_segment_length: cli.min_segment_length,
        chain_length_ratio: cli.chain_length_ratio,
        chain_min_gap: cli.chain_min_gap,
        min_turn_angle: cli.min_turn_angle,
        min_quad_area: cli.min_quad_area,
        min_quad_compactness: cli.min_quad_compactness,
        min_decode_contrast: cli.min_decode_contrast,
        max_border_error_fraction: cli.max_border_error_fraction,
        max_hamming: cli.max_hamming,
        overlap_threshold: cli.overlap_threshold,
    })
}

fn load_codebook(path: &Path) -> Result<TagCodebook, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    TagCodebook::from_json(&json).map_err(|e| format!("Error loading codebook: {e}"))
}

fn build_detector(cli: &Cli) -> Result<Detector, String> {
    let config = config_from_cli(cli)?;
    let codebook = load_codebook(&cli.codebook)?;
    eprintln!(
        "Codebook: {} ({} codes, {} bits, min hamming {})",
        codebook.name(),
        codebook.len(),
        codebook.bits(),
        codebook.min_hamming(),
    );
    eprintln!("Config: {config:#?}");
    Detector::with_config(codebook, config).map_err(|e| format!("Invalid config: {e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .parse_default_env()
        .init();

    let detector = match build_detector(&cli) {
        Ok(d) => d,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let image = match quadtag_pipeline::decode_to_intensity(&image_bytes) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error decoding {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match detector.detect_with_diagnostics(&image) {
            Ok((detections, diagnostics)) => {
                if cli.json {
                    let value = serde_json::json!({
                        "detections": detections,
                        "diagnostics": diagnostics,
                    });
                    match serde_json::to_string_pretty(&value) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing output: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    // Detections are identical across runs; list them once.
                    if run == 0 {
                        print_detections(&detections);
                    }
                    println!("{}", diagnostics.report());
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Detection error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

fn print_detections(detections: &[TagDetection]) {
    println!("Detections ({})", detections.len());
    println!("{}", "=".repeat(60));
    for tag in detections {
        let corners: Vec<String> = tag
            .corners
            .iter()
            .map(|p| format!("({:.2}, {:.2})", p.x, p.y))
            .collect();
        println!(
            "id {:>4}  hamming {}  rotation {}  goodness {:.2}  corners {}",
            tag.id,
            tag.hamming,
            tag.rotation,
            tag.goodness,
            corners.join(" "),
        );
    }
    println!();
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&DetectionDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[DetectionDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Preprocess", |d| d.preprocess.duration),
        ("Gradient", |d| d.gradient.duration),
        ("Edge Graph", |d| d.edge_graph.duration),
        ("Clusters", |d| d.clusters.duration),
        ("Line Fit", |d| d.line_fit.duration),
        ("Chain", |d| d.chain.duration),
        ("Quad Search", |d| d.quad_search.duration),
        ("Decode", |d| d.decode.duration),
        ("Overlap", |d| d.overlap.duration),
    ];

    for (name, extractor) in stage_extractors {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
