//! Detector diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! threshold tuning. [`Detector::detect_with_diagnostics`](crate::Detector::detect_with_diagnostics)
//! collects them alongside the detections.
//!
//! Timestamps are captured via the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::Clusters;
use crate::decode::DecodeRejection;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single detector run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionDiagnostics {
    /// Stage 1: Gaussian smoothing into decode and segment profiles.
    pub preprocess: StageDiagnostics,
    /// Stage 2: gradient field.
    pub gradient: StageDiagnostics,
    /// Stage 3: union-find edge graph.
    pub edge_graph: StageDiagnostics,
    /// Stage 4: cluster extraction.
    pub clusters: StageDiagnostics,
    /// Stage 5: line fitting.
    pub line_fit: StageDiagnostics,
    /// Stage 6: successor graph.
    pub chain: StageDiagnostics,
    /// Stage 7: quad search.
    pub quad_search: StageDiagnostics,
    /// Stage 8: bit decoding.
    pub decode: StageDiagnostics,
    /// Stage 9: overlap resolution.
    pub overlap: StageDiagnostics,
    /// Total wall-clock duration of the whole detection (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: DetectionSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Smoothing metrics.
    Preprocess {
        /// Decode-profile sigma.
        decode_sigma: f32,
        /// Decode-profile kernel width in taps.
        decode_kernel_size: usize,
        /// Segment-profile sigma.
        segment_sigma: f32,
        /// Segment-profile kernel width in taps.
        segment_kernel_size: usize,
    },
    /// Gradient metrics.
    Gradient {
        /// Field width in pixels.
        width: u32,
        /// Field height in pixels.
        height: u32,
        /// Pixels at or above the magnitude noise floor.
        strong_pixel_count: usize,
    },
    /// Edge graph metrics.
    EdgeGraph {
        /// Neighbor pairs that passed the pairwise tests.
        candidate_links: usize,
        /// Pixels that joined at least one other pixel.
        joined_pixel_count: usize,
    },
    /// Cluster extraction metrics.
    Clusters {
        /// Clusters kept.
        cluster_count: usize,
        /// Points across all kept clusters.
        total_point_count: usize,
        /// Largest cluster.
        max_cluster_points: usize,
        /// Mean points per cluster.
        mean_cluster_points: f64,
    },
    /// Line fit metrics.
    LineFit {
        /// Clusters offered to the fitter.
        clusters_in: usize,
        /// Segments produced.
        segment_count: usize,
        /// Mean segment length in pixels.
        mean_length: f64,
    },
    /// Successor graph metrics.
    Chain {
        /// Segments (graph nodes).
        segment_count: usize,
        /// Parent/child links.
        link_count: usize,
    },
    /// Quad search metrics.
    QuadSearch {
        /// Quads accepted.
        quad_count: usize,
    },
    /// Decode metrics.
    Decode {
        /// Quads offered to the decoder.
        quads_in: usize,
        /// Quads that decoded to a code.
        decoded: usize,
        /// Samples left the image.
        out_of_bounds: usize,
        /// Ring contrast too low.
        low_contrast: usize,
        /// Border too light.
        border_errors: usize,
        /// No code within the Hamming limit.
        no_match: usize,
        /// Degenerate re-ordered geometry.
        degenerate: usize,
    },
    /// Overlap resolution metrics.
    Overlap {
        /// Detections before resolution.
        detections_in: usize,
        /// Detections returned to the caller.
        detections_out: usize,
    },
}

/// High-level summary counts for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Image width in pixels.
    pub image_width: u32,
    /// Image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Segments fitted.
    pub segment_count: usize,
    /// Quads found.
    pub quad_count: usize,
    /// Detections returned.
    pub detection_count: usize,
}

impl DetectionDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Detection Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Preprocess", &self.preprocess),
            ("Gradient", &self.gradient),
            ("Edge Graph", &self.edge_graph),
            ("Clusters", &self.clusters),
            ("Line Fit", &self.line_fit),
            ("Chain", &self.chain),
            ("Quad Search", &self.quad_search),
            ("Decode", &self.decode),
            ("Overlap", &self.overlap),
        ];
        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Segments: {}  |  Quads: {}  |  Detections: {}",
            self.summary.segment_count, self.summary.quad_count, self.summary.detection_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Preprocess {
            decode_sigma,
            decode_kernel_size,
            segment_sigma,
            segment_kernel_size,
        } => format!(
            "decode sigma={decode_sigma:.2} ({decode_kernel_size} taps), segment sigma={segment_sigma:.2} ({segment_kernel_size} taps)"
        ),
        StageMetrics::Gradient {
            width,
            height,
            strong_pixel_count,
        } => format!("{width}x{height}, {strong_pixel_count} above floor"),
        StageMetrics::EdgeGraph {
            candidate_links,
            joined_pixel_count,
        } => format!("{candidate_links} links, {joined_pixel_count} joined px"),
        StageMetrics::Clusters {
            cluster_count,
            total_point_count,
            max_cluster_points,
            mean_cluster_points,
        } => format!(
            "{cluster_count} clusters, {total_point_count} pts (max={max_cluster_points} mean={mean_cluster_points:.1})"
        ),
        StageMetrics::LineFit {
            clusters_in,
            segment_count,
            mean_length,
        } => format!("{clusters_in} -> {segment_count} segments (mean len {mean_length:.1}px)"),
        StageMetrics::Chain {
            segment_count,
            link_count,
        } => format!("{segment_count} segments, {link_count} links"),
        StageMetrics::QuadSearch { quad_count } => format!("{quad_count} quads"),
        StageMetrics::Decode {
            quads_in,
            decoded,
            out_of_bounds,
            low_contrast,
            border_errors,
            no_match,
            degenerate,
        } => format!(
            "{quads_in} -> {decoded} decoded (oob={out_of_bounds} contrast={low_contrast} border={border_errors} nomatch={no_match} degenerate={degenerate})"
        ),
        StageMetrics::Overlap {
            detections_in,
            detections_out,
        } => format!("{detections_in} -> {detections_out}"),
    }
}

/// Cluster size statistics for [`StageMetrics::Clusters`].
pub(crate) fn cluster_metrics(clusters: &Clusters) -> StageMetrics {
    let total: usize = clusters.values().map(Vec::len).sum();
    let max = clusters.values().map(Vec::len).max().unwrap_or(0);
    #[allow(clippy::cast_precision_loss)]
    let mean = if clusters.is_empty() {
        0.0
    } else {
        total as f64 / clusters.len() as f64
    };
    StageMetrics::Clusters {
        cluster_count: clusters.len(),
        total_point_count: total,
        max_cluster_points: max,
        mean_cluster_points: mean,
    }
}

/// Tally decode outcomes for [`StageMetrics::Decode`].
pub(crate) fn decode_metrics(quads_in: usize, rejections: &[DecodeRejection]) -> StageMetrics {
    let count = |kind: DecodeRejection| rejections.iter().filter(|&&r| r == kind).count();
    StageMetrics::Decode {
        quads_in,
        decoded: quads_in.saturating_sub(rejections.len()),
        out_of_bounds: count(DecodeRejection::OutOfBounds),
        low_contrast: count(DecodeRejection::LowContrast),
        border_errors: count(DecodeRejection::BorderErrors),
        no_match: count(DecodeRejection::NoMatch),
        degenerate: count(DecodeRejection::Degenerate),
    }
}
