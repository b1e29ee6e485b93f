//! The detector: configuration plus the nine stages run in order.

use std::sync::Arc;
use std::time::Duration;

use web_time::Instant;

use crate::blur::{GaussianKernel, preprocess};
use crate::chain::{ChainParams, SuccessorGraph};
use crate::cluster::extract_clusters;
use crate::codebook::TagCodebook;
use crate::decode::{DecodeParams, decode_quad};
use crate::diagnostics::{
    DetectionDiagnostics, DetectionSummary, StageDiagnostics, StageMetrics, cluster_metrics,
    decode_metrics,
};
use crate::edge::{EdgeParams, build_edge_graph};
use crate::gradient::GradientField;
use crate::grayscale::{decode_to_intensity, gray_to_intensity};
use crate::line_fit::{LineFitParams, Segment, fit_segments};
use crate::overlap::resolve_overlaps;
use crate::quad::{Quad, QuadParams, search_quads};
use crate::types::{DetectorConfig, DetectorError, GrayImage, IntensityImage, TagDetection};

/// Smallest image side with interior pixels.
const MIN_SIDE: u32 = 3;

/// Every intermediate of one detection run.
#[derive(Debug, Clone)]
pub struct StagedDetection {
    /// Fitted segments, indexed as in `links` and [`Quad::segments`].
    pub segments: Vec<Segment>,
    /// Successor links `(parent, child)`, sorted.
    pub links: Vec<(usize, usize)>,
    /// Quads found by the search.
    pub quads: Vec<Quad>,
    /// Decoded detections before overlap resolution, in quad order.
    pub candidates: Vec<TagDetection>,
    /// Final detections, best first.
    pub detections: Vec<TagDetection>,
    /// Per-stage timing and counts.
    pub diagnostics: DetectionDiagnostics,
}

/// Tag detector.
///
/// Holds only read-only state between calls: the codebook, the
/// configuration and the two precomputed Gaussian kernels. `detect`
/// takes `&self`, so one detector can serve many threads; the setters
/// take `&mut self` and cannot race an in-flight call.
#[derive(Debug, Clone)]
pub struct Detector {
    codebook: Arc<TagCodebook>,
    config: DetectorConfig,
    decode_kernel: GaussianKernel,
    segment_kernel: GaussianKernel,
}

impl Detector {
    /// Detector with the default configuration.
    #[must_use]
    pub fn new(codebook: impl Into<Arc<TagCodebook>>) -> Self {
        let config = DetectorConfig::default();
        Self {
            codebook: codebook.into(),
            decode_kernel: GaussianKernel::new(config.decode_sigma),
            segment_kernel: GaussianKernel::new(config.segment_sigma),
            config,
        }
    }

    /// Detector with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::InvalidConfig`] if `config` fails
    /// [`DetectorConfig::validate`].
    pub fn with_config(
        codebook: impl Into<Arc<TagCodebook>>,
        config: DetectorConfig,
    ) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Self {
            codebook: codebook.into(),
            decode_kernel: GaussianKernel::new(config.decode_sigma),
            segment_kernel: GaussianKernel::new(config.segment_sigma),
            config,
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The shared codebook.
    #[must_use]
    pub fn codebook(&self) -> &TagCodebook {
        &self.codebook
    }

    /// Black border width in bits.
    #[must_use]
    pub const fn black_border(&self) -> u32 {
        self.config.black_border
    }

    /// Decode-profile smoothing sigma.
    #[must_use]
    pub const fn decode_sigma(&self) -> f32 {
        self.config.decode_sigma
    }

    /// Segment-profile smoothing sigma.
    #[must_use]
    pub const fn segment_sigma(&self) -> f32 {
        self.config.segment_sigma
    }

    /// Change the black border width.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::InvalidConfig`] for a zero width; the
    /// detector is left unchanged.
    pub fn set_black_border(&mut self, bits: u32) -> Result<(), DetectorError> {
        let config = DetectorConfig {
            black_border: bits,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Change the decode-profile sigma and rebuild its kernel.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::InvalidConfig`] for a negative or
    /// non-finite sigma; the detector is left unchanged.
    pub fn set_decode_sigma(&mut self, sigma: f32) -> Result<(), DetectorError> {
        let config = DetectorConfig {
            decode_sigma: sigma,
            ..self.config.clone()
        };
        config.validate()?;
        self.decode_kernel = GaussianKernel::new(sigma);
        self.config = config;
        Ok(())
    }

    /// Change the segment-profile sigma and rebuild its kernel.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::InvalidConfig`] for a negative or
    /// non-finite sigma; the detector is left unchanged.
    pub fn set_segment_sigma(&mut self, sigma: f32) -> Result<(), DetectorError> {
        let config = DetectorConfig {
            segment_sigma: sigma,
            ..self.config.clone()
        };
        config.validate()?;
        self.segment_kernel = GaussianKernel::new(sigma);
        self.config = config;
        Ok(())
    }

    /// Detect tags in an intensity image.
    ///
    /// Zero detections is a normal outcome. Detections come best first:
    /// fewest bit errors, then largest area.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::ImageTooSmall`] if either side is below
    /// 3 pixels.
    pub fn detect(&self, image: &IntensityImage) -> Result<Vec<TagDetection>, DetectorError> {
        Ok(self.detect_staged(image)?.detections)
    }

    /// Detect tags and report per-stage diagnostics.
    ///
    /// # Errors
    ///
    /// Same as [`detect`](Self::detect).
    pub fn detect_with_diagnostics(
        &self,
        image: &IntensityImage,
    ) -> Result<(Vec<TagDetection>, DetectionDiagnostics), DetectorError> {
        let staged = self.detect_staged(image)?;
        Ok((staged.detections, staged.diagnostics))
    }

    /// Decode image bytes (PNG, JPEG, BMP, WebP) and detect tags.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::EmptyInput`] or
    /// [`DetectorError::ImageDecode`] for unusable bytes, otherwise as
    /// [`detect`](Self::detect).
    pub fn detect_bytes(&self, bytes: &[u8]) -> Result<Vec<TagDetection>, DetectorError> {
        self.detect(&decode_to_intensity(bytes)?)
    }

    /// Detect tags in an 8-bit grayscale image.
    ///
    /// # Errors
    ///
    /// Same as [`detect`](Self::detect).
    pub fn detect_gray(&self, image: &GrayImage) -> Result<Vec<TagDetection>, DetectorError> {
        self.detect(&gray_to_intensity(image))
    }

    /// Run every stage and keep all intermediates.
    ///
    /// # Errors
    ///
    /// Same as [`detect`](Self::detect).
    pub fn detect_staged(&self, image: &IntensityImage) -> Result<StagedDetection, DetectorError> {
        let (width, height) = image.dimensions();
        if width < MIN_SIDE || height < MIN_SIDE {
            return Err(DetectorError::ImageTooSmall { width, height });
        }
        let config = &self.config;
        let run_start = Instant::now();

        // 1. Smooth into decode and segment profiles.
        let (profiles, preprocess_time) =
            timed(|| preprocess(image, &self.decode_kernel, &self.segment_kernel));
        let preprocess_diag = StageDiagnostics {
            duration: preprocess_time,
            metrics: StageMetrics::Preprocess {
                decode_sigma: self.decode_kernel.sigma(),
                decode_kernel_size: self.decode_kernel.size(),
                segment_sigma: self.segment_kernel.sigma(),
                segment_kernel_size: self.segment_kernel.size(),
            },
        };

        // 2. Gradient field.
        let (field, gradient_time) = timed(|| GradientField::compute(&profiles.segment));
        let gradient_diag = StageDiagnostics {
            duration: gradient_time,
            metrics: StageMetrics::Gradient {
                width,
                height,
                strong_pixel_count: field
                    .magnitudes()
                    .iter()
                    .filter(|&&m| m >= config.min_magnitude)
                    .count(),
            },
        };

        // 3. Union-find edge graph.
        let ((mut forest, candidate_links), edge_time) =
            timed(|| build_edge_graph(&field, &EdgeParams::from(config)));
        let edge_diag = StageDiagnostics {
            duration: edge_time,
            metrics: StageMetrics::EdgeGraph {
                candidate_links,
                joined_pixel_count: (0..forest.len()).filter(|&i| forest.is_joined(i)).count(),
            },
        };

        // 4. Clusters.
        let (clusters, cluster_time) =
            timed(|| extract_clusters(&mut forest, &field, config.min_cluster_pixels));
        let cluster_diag = StageDiagnostics {
            duration: cluster_time,
            metrics: cluster_metrics(&clusters),
        };

        // 5. Line fits.
        let (segments, fit_time) =
            timed(|| fit_segments(&clusters, &field, &LineFitParams::from(config)));
        #[allow(clippy::cast_precision_loss)]
        let mean_length = if segments.is_empty() {
            0.0
        } else {
            segments.iter().map(|s| s.length).sum::<f64>() / segments.len() as f64
        };
        let fit_diag = StageDiagnostics {
            duration: fit_time,
            metrics: StageMetrics::LineFit {
                clusters_in: clusters.len(),
                segment_count: segments.len(),
                mean_length,
            },
        };
        log::debug!(
            "line fit: {} clusters -> {} segments",
            clusters.len(),
            segments.len()
        );
        drop(clusters);

        // 6. Successor graph.
        let (graph, chain_time) =
            timed(|| SuccessorGraph::build(&segments, &ChainParams::from(config)));
        let chain_diag = StageDiagnostics {
            duration: chain_time,
            metrics: StageMetrics::Chain {
                segment_count: graph.segment_count(),
                link_count: graph.link_count(),
            },
        };

        // 7. Quads.
        let (quads, quad_time) =
            timed(|| search_quads(&segments, &graph, &QuadParams::from(config)));
        let quad_diag = StageDiagnostics {
            duration: quad_time,
            metrics: StageMetrics::QuadSearch {
                quad_count: quads.len(),
            },
        };

        // 8. Decode.
        let decode_params = DecodeParams::new(config, &self.codebook);
        let ((candidates, rejections), decode_time) = timed(|| {
            let mut candidates = Vec::new();
            let mut rejections = Vec::new();
            for quad in &quads {
                match decode_quad(quad, &profiles.decode, &self.codebook, &decode_params) {
                    Ok(detection) => candidates.push(detection),
                    Err(reason) => {
                        log::trace!("quad {:?} not decoded: {reason}", quad.segments);
                        rejections.push(reason);
                    }
                }
            }
            (candidates, rejections)
        });
        let decode_diag = StageDiagnostics {
            duration: decode_time,
            metrics: decode_metrics(quads.len(), &rejections),
        };
        log::debug!(
            "decode: {} quads -> {} detections",
            quads.len(),
            candidates.len()
        );

        // 9. Overlap resolution.
        let (detections, overlap_time) =
            timed(|| resolve_overlaps(candidates.clone(), config.overlap_threshold));
        let overlap_diag = StageDiagnostics {
            duration: overlap_time,
            metrics: StageMetrics::Overlap {
                detections_in: candidates.len(),
                detections_out: detections.len(),
            },
        };
        log::debug!(
            "overlap: {} -> {} detections",
            candidates.len(),
            detections.len()
        );

        let links = (0..segments.len())
            .flat_map(|a| graph.successors(a).into_iter().map(move |b| (a, b)))
            .collect();

        let diagnostics = DetectionDiagnostics {
            preprocess: preprocess_diag,
            gradient: gradient_diag,
            edge_graph: edge_diag,
            clusters: cluster_diag,
            line_fit: fit_diag,
            chain: chain_diag,
            quad_search: quad_diag,
            decode: decode_diag,
            overlap: overlap_diag,
            total_duration: run_start.elapsed(),
            summary: DetectionSummary {
                image_width: width,
                image_height: height,
                pixel_count: u64::from(width) * u64::from(height),
                segment_count: segments.len(),
                quad_count: quads.len(),
                detection_count: detections.len(),
            },
        };

        Ok(StagedDetection {
            segments,
            links,
            quads,
            candidates,
            detections,
            diagnostics,
        })
    }
}

fn timed<T>(stage: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = stage();
    (out, start.elapsed())
}
