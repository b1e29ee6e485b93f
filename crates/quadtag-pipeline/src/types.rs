//! Shared types for the quadtag detection pipeline.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::homography::Homography;

/// Re-export `GrayImage` so downstream crates can hand 8-bit frames to
/// the detector without depending on `image` directly.
pub use image::GrayImage;

/// Single-channel floating-point intensity buffer, samples in `[0, 1]`.
///
/// Both smoothing profiles (decode and segment) are stored in this
/// format. Pixel centers sit at integer coordinates.
pub type IntensityImage = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Returns `true` if both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Tunable parameters for every stage of the detector.
///
/// All thresholds are public so they can be tuned against reference
/// images. [`DetectorConfig::validate`] checks ranges; the
/// [`Detector`](crate::Detector) runs it on construction and in every
/// setter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Width of the black border around the bit grid, in bits.
    pub black_border: u32,

    /// Gaussian sigma applied before bit sampling. Small tags lose their
    /// bit boundaries under heavy smoothing; `0.0` disables it.
    pub decode_sigma: f32,

    /// Gaussian sigma applied before gradient computation. Some smoothing
    /// almost always helps segmentation.
    pub segment_sigma: f32,

    /// Gradient magnitude noise floor. Pixels below it never join a
    /// component.
    pub min_magnitude: f64,

    /// Largest orientation difference (radians, half-circle) between two
    /// neighboring pixels that may still be unioned.
    pub max_edge_angle: f64,

    /// Orientation-spread allowance of a merged component, divided by the
    /// merged component size.
    pub theta_merge_k: f64,

    /// Magnitude-spread allowance of a merged component, divided by the
    /// merged component size.
    pub magnitude_merge_k: f64,

    /// Minimum number of pixels a cluster needs to be line-fitted.
    pub min_cluster_pixels: usize,

    /// Largest ratio of minor to major covariance eigenvalue accepted as a
    /// line. Values near 1 mean an isotropic blob.
    pub max_fit_anisotropy: f64,

    /// Shortest segment (pixels) kept after line fitting.
    pub min_segment_length: f64,

    /// Allowed gap between a segment end and the corner it forms with its
    /// successor, as a fraction of the segment length.
    pub chain_length_ratio: f64,

    /// Constant part of the allowed corner gap, in pixels.
    pub chain_min_gap: f64,

    /// Minimum turn (radians) between chained segments. Turns above
    /// `PI - min_turn_angle` are rejected as well.
    pub min_turn_angle: f64,

    /// Minimum quad area in square pixels.
    pub min_quad_area: f64,

    /// Minimum `16 * area / perimeter^2`; a square scores 1.
    pub min_quad_compactness: f64,

    /// Minimum difference between the mean light-ring and mean
    /// dark-border intensities for a quad to be decoded.
    pub min_decode_contrast: f64,

    /// Fraction of border cells that may read as light before the quad is
    /// rejected.
    pub max_border_error_fraction: f64,

    /// Maximum number of corrected bit errors. `None` uses the
    /// codebook's own correction capacity.
    pub max_hamming: Option<u32>,

    /// Intersection area, as a fraction of the smaller detection's area,
    /// above which two detections compete for the same region.
    pub overlap_threshold: f64,
}

impl DetectorConfig {
    /// Default black border width in bits.
    pub const DEFAULT_BLACK_BORDER: u32 = 1;
    /// Widest accepted black border, in bits.
    pub const MAX_BLACK_BORDER: u32 = 8;
    /// Default decode-profile smoothing sigma.
    pub const DEFAULT_DECODE_SIGMA: f32 = 0.8;
    /// Default segment-profile smoothing sigma.
    pub const DEFAULT_SEGMENT_SIGMA: f32 = 0.8;
    /// Default gradient magnitude noise floor.
    pub const DEFAULT_MIN_MAGNITUDE: f64 = 0.06;
    /// Default pairwise orientation tolerance (30 degrees).
    pub const DEFAULT_MAX_EDGE_ANGLE: f64 = PI / 6.0;
    /// Default orientation merge allowance.
    pub const DEFAULT_THETA_MERGE_K: f64 = 100.0;
    /// Default magnitude merge allowance.
    pub const DEFAULT_MAGNITUDE_MERGE_K: f64 = 1200.0;
    /// Default minimum cluster size.
    pub const DEFAULT_MIN_CLUSTER_PIXELS: usize = 4;
    /// Default eigenvalue ratio limit.
    pub const DEFAULT_MAX_FIT_ANISOTROPY: f64 = 0.2;
    /// Default minimum segment length.
    pub const DEFAULT_MIN_SEGMENT_LENGTH: f64 = 4.0;
    /// Default relative corner gap.
    pub const DEFAULT_CHAIN_LENGTH_RATIO: f64 = 0.5;
    /// Default constant corner gap.
    pub const DEFAULT_CHAIN_MIN_GAP: f64 = 2.0;
    /// Default minimum turn angle.
    pub const DEFAULT_MIN_TURN_ANGLE: f64 = 0.2;
    /// Default minimum quad area.
    pub const DEFAULT_MIN_QUAD_AREA: f64 = 64.0;
    /// Default minimum quad compactness.
    pub const DEFAULT_MIN_QUAD_COMPACTNESS: f64 = 0.25;
    /// Default minimum decode contrast.
    pub const DEFAULT_MIN_DECODE_CONTRAST: f64 = 0.1;
    /// Default border error allowance.
    pub const DEFAULT_MAX_BORDER_ERROR_FRACTION: f64 = 0.25;
    /// Default overlap threshold.
    pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;

    /// Check every tunable against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::InvalidConfig`] naming the first field
    /// that is out of range.
    pub fn validate(&self) -> Result<(), DetectorError> {
        if !(1..=Self::MAX_BLACK_BORDER).contains(&self.black_border) {
            return Err(invalid("black_border must be in 1..=8"));
        }
        check_sigma("decode_sigma", self.decode_sigma)?;
        check_sigma("segment_sigma", self.segment_sigma)?;
        check_non_negative("min_magnitude", self.min_magnitude)?;
        if !(self.max_edge_angle > 0.0 && self.max_edge_angle <= PI / 2.0) {
            return Err(invalid("max_edge_angle must be in (0, PI/2]"));
        }
        check_non_negative("theta_merge_k", self.theta_merge_k)?;
        check_non_negative("magnitude_merge_k", self.magnitude_merge_k)?;
        if self.min_cluster_pixels < 2 {
            return Err(invalid("min_cluster_pixels must be at least 2"));
        }
        if !(self.max_fit_anisotropy > 0.0 && self.max_fit_anisotropy <= 1.0) {
            return Err(invalid("max_fit_anisotropy must be in (0, 1]"));
        }
        check_non_negative("min_segment_length", self.min_segment_length)?;
        check_non_negative("chain_length_ratio", self.chain_length_ratio)?;
        check_non_negative("chain_min_gap", self.chain_min_gap)?;
        if !(self.min_turn_angle >= 0.0 && self.min_turn_angle < PI / 2.0) {
            return Err(invalid("min_turn_angle must be in [0, PI/2)"));
        }
        check_non_negative("min_quad_area", self.min_quad_area)?;
        if !(0.0..=1.0).contains(&self.min_quad_compactness) {
            return Err(invalid("min_quad_compactness must be in [0, 1]"));
        }
        check_non_negative("min_decode_contrast", self.min_decode_contrast)?;
        if !(0.0..=1.0).contains(&self.max_border_error_fraction) {
            return Err(invalid("max_border_error_fraction must be in [0, 1]"));
        }
        if !(self.overlap_threshold > 0.0 && self.overlap_threshold <= 1.0) {
            return Err(invalid("overlap_threshold must be in (0, 1]"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> DetectorError {
    DetectorError::InvalidConfig(message.to_string())
}

fn check_sigma(name: &str, sigma: f32) -> Result<(), DetectorError> {
    if sigma.is_finite() && sigma >= 0.0 {
        Ok(())
    } else {
        Err(DetectorError::InvalidConfig(format!(
            "{name} must be finite and non-negative, got {sigma}"
        )))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), DetectorError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DetectorError::InvalidConfig(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            black_border: Self::DEFAULT_BLACK_BORDER,
            decode_sigma: Self::DEFAULT_DECODE_SIGMA,
            segment_sigma: Self::DEFAULT_SEGMENT_SIGMA,
            min_magnitude: Self::DEFAULT_MIN_MAGNITUDE,
            max_edge_angle: Self::DEFAULT_MAX_EDGE_ANGLE,
            theta_merge_k: Self::DEFAULT_THETA_MERGE_K,
            magnitude_merge_k: Self::DEFAULT_MAGNITUDE_MERGE_K,
            min_cluster_pixels: Self::DEFAULT_MIN_CLUSTER_PIXELS,
            max_fit_anisotropy: Self::DEFAULT_MAX_FIT_ANISOTROPY,
            min_segment_length: Self::DEFAULT_MIN_SEGMENT_LENGTH,
            chain_length_ratio: Self::DEFAULT_CHAIN_LENGTH_RATIO,
            chain_min_gap: Self::DEFAULT_CHAIN_MIN_GAP,
            min_turn_angle: Self::DEFAULT_MIN_TURN_ANGLE,
            min_quad_area: Self::DEFAULT_MIN_QUAD_AREA,
            min_quad_compactness: Self::DEFAULT_MIN_QUAD_COMPACTNESS,
            min_decode_contrast: Self::DEFAULT_MIN_DECODE_CONTRAST,
            max_border_error_fraction: Self::DEFAULT_MAX_BORDER_ERROR_FRACTION,
            max_hamming: None,
            overlap_threshold: Self::DEFAULT_OVERLAP_THRESHOLD,
        }
    }
}

/// A decoded tag.
///
/// Created by the decoder and never mutated afterwards; re-ordering the
/// corners for a rotation produces a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDetection {
    /// Index of the matched code in the codebook.
    pub id: usize,
    /// Number of bits that differ from the matched code.
    pub hamming: u32,
    /// Quarter turns (clockwise) applied to the observed bits to match.
    pub rotation: u8,
    /// Image-space corners, starting at the tag's canonical top-left and
    /// proceeding clockwise.
    pub corners: [Point; 4],
    /// Image of the tag center under the homography.
    pub center: Point,
    /// Maps the unit square `(0,0),(1,0),(1,1),(0,1)` onto `corners`.
    pub homography: Homography,
    /// Enclosed area in square pixels.
    pub area: f64,
    /// Ranking score; larger is better.
    pub goodness: f64,
}

/// Errors that can occur before detection starts.
///
/// Everything that goes wrong *during* detection is a silent prune; the
/// caller only ever sees fewer detections.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The image has no interior pixels to compute gradients on.
    #[error("image is too small for detection: {width}x{height}")]
    ImageTooSmall {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// Detector configuration is invalid.
    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),

    /// The tag codebook is malformed.
    #[error("invalid tag codebook: {0}")]
    InvalidCodebook(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Point tests ---

    #[test]
    fn point_distance_squared() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_finite_check() {
        assert!(Point::new(1.0, 2.0).is_finite());
        assert!(!Point::new(f64::NAN, 2.0).is_finite());
        assert!(!Point::new(1.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn dimensions_pixel_count() {
        let d = Dimensions {
            width: 640,
            height: 480,
        };
        assert_eq!(d.pixel_count(), 307_200);
    }

    // --- DetectorConfig tests ---

    #[test]
    fn config_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.black_border, 1);
        assert!((config.decode_sigma - 0.8).abs() < f32::EPSILON);
        assert!((config.segment_sigma - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.max_hamming, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_black_border_rejected() {
        let config = DetectorConfig {
            black_border: 0,
            ..DetectorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DetectorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn oversized_black_border_rejected() {
        for black_border in [DetectorConfig::MAX_BLACK_BORDER + 1, 100_000, 3_000_000_000] {
            let config = DetectorConfig {
                black_border,
                ..DetectorConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(DetectorError::InvalidConfig(_))),
                "black_border {black_border}"
            );
        }
        let widest = DetectorConfig {
            black_border: DetectorConfig::MAX_BLACK_BORDER,
            ..DetectorConfig::default()
        };
        assert!(widest.validate().is_ok());
    }

    #[test]
    fn negative_sigma_rejected() {
        let config = DetectorConfig {
            segment_sigma: -1.0,
            ..DetectorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("segment_sigma"), "got {err}");
    }

    #[test]
    fn nan_threshold_rejected() {
        let config = DetectorConfig {
            min_quad_area: f64::NAN,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_threshold_range() {
        let zero = DetectorConfig {
            overlap_threshold: 0.0,
            ..DetectorConfig::default()
        };
        assert!(zero.validate().is_err());
        let one = DetectorConfig {
            overlap_threshold: 1.0,
            ..DetectorConfig::default()
        };
        assert!(one.validate().is_ok());
    }

    #[test]
    fn config_serde_round_trip() {
        let config = DetectorConfig {
            black_border: 2,
            decode_sigma: 0.0,
            max_hamming: Some(1),
            ..DetectorConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: DetectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn partial_config_json_fills_defaults() {
        let config: DetectorConfig = serde_json::from_str(r#"{"black_border": 2}"#).unwrap();
        assert_eq!(config.black_border, 2);
        assert!((config.min_quad_area - DetectorConfig::DEFAULT_MIN_QUAD_AREA).abs() < 1e-12);
    }

    // --- DetectorError tests ---

    #[test]
    fn error_display() {
        assert_eq!(
            DetectorError::EmptyInput.to_string(),
            "input image data is empty"
        );
        assert_eq!(
            DetectorError::ImageTooSmall {
                width: 2,
                height: 0
            }
            .to_string(),
            "image is too small for detection: 2x0",
        );
        assert_eq!(
            DetectorError::InvalidCodebook("no codes".to_string()).to_string(),
            "invalid tag codebook: no codes",
        );
    }
}
