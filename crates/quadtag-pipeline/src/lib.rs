//! quadtag-pipeline: Planar fiducial tag detection (sans-IO).
//!
//! Finds square fiducial tags in a grayscale image and reports each
//! tag's id, bit-error count, sub-pixel corners and homography through:
//! smoothing -> gradient -> union-find edge graph -> clusters ->
//! line fits -> successor graph -> quad search -> decode -> overlap
//! resolution.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! buffers and returns structured data. Every stage is deterministic, so
//! the same image always produces the same ordered detection list.
//!
//! ```no_run
//! use quadtag_pipeline::{Detector, TagCodebook};
//!
//! # fn run(json: &str, png: &[u8]) -> Result<(), quadtag_pipeline::DetectorError> {
//! let detector = Detector::new(TagCodebook::from_json(json)?);
//! for tag in detector.detect_bytes(png)? {
//!     println!("id {} at {:?}", tag.id, tag.corners);
//! }
//! # Ok(())
//! # }
//! ```

pub mod blur;
pub mod chain;
pub mod cluster;
pub mod codebook;
pub mod decode;
pub mod detector;
pub mod diagnostics;
pub mod edge;
pub mod gradient;
pub mod gray_model;
pub mod grayscale;
pub mod homography;
pub mod line_fit;
pub mod overlap;
pub mod quad;
pub mod types;
pub mod union_find;

pub use codebook::{CodeMatch, TagCodebook};
pub use detector::{Detector, StagedDetection};
pub use diagnostics::DetectionDiagnostics;
pub use grayscale::{decode_to_intensity, index_from_nonzero, to_intensity};
pub use homography::Homography;
pub use types::{
    DetectorConfig, DetectorError, Dimensions, GrayImage, IntensityImage, Point, TagDetection,
};
