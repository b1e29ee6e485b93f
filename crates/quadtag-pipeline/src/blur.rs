//! Gaussian smoothing: the intensity preprocessor.
//!
//! The detector keeps two smoothed copies of every frame. The segment
//! profile feeds the gradient field and benefits from smoothing; the
//! decode profile feeds bit sampling, where heavy smoothing blurs small
//! bits together. Each profile has its own sigma and therefore its own
//! [`GaussianKernel`], built once when the sigma is set.

use crate::types::IntensityImage;

/// Number of standard deviations covered on each side of the kernel
/// center. Three sigma keeps more than 99.7% of the kernel mass.
const KERNEL_RADIUS_SIGMAS: f32 = 3.0;

/// A normalized, odd-sized, one-dimensional Gaussian kernel.
///
/// Applied separably (rows, then columns). A sigma of zero (or below)
/// yields the identity kernel `[1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    sigma: f32,
    taps: Vec<f32>,
}

impl GaussianKernel {
    /// Build the kernel for `sigma`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn new(sigma: f32) -> Self {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Self {
                sigma: 0.0,
                taps: vec![1.0],
            };
        }

        let radius = filter_radius(sigma);
        let denom = 2.0 * sigma * sigma;
        let mut taps: Vec<f32> = (-(radius as i64)..=radius as i64)
            .map(|i| {
                let d = i as f32;
                (-(d * d) / denom).exp()
            })
            .collect();
        let sum: f32 = taps.iter().sum();
        for t in &mut taps {
            *t /= sum;
        }
        Self { sigma, taps }
    }

    /// The sigma this kernel was built for (zero for identity).
    #[must_use]
    pub const fn sigma(&self) -> f32 {
        self.sigma
    }

    /// Kernel size (always odd).
    #[must_use]
    pub fn size(&self) -> usize {
        self.taps.len()
    }

    /// Kernel weights, center tap in the middle.
    #[must_use]
    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    /// Returns `true` if applying this kernel leaves the image unchanged.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.taps.len() == 1
    }
}

/// Half-width of the kernel for `sigma`, at least one tap.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn filter_radius(sigma: f32) -> usize {
    ((KERNEL_RADIUS_SIGMAS * sigma).ceil() as usize).max(1)
}

/// Smooth an intensity image with a separable Gaussian.
///
/// Wraps [`imageproc::filter::separable_filter_equal`], which clamps to
/// the nearest edge pixel at the borders, so a uniform image stays
/// uniform.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &IntensityImage, kernel: &GaussianKernel) -> IntensityImage {
    if kernel.is_identity() || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    imageproc::filter::separable_filter_equal(image, kernel.taps())
}

/// The two smoothed copies of a frame produced by preprocessing.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Sampled by the quad decoder.
    pub decode: IntensityImage,
    /// Fed to the gradient field builder.
    pub segment: IntensityImage,
}

/// Produce the decode and segment profiles of `image`.
///
/// When both kernels are identical the blur runs once and is shared.
#[must_use]
pub fn preprocess(
    image: &IntensityImage,
    decode_kernel: &GaussianKernel,
    segment_kernel: &GaussianKernel,
) -> Preprocessed {
    let segment = gaussian_blur(image, segment_kernel);
    let decode = if decode_kernel == segment_kernel {
        segment.clone()
    } else {
        gaussian_blur(image, decode_kernel)
    };
    Preprocessed { decode, segment }
}
