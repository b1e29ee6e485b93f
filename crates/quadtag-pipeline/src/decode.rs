//! Quad decoder: resample the tag grid and match it against the codebook.
//!
//! The tag plane is the unit square, divided into an `N x N` grid where
//! `N = grid_size + 2 * black_border`. Each cell is read as the average
//! of a 3x3 patch of bilinear samples. Two reference populations are
//! gathered per quad: the black border ring and a light ring one cell
//! outside the quad. A bilinear [`GrayModel`] per population gives a
//! threshold for every cell.

use std::fmt;

use crate::codebook::TagCodebook;
use crate::gray_model::{GrayModel, GraySurface};
use crate::homography::Homography;
use crate::quad::Quad;
use crate::types::{DetectorConfig, IntensityImage, Point, TagDetection};

/// Offsets of the 3x3 sub-samples, in cells.
const SUBSAMPLE_OFFSETS: [f64; 3] = [-0.25, 0.0, 0.25];

/// Why a quad produced no detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeRejection {
    /// A sample projected outside the image or to infinity.
    OutOfBounds,
    /// Light ring not sufficiently brighter than the black border.
    LowContrast,
    /// Too many border cells read as light.
    BorderErrors,
    /// No code within the allowed Hamming distance.
    NoMatch,
    /// Re-ordered corners gave a degenerate homography, or the sampling
    /// grid is too large to address.
    Degenerate,
}

impl fmt::Display for DecodeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OutOfBounds => "out of bounds",
            Self::LowContrast => "low contrast",
            Self::BorderErrors => "border errors",
            Self::NoMatch => "no code match",
            Self::Degenerate => "degenerate geometry",
        };
        f.write_str(s)
    }
}

/// Thresholds used by [`decode_quad`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    /// Black border width in cells.
    pub black_border: u32,
    /// Largest accepted number of bit errors.
    pub max_hamming: u32,
    /// Minimum light-minus-dark mean.
    pub min_contrast: f64,
    /// Fraction of border cells allowed to read light.
    pub max_border_error_fraction: f64,
}

impl DecodeParams {
    /// Resolve the config against a codebook; `max_hamming: None` means
    /// the codebook's correction capacity.
    #[must_use]
    pub fn new(config: &DetectorConfig, codebook: &TagCodebook) -> Self {
        Self {
            black_border: config.black_border,
            max_hamming: config
                .max_hamming
                .unwrap_or_else(|| codebook.correctable_bits()),
            min_contrast: config.min_decode_contrast,
            max_border_error_fraction: config.max_border_error_fraction,
        }
    }
}

/// Bilinear intensity at a sub-pixel position (pixel centers at integer
/// coordinates). `None` outside `[0, w-1] x [0, h-1]`.
#[must_use]
pub fn sample_bilinear(image: &IntensityImage, p: Point) -> Option<f64> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || !p.is_finite() {
        return None;
    }
    let (max_x, max_y) = (f64::from(w - 1), f64::from(h - 1));
    if p.x < 0.0 || p.y < 0.0 || p.x > max_x || p.y > max_y {
        return None;
    }
    let (fx0, fy0) = (p.x.floor(), p.y.floor());
    let (tx, ty) = (p.x - fx0, p.y - fy0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (x0, y0) = (fx0 as u32, fy0 as u32);
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let px = |x: u32, y: u32| f64::from(image.get_pixel(x, y).0[0]);
    let top = tx.mul_add(px(x1, y0) - px(x0, y0), px(x0, y0));
    let bottom = tx.mul_add(px(x1, y1) - px(x0, y1), px(x0, y1));
    Some(ty.mul_add(bottom - top, top))
}

/// Reads grid cells of one quad.
struct CellSampler<'a> {
    image: &'a IntensityImage,
    homography: &'a Homography,
    cells: f64,
}

impl CellSampler<'_> {
    /// Mean intensity of cell `(row, col)`; rows and columns may be `-1`
    /// or `N` for the ring outside the quad.
    fn read(&self, row: i32, col: i32) -> Option<f64> {
        let mut sum = 0.0;
        for dv in SUBSAMPLE_OFFSETS {
            for du in SUBSAMPLE_OFFSETS {
                let u = (f64::from(col) + 0.5 + du) / self.cells;
                let v = (f64::from(row) + 0.5 + dv) / self.cells;
                let p = self.homography.project(u, v)?;
                sum += sample_bilinear(self.image, p)?;
            }
        }
        Some(sum / 9.0)
    }
}

/// Decode one quad into a detection.
///
/// # Errors
///
/// Returns the [`DecodeRejection`] explaining why the quad is not a tag.
/// Callers treat every rejection as a silent prune.
#[allow(clippy::cast_sign_loss)]
pub fn decode_quad(
    quad: &Quad,
    image: &IntensityImage,
    codebook: &TagCodebook,
    params: &DecodeParams,
) -> Result<TagDetection, DecodeRejection> {
    let border = i32::try_from(params.black_border).map_err(|_| DecodeRejection::Degenerate)?;
    let cells = i32::try_from(codebook.grid_size())
        .ok()
        .and_then(|n| border.checked_mul(2)?.checked_add(n))
        .filter(|&c| c.checked_mul(c).is_some())
        .ok_or(DecodeRejection::Degenerate)?;
    let sampler = CellSampler {
        image,
        homography: &quad.homography,
        cells: f64::from(cells),
    };

    let mut grid = vec![0.0; (cells * cells) as usize];
    let mut light = GrayModel::new();
    let mut dark = GrayModel::new();
    for row in -1..=cells {
        for col in -1..=cells {
            let (x, y) = (f64::from(col), f64::from(row));
            let outside = row < 0 || col < 0 || row >= cells || col >= cells;
            if outside {
                // The light ring may leave the frame; it only feeds the model.
                if let Some(value) = sampler.read(row, col) {
                    light.add(x, y, value);
                }
                continue;
            }
            let value = sampler
                .read(row, col)
                .ok_or(DecodeRejection::OutOfBounds)?;
            grid[(row * cells + col) as usize] = value;
            if in_border(row, col, cells, border) {
                dark.add(x, y, value);
            }
        }
    }

    let (Some(light_mean), Some(dark_mean)) = (light.mean(), dark.mean()) else {
        return Err(DecodeRejection::LowContrast);
    };
    if light_mean - dark_mean < params.min_contrast {
        return Err(DecodeRejection::LowContrast);
    }
    let (Some(light_fit), Some(dark_fit)) = (light.fit(), dark.fit()) else {
        return Err(DecodeRejection::LowContrast);
    };
    let is_light = |row: i32, col: i32| {
        let threshold = threshold_at(&light_fit, &dark_fit, f64::from(col), f64::from(row));
        grid[(row * cells + col) as usize] > threshold
    };

    let mut border_cells = 0_u32;
    let mut border_errors = 0_u32;
    for row in 0..cells {
        for col in 0..cells {
            if in_border(row, col, cells, border) {
                border_cells += 1;
                if is_light(row, col) {
                    border_errors += 1;
                }
            }
        }
    }
    if f64::from(border_errors) > params.max_border_error_fraction * f64::from(border_cells) {
        return Err(DecodeRejection::BorderErrors);
    }

    let mut observed = 0_u64;
    for row in border..cells - border {
        for col in border..cells - border {
            observed = (observed << 1) | u64::from(is_light(row, col));
        }
    }

    let found = codebook
        .decode(observed, params.max_hamming)
        .ok_or(DecodeRejection::NoMatch)?;

    let shift = usize::from((4 - found.rotation % 4) % 4);
    let corners: [Point; 4] = std::array::from_fn(|k| quad.corners[(k + shift) % 4]);
    let homography = Homography::from_unit_square(&corners).ok_or(DecodeRejection::Degenerate)?;
    let center = homography
        .project(0.5, 0.5)
        .ok_or(DecodeRejection::Degenerate)?;

    Ok(TagDetection {
        id: found.id,
        hamming: found.hamming,
        rotation: found.rotation,
        corners,
        center,
        homography,
        area: quad.area,
        goodness: quad.area.sqrt() / (1.0 + f64::from(found.hamming)),
    })
}

fn in_border(row: i32, col: i32, cells: i32, border: i32) -> bool {
    row < border || col < border || row >= cells - border || col >= cells - border
}

fn threshold_at(light: &GraySurface, dark: &GraySurface, x: f64, y: f64) -> f64 {
    f64::midpoint(light.predict(x, y), dark.predict(x, y))
}
