//! Per-pixel gradient magnitude and orientation.
//!
//! Orientation is folded into the half circle `[0, PI)`: an edge and its
//! reversed-polarity twin look the same to segmentation. The signed
//! components are kept too, because the line fitter needs polarity to
//! orient each segment with the dark side on a known hand.

use std::f64::consts::PI;

use crate::types::IntensityImage;

/// Gradient field of the segment-profile image.
///
/// Border pixels (no full neighborhood) have zero magnitude and are
/// never considered by later stages.
#[derive(Debug, Clone)]
pub struct GradientField {
    width: u32,
    height: u32,
    dx: Vec<f64>,
    dy: Vec<f64>,
    magnitude: Vec<f64>,
    orientation: Vec<f64>,
}

impl GradientField {
    /// Compute central differences on every interior pixel.
    #[must_use]
    pub fn compute(image: &IntensityImage) -> Self {
        let (width, height) = image.dimensions();
        let (w, h) = (width as usize, height as usize);
        let n = w * h;
        let mut field = Self {
            width,
            height,
            dx: vec![0.0; n],
            dy: vec![0.0; n],
            magnitude: vec![0.0; n],
            orientation: vec![0.0; n],
        };
        if w < 3 || h < 3 {
            return field;
        }

        let px = image.as_raw();
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let i = y * w + x;
                let gx = f64::from(px[i + 1]) - f64::from(px[i - 1]);
                let gy = f64::from(px[i + w]) - f64::from(px[i - w]);
                field.dx[i] = gx;
                field.dy[i] = gy;
                field.magnitude[i] = gx.hypot(gy);
                field.orientation[i] = wrap_half_circle(gy.atan2(gx));
            }
        }
        field
    }

    /// Field width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Field height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.magnitude.len()
    }

    /// Returns `true` for a zero-sized field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.magnitude.is_empty()
    }

    /// Row-major pixel index of `(x, y)`.
    #[must_use]
    pub const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Returns `true` if `index` has a full 3x3 neighborhood.
    #[must_use]
    pub const fn is_interior(&self, index: usize) -> bool {
        let w = self.width as usize;
        let h = self.height as usize;
        let (x, y) = (index % w, index / w);
        x >= 1 && y >= 1 && x + 1 < w && y + 1 < h
    }

    /// Gradient magnitude at `index`.
    #[must_use]
    pub fn magnitude(&self, index: usize) -> f64 {
        self.magnitude[index]
    }

    /// Half-circle orientation at `index`, in `[0, PI)`.
    #[must_use]
    pub fn orientation(&self, index: usize) -> f64 {
        self.orientation[index]
    }

    /// Signed gradient `(dx, dy)` at `index`, pointing from dark to light.
    #[must_use]
    pub fn gradient(&self, index: usize) -> (f64, f64) {
        (self.dx[index], self.dy[index])
    }

    /// All magnitudes, row-major.
    #[must_use]
    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitude
    }
}

/// Fold an angle into `[0, PI)`.
#[must_use]
pub fn wrap_half_circle(angle: f64) -> f64 {
    let a = angle.rem_euclid(PI);
    // rem_euclid can round up to exactly PI for tiny negative inputs.
    if a >= PI { 0.0 } else { a }
}

/// Signed difference `a - b` folded into `[-PI/2, PI/2)`.
#[must_use]
pub fn half_circle_difference(a: f64, b: f64) -> f64 {
    wrap_half_circle(a - b + PI / 2.0) - PI / 2.0
}

/// Unsigned angular distance between two half-circle orientations, in
/// `[0, PI/2]`.
#[must_use]
pub fn half_circle_distance(a: f64, b: f64) -> f64 {
    half_circle_difference(a, b).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_edge() -> IntensityImage {
        IntensityImage::from_fn(8, 6, |x, _| image::Luma([if x < 4 { 0.0 } else { 1.0 }]))
    }

    #[test]
    fn wrap_folds_opposite_directions_together() {
        let a = wrap_half_circle(0.3);
        let b = wrap_half_circle(0.3 + PI);
        let c = wrap_half_circle(0.3 - PI);
        assert!((a - b).abs() < 1e-12);
        assert!((a - c).abs() < 1e-12);
        assert!(wrap_half_circle(-1e-18) < PI);
    }

    #[test]
    fn distance_wraps_around_half_circle() {
        assert!((half_circle_distance(0.05, PI - 0.05) - 0.1).abs() < 1e-12);
        assert!((half_circle_distance(0.0, PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!(half_circle_distance(1.0, 1.0).abs() < 1e-12);
    }

    #[test]
    fn signed_difference_range() {
        let d = half_circle_difference(0.1, PI - 0.1);
        assert!((d - 0.2).abs() < 1e-12, "got {d}");
        let d = half_circle_difference(PI - 0.1, 0.1);
        assert!((d + 0.2).abs() < 1e-12, "got {d}");
    }

    #[test]
    fn border_pixels_have_zero_magnitude() {
        let field = GradientField::compute(&vertical_edge());
        for y in 0..6 {
            assert!(field.magnitude(field.index(0, y)).abs() < f64::EPSILON);
            assert!(field.magnitude(field.index(7, y)).abs() < f64::EPSILON);
        }
        for x in 0..8 {
            assert!(field.magnitude(field.index(x, 0)).abs() < f64::EPSILON);
            assert!(field.magnitude(field.index(x, 5)).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn vertical_edge_has_horizontal_gradient() {
        let field = GradientField::compute(&vertical_edge());
        for x in [3, 4] {
            let i = field.index(x, 2);
            assert!((field.magnitude(i) - 1.0).abs() < 1e-9);
            assert!(field.orientation(i).abs() < 1e-9);
            let (gx, gy) = field.gradient(i);
            assert!(gx > 0.0 && gy.abs() < 1e-12, "dark-to-light points +x");
        }
        assert!(field.magnitude(field.index(1, 2)).abs() < 1e-12);
    }

    #[test]
    fn reversed_polarity_shares_orientation() {
        let flipped =
            IntensityImage::from_fn(8, 6, |x, _| image::Luma([if x < 4 { 1.0 } else { 0.0 }]));
        let a = GradientField::compute(&vertical_edge());
        let b = GradientField::compute(&flipped);
        let i = a.index(4, 3);
        assert!((a.orientation(i) - b.orientation(i)).abs() < 1e-12);
        assert!(a.gradient(i).0 > 0.0 && b.gradient(i).0 < 0.0);
    }

    #[test]
    fn tiny_image_has_no_gradient() {
        let img = IntensityImage::from_pixel(2, 2, image::Luma([0.5]));
        let field = GradientField::compute(&img);
        assert_eq!(field.len(), 4);
        assert!(field.magnitudes().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn interior_check() {
        let field = GradientField::compute(&vertical_edge());
        assert!(!field.is_interior(field.index(0, 3)));
        assert!(field.is_interior(field.index(1, 1)));
        assert!(!field.is_interior(field.index(6, 5)));
    }
}
