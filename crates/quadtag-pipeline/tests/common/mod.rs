//! Synthetic tag rendering shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use quadtag_pipeline::{IntensityImage, Point, TagCodebook};

/// Twelve 4x4 codes, pairwise (and self-rotation) Hamming distance >= 5.
pub const CODES: [u64; 12] = [
    0x7, 0x39, 0xd2, 0x17e, 0x1e1, 0x2ae, 0x2dd, 0x5cf, 0x72d, 0x955, 0xab3, 0xc63,
];

/// Payload grid side.
pub const GRID: u32 = 4;

pub fn codebook() -> TagCodebook {
    TagCodebook::new("test16h5", GRID * GRID, 5, CODES.to_vec()).unwrap()
}

/// Intensity of tag-grid cell `(row, col)` for a 1-bit border: border
/// cells are black, payload cells are their bit (light = 1).
fn cell_value(code: u64, row: u32, col: u32) -> f32 {
    let side = GRID + 2;
    if row == 0 || col == 0 || row == side - 1 || col == side - 1 {
        return 0.0;
    }
    let idx = (row - 1) * GRID + (col - 1);
    if (code >> (GRID * GRID - 1 - idx)) & 1 == 1 { 1.0 } else { 0.0 }
}

/// A white canvas with axis-aligned tags drawn on it.
pub struct Scene {
    image: IntensityImage,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: IntensityImage::from_pixel(width, height, image::Luma([1.0])),
        }
    }

    /// Draw a tag whose top-left cell starts at pixel `(left, top)`.
    pub fn tag(mut self, code: u64, left: u32, top: u32, cell: u32) -> Self {
        let side = (GRID + 2) * cell;
        for y in top..top + side {
            for x in left..left + side {
                let value = cell_value(code, (y - top) / cell, (x - left) / cell);
                self.image.put_pixel(x, y, image::Luma([value]));
            }
        }
        self
    }

    pub fn build(self) -> IntensityImage {
        self.image
    }
}

/// 120x120 image with one tag of 10 px cells at offset 30. The dark
/// square spans pixels 30..=89, so its corners sit at 29.5 and 89.5.
pub fn single_tag(code: u64) -> IntensityImage {
    Scene::new(120, 120).tag(code, 30, 30, 10).build()
}

/// Expected corners of [`single_tag`], top-left first, clockwise.
pub fn single_tag_corners() -> [Point; 4] {
    [
        Point::new(29.5, 29.5),
        Point::new(89.5, 29.5),
        Point::new(89.5, 89.5),
        Point::new(29.5, 89.5),
    ]
}

/// Half the side of the tag drawn by [`rotated_tag`].
pub const ROTATED_HALF_SIDE: f64 = 36.0;

/// 160x160 image with a 72 px tag centered and rotated by `degrees`,
/// anti-aliased with 3x3 supersampling.
pub fn rotated_tag(code: u64, degrees: f64) -> IntensityImage {
    let size = 160;
    let center = f64::from(size - 1) / 2.0;
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cell = 2.0 * ROTATED_HALF_SIDE / f64::from(GRID + 2);
    let offsets = [-1.0 / 3.0, 0.0, 1.0 / 3.0];

    IntensityImage::from_fn(size, size, |x, y| {
        let mut sum = 0.0_f32;
        for dy in offsets {
            for dx in offsets {
                let px = f64::from(x) + dx - center;
                let py = f64::from(y) + dy - center;
                // Into the tag frame: rotate by -degrees.
                let u = cos.mul_add(px, sin * py) + ROTATED_HALF_SIDE;
                let v = (-sin).mul_add(px, cos * py) + ROTATED_HALF_SIDE;
                let inside = (0.0..2.0 * ROTATED_HALF_SIDE).contains(&u)
                    && (0.0..2.0 * ROTATED_HALF_SIDE).contains(&v);
                sum += if inside {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    cell_value(code, (v / cell) as u32, (u / cell) as u32)
                } else {
                    1.0
                };
            }
        }
        image::Luma([sum / 9.0])
    })
}

/// Image-space corners of [`rotated_tag`], canonical top-left first.
pub fn rotated_tag_corners(degrees: f64) -> [Point; 4] {
    let center = 159.0 / 2.0;
    let (sin, cos) = degrees.to_radians().sin_cos();
    let h = ROTATED_HALF_SIDE;
    [(-h, -h), (h, -h), (h, h), (-h, h)].map(|(u, v)| {
        Point::new(
            cos.mul_add(u, -(sin * v)) + center,
            sin.mul_add(u, cos * v) + center,
        )
    })
}

/// Assert every corner is within `tolerance` pixels of its expectation.
pub fn assert_corners_near(actual: &[Point; 4], expected: &[Point; 4], tolerance: f64) {
    for (k, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            a.distance(*e) < tolerance,
            "corner {k}: got ({:.3}, {:.3}), expected ({:.3}, {:.3})",
            a.x,
            a.y,
            e.x,
            e.y,
        );
    }
}
