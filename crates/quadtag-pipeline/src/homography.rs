//! Planar homography from the tag's unit square onto image corners.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Projective denominators smaller than this are treated as points at
/// infinity.
const MIN_DENOMINATOR: f64 = 1e-12;

/// Unit square corners in the order `(0,0), (1,0), (1,1), (0,1)`.
pub const UNIT_SQUARE: [Point; 4] = [
    Point::new(0.0, 0.0),
    Point::new(1.0, 0.0),
    Point::new(1.0, 1.0),
    Point::new(0.0, 1.0),
];

/// 3x3 projective map, normalized so `h[2][2] == 1`.
///
/// Serializes as a row-major `[[f64; 3]; 3]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Homography {
    h: Matrix3<f64>,
}

impl Homography {
    /// Wrap a raw matrix.
    #[must_use]
    pub const fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    /// The identity map.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    /// Build from row-major entries.
    #[must_use]
    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_fn(|r, c| rows[r][c]))
    }

    /// Row-major entries.
    #[must_use]
    pub fn to_array(&self) -> [[f64; 3]; 3] {
        std::array::from_fn(|r| std::array::from_fn(|c| self.h[(r, c)]))
    }

    /// The underlying matrix.
    #[must_use]
    pub const fn matrix(&self) -> &Matrix3<f64> {
        &self.h
    }

    /// Solve for the map taking [`UNIT_SQUARE`] onto `corners`.
    ///
    /// The image points are centered and scaled before the 8x8 solve.
    /// Returns `None` for degenerate corner sets (three collinear points,
    /// repeated corners, non-finite input).
    #[must_use]
    pub fn from_unit_square(corners: &[Point; 4]) -> Option<Self> {
        if !corners.iter().all(|c| c.is_finite()) {
            return None;
        }
        let cx = corners.iter().map(|c| c.x).sum::<f64>() / 4.0;
        let cy = corners.iter().map(|c| c.y).sum::<f64>() / 4.0;
        let mean_dist = corners
            .iter()
            .map(|c| Point::new(cx, cy).distance(*c))
            .sum::<f64>()
            / 4.0;
        if mean_dist <= MIN_DENOMINATOR {
            return None;
        }
        let min_turn_area = 1e-9 * mean_dist * mean_dist;
        for k in 0..4 {
            let (a, b, c) = (corners[k], corners[(k + 1) % 4], corners[(k + 2) % 4]);
            let cross = (b.x - a.x).mul_add(c.y - b.y, -((b.y - a.y) * (c.x - b.x)));
            if cross.abs() <= min_turn_area {
                return None;
            }
        }
        let s = std::f64::consts::SQRT_2 / mean_dist;

        // Unknowns h11 h12 h13 h21 h22 h23 h31 h32 with h33 = 1:
        //   h11 x + h12 y + h13 - u h31 x - u h32 y = u
        //   h21 x + h22 y + h23 - v h31 x - v h32 y = v
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for (k, (src, dst)) in UNIT_SQUARE.iter().zip(corners).enumerate() {
            let (x, y) = (src.x, src.y);
            let u = s * (dst.x - cx);
            let v = s * (dst.y - cy);

            let r0 = 2 * k;
            a[(r0, 0)] = x;
            a[(r0, 1)] = y;
            a[(r0, 2)] = 1.0;
            a[(r0, 6)] = -u * x;
            a[(r0, 7)] = -u * y;
            b[r0] = u;

            let r1 = r0 + 1;
            a[(r1, 3)] = x;
            a[(r1, 4)] = y;
            a[(r1, 5)] = 1.0;
            a[(r1, 6)] = -v * x;
            a[(r1, 7)] = -v * y;
            b[r1] = v;
        }

        let x = a.lu().solve(&b)?;
        let normalized = Matrix3::new(
            x[0], x[1], x[2], //
            x[3], x[4], x[5], //
            x[6], x[7], 1.0,
        );
        let denormalize = Matrix3::new(
            1.0 / s, 0.0, cx, //
            0.0, 1.0 / s, cy, //
            0.0, 0.0, 1.0,
        );
        let h = denormalize * normalized;
        let scale = h[(2, 2)];
        if scale.abs() < MIN_DENOMINATOR || !h.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some(Self::new(h / scale))
    }

    /// Map tag-plane `(u, v)` to image coordinates.
    ///
    /// Returns `None` when the point lands at (or behind) infinity.
    #[must_use]
    pub fn project(&self, u: f64, v: f64) -> Option<Point> {
        let p = self.h * Vector3::new(u, v, 1.0);
        if p[2].abs() < MIN_DENOMINATOR {
            return None;
        }
        let out = Point::new(p[0] / p[2], p[1] / p[2]);
        out.is_finite().then_some(out)
    }

    /// The inverse map, if the matrix is invertible.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

impl From<[[f64; 3]; 3]> for Homography {
    fn from(rows: [[f64; 3]; 3]) -> Self {
        Self::from_array(rows)
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        h.to_array()
    }
}
