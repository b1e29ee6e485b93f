//! Weighted principal-axis line fitting.
//!
//! Each cluster's weighted covariance has a dominant eigenvector along
//! the edge; the other eigenvalue measures how far points stray from the
//! line. Near-isotropic clusters have no usable direction and are
//! dropped. Surviving lines are oriented by gradient polarity so the
//! dark side is always on the segment's right (image y-down), which
//! makes a dark quad on a light background a clockwise loop.

use std::f64::consts::PI;

use crate::cluster::{Clusters, WeightedPoint};
use crate::gradient::GradientField;
use crate::types::{DetectorConfig, Point};

/// Eigenvalues at or below this are treated as zero spread.
const MIN_EIGENVALUE: f64 = 1e-12;

/// Lines closer to parallel than this (sine of the angle) have no usable
/// intersection.
const MIN_INTERSECTION_SINE: f64 = 1e-9;

/// Result of fitting an unoriented line to weighted points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    /// Weighted centroid.
    pub centroid: Point,
    /// Axis angle in `(-PI/2, PI/2]`.
    pub theta: f64,
    /// Variance along the axis (larger eigenvalue).
    pub major: f64,
    /// Variance across the axis (smaller eigenvalue); zero for collinear
    /// points.
    pub residual: f64,
    /// Smallest projection of a point onto the axis, relative to the
    /// centroid.
    pub t_min: f64,
    /// Largest projection of a point onto the axis.
    pub t_max: f64,
}

impl LineFit {
    /// Unit vector along the axis.
    #[must_use]
    pub fn direction(&self) -> (f64, f64) {
        (self.theta.cos(), self.theta.sin())
    }

    /// Ratio of minor to major eigenvalue, in `[0, 1]`.
    #[must_use]
    pub fn anisotropy(&self) -> f64 {
        self.residual / self.major
    }
}

/// Fit a line to `(point, weight)` pairs.
///
/// Returns `None` for empty input, non-positive total weight, or a
/// cluster with no spread at all.
#[must_use]
pub fn fit_line(points: &[(Point, f64)]) -> Option<LineFit> {
    let total: f64 = points.iter().map(|&(_, w)| w).sum();
    if points.is_empty() || total <= 0.0 || !total.is_finite() {
        return None;
    }

    let cx = points.iter().map(|&(p, w)| p.x * w).sum::<f64>() / total;
    let cy = points.iter().map(|&(p, w)| p.y * w).sum::<f64>() / total;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(p, w) in points {
        let dx = p.x - cx;
        let dy = p.y - cy;
        sxx += w * dx * dx;
        syy += w * dy * dy;
        sxy += w * dx * dy;
    }
    sxx /= total;
    syy /= total;
    sxy /= total;

    let half_trace = f64::midpoint(sxx, syy);
    let det = sxx.mul_add(syy, -(sxy * sxy));
    let disc = half_trace.mul_add(half_trace, -det).max(0.0).sqrt();
    let major = half_trace + disc;
    let residual = (half_trace - disc).max(0.0);
    if major <= MIN_EIGENVALUE {
        return None;
    }

    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let (ux, uy) = (theta.cos(), theta.sin());
    let mut t_min = f64::INFINITY;
    let mut t_max = f64::NEG_INFINITY;
    for &(p, _) in points {
        let t = (p.x - cx).mul_add(ux, (p.y - cy) * uy);
        t_min = t_min.min(t);
        t_max = t_max.max(t);
    }

    Some(LineFit {
        centroid: Point::new(cx, cy),
        theta,
        major,
        residual,
        t_min,
        t_max,
    })
}

/// An oriented line segment fitted to one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// First endpoint along the direction of travel.
    pub start: Point,
    /// Last endpoint along the direction of travel.
    pub end: Point,
    /// Direction of travel in `(-PI, PI]`; the dark side is on the right.
    pub theta: f64,
    /// Distance from `start` to `end`.
    pub length: f64,
    /// Across-line variance of the fit.
    pub residual: f64,
}

impl Segment {
    /// Unit direction of travel.
    #[must_use]
    pub fn direction(&self) -> (f64, f64) {
        (self.theta.cos(), self.theta.sin())
    }

    /// Intersection of the infinite lines through `self` and `other`.
    ///
    /// Returns `None` when the lines are (nearly) parallel.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Point> {
        let (dx, dy) = self.direction();
        let (ex, ey) = other.direction();
        let den = dx.mul_add(ey, -(dy * ex));
        if den.abs() < MIN_INTERSECTION_SINE {
            return None;
        }
        let qx = other.start.x - self.start.x;
        let qy = other.start.y - self.start.y;
        let u = qx.mul_add(ey, -(qy * ex)) / den;
        let p = Point::new(u.mul_add(dx, self.start.x), u.mul_add(dy, self.start.y));
        p.is_finite().then_some(p)
    }

    /// Signed turn from `self`'s direction to `other`'s, in `(-PI, PI]`.
    /// Positive turns are clockwise on screen.
    #[must_use]
    pub fn turn_to(&self, other: &Self) -> f64 {
        let (dx, dy) = self.direction();
        let (ex, ey) = other.direction();
        dx.mul_add(ey, -(dy * ex)).atan2(dx.mul_add(ex, dy * ey))
    }
}

/// Thresholds used by [`fit_segment`] and [`fit_segments`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFitParams {
    /// Maximum minor/major eigenvalue ratio.
    pub max_anisotropy: f64,
    /// Shortest accepted segment.
    pub min_length: f64,
}

impl From<&DetectorConfig> for LineFitParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            max_anisotropy: config.max_fit_anisotropy,
            min_length: config.min_segment_length,
        }
    }
}

/// Fit and orient one segment; `None` if the cluster is degenerate.
#[must_use]
pub fn fit_segment(
    points: &[WeightedPoint],
    field: &GradientField,
    params: &LineFitParams,
) -> Option<Segment> {
    let weighted: Vec<(Point, f64)> = points
        .iter()
        .map(|p| (Point::new(f64::from(p.x), f64::from(p.y)), p.weight))
        .collect();
    let fit = fit_line(&weighted)?;
    if fit.anisotropy() > params.max_anisotropy {
        log::trace!(
            "dropping isotropic cluster at ({:.1}, {:.1}): ratio {:.3}",
            fit.centroid.x,
            fit.centroid.y,
            fit.anisotropy(),
        );
        return None;
    }
    let length = fit.t_max - fit.t_min;
    if length < params.min_length {
        return None;
    }

    // The dark side goes on the right: the direction of travel is the
    // summed gradient turned a quarter clockwise on screen.
    let (gx, gy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| {
        let (dx, dy) = field.gradient(field.index(p.x, p.y));
        (sx + dx, sy + dy)
    });
    let (ux, uy) = fit.direction();
    let (theta, t_start, t_end) = if ux.mul_add(-gy, uy * gx) < 0.0 {
        (flip(fit.theta), -fit.t_max, -fit.t_min)
    } else {
        (fit.theta, fit.t_min, fit.t_max)
    };
    let (dx, dy) = (theta.cos(), theta.sin());
    let c = fit.centroid;
    Some(Segment {
        start: Point::new(t_start.mul_add(dx, c.x), t_start.mul_add(dy, c.y)),
        end: Point::new(t_end.mul_add(dx, c.x), t_end.mul_add(dy, c.y)),
        theta,
        length,
        residual: fit.residual,
    })
}

/// Reverse an axis angle, keeping the result in `(-PI, PI]`.
fn flip(theta: f64) -> f64 {
    if theta > 0.0 { theta - PI } else { theta + PI }
}

/// Fit one segment per cluster, in cluster order.
#[must_use]
pub fn fit_segments(
    clusters: &Clusters,
    field: &GradientField,
    params: &LineFitParams,
) -> Vec<Segment> {
    clusters
        .values()
        .filter_map(|points| fit_segment(points, field, params))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::IntensityImage;

    fn points_on_line(theta: f64, count: usize) -> Vec<(Point, f64)> {
        (0..count)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f64 * 0.7 - 5.0;
                (Point::new(t.mul_add(theta.cos(), 10.0), t.mul_add(theta.sin(), -3.0)), 1.0)
            })
            .collect()
    }

    fn axis_distance(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(PI);
        d.min(PI - d)
    }

    #[test]
    fn collinear_points_recover_angle() {
        for theta in [0.0, 0.3, PI / 4.0, 1.2, PI / 2.0, -0.9, 2.5] {
            let fit = fit_line(&points_on_line(theta, 15)).unwrap();
            assert!(axis_distance(fit.theta, theta) < 1e-9, "theta {theta}: got {}", fit.theta);
            assert!(fit.residual < 1e-9, "residual {}", fit.residual);
            assert!(((fit.t_max - fit.t_min) - 14.0 * 0.7).abs() < 1e-9);
        }
    }

    #[test]
    fn isotropic_points_have_unit_anisotropy() {
        let pts: Vec<(Point, f64)> = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
            .iter()
            .map(|&(x, y)| (Point::new(x, y), 1.0))
            .collect();
        let fit = fit_line(&pts).unwrap();
        assert!((fit.anisotropy() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_inputs_rejected() {
        assert!(fit_line(&[]).is_none());
        let same = vec![(Point::new(2.0, 2.0), 1.0); 5];
        assert!(fit_line(&same).is_none());
        let weightless = vec![(Point::new(0.0, 0.0), 0.0), (Point::new(1.0, 0.0), 0.0)];
        assert!(fit_line(&weightless).is_none());
    }

    #[test]
    fn weights_pull_the_centroid() {
        let pts = vec![(Point::new(0.0, 0.0), 3.0), (Point::new(4.0, 0.0), 1.0)];
        let fit = fit_line(&pts).unwrap();
        assert!((fit.centroid.x - 1.0).abs() < 1e-12);
    }

    /// Cluster of the edge pixels of a vertical step at x = 9.5.
    fn step_cluster(dark_left: bool) -> (Vec<WeightedPoint>, GradientField) {
        let img = IntensityImage::from_fn(20, 20, |x, _| {
            let dark = (x < 10) == dark_left;
            image::Luma([if dark { 0.0 } else { 1.0 }])
        });
        let field = GradientField::compute(&img);
        let points = (2..18)
            .flat_map(|y| [9, 10].map(|x| WeightedPoint { x, y, weight: 1.0 }))
            .collect();
        (points, field)
    }

    #[test]
    fn segment_keeps_dark_side_on_the_right() {
        let params = LineFitParams::from(&DetectorConfig::default());

        // Dark on the left: on screen (y down) the right-hand side of
        // downward travel is the left half.
        let (points, field) = step_cluster(true);
        let seg = fit_segment(&points, &field, &params).unwrap();
        assert!((seg.theta - PI / 2.0).abs() < 1e-9, "theta {}", seg.theta);
        assert!(seg.start.y < seg.end.y);
        assert!((seg.start.x - 9.5).abs() < 1e-9);
        assert!((seg.length - 15.0).abs() < 1e-9);

        let (points, field) = step_cluster(false);
        let seg = fit_segment(&points, &field, &params).unwrap();
        assert!((seg.theta + PI / 2.0).abs() < 1e-9, "theta {}", seg.theta);
        assert!(seg.start.y > seg.end.y);
    }

    #[test]
    fn short_segments_dropped() {
        let (points, field) = step_cluster(true);
        let params = LineFitParams {
            max_anisotropy: 0.2,
            min_length: 50.0,
        };
        assert!(fit_segment(&points, &field, &params).is_none());
    }

    #[test]
    fn perpendicular_segments_intersect() {
        let a = Segment {
            start: Point::new(0.0, 1.0),
            end: Point::new(10.0, 1.0),
            theta: 0.0,
            length: 10.0,
            residual: 0.0,
        };
        let b = Segment {
            start: Point::new(12.0, 3.0),
            end: Point::new(12.0, 13.0),
            theta: PI / 2.0,
            length: 10.0,
            residual: 0.0,
        };
        let p = a.intersect(&b).unwrap();
        assert!((p.x - 12.0).abs() < 1e-12 && (p.y - 1.0).abs() < 1e-12);
        assert!((a.turn_to(&b) - PI / 2.0).abs() < 1e-12);
        assert!((b.turn_to(&a) + PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn parallel_segments_do_not_intersect() {
        let a = Segment {
            start: Point::new(0.0, 0.0),
            end: Point::new(1.0, 0.0),
            theta: 0.0,
            length: 1.0,
            residual: 0.0,
        };
        let b = Segment {
            start: Point::new(0.0, 5.0),
            ..a
        };
        assert!(a.intersect(&b).is_none());
    }
}
