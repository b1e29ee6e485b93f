//! Quad search: closed four-segment loops in the successor graph.
//!
//! The search is an explicit-stack depth-first walk bounded at depth 4.
//! A loop is only reported from its smallest segment index, so each
//! 4-cycle produces one quad while different loops are free to share
//! segments. Visited tracking is the current path only.

use crate::chain::SuccessorGraph;
use crate::homography::Homography;
use crate::line_fit::Segment;
use crate::types::{DetectorConfig, Point};

/// Sides per quad.
const SIDES: usize = 4;

/// A convex, clockwise quadrilateral candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
    /// Corners in clockwise order (image y-down). Corner `k` is where
    /// side `k - 1` meets side `k`.
    pub corners: [Point; 4],
    /// Maps the unit square onto `corners`.
    pub homography: Homography,
    /// Signed shoelace area; positive for clockwise corners.
    pub area: f64,
    /// Sum of side lengths.
    pub perimeter: f64,
    /// Indices of the four segments, in walking order.
    pub segments: [usize; 4],
}

impl Quad {
    /// Build a quad from four walked segments.
    ///
    /// Returns `None` if any corner is missing (parallel neighbors), the
    /// loop is not strictly convex and clockwise, or the homography is
    /// degenerate.
    #[must_use]
    pub fn from_path(path: [usize; 4], segments: &[Segment]) -> Option<Self> {
        let mut corners = [Point::new(0.0, 0.0); SIDES];
        for (k, corner) in corners.iter_mut().enumerate() {
            let prev = &segments[path[(k + SIDES - 1) % SIDES]];
            *corner = prev.intersect(&segments[path[k]])?;
        }
        Self::from_corners(corners, path)
    }

    /// Build a quad from explicit corners.
    #[must_use]
    pub fn from_corners(corners: [Point; 4], segments: [usize; 4]) -> Option<Self> {
        if !is_convex_clockwise(&corners) {
            return None;
        }
        let homography = Homography::from_unit_square(&corners)?;
        Some(Self {
            corners,
            homography,
            area: shoelace_area(&corners),
            perimeter: perimeter(&corners),
            segments,
        })
    }

    /// `16 * area / perimeter^2`: 1 for a square, toward 0 for slivers.
    #[must_use]
    pub fn compactness(&self) -> f64 {
        if self.perimeter <= 0.0 {
            return 0.0;
        }
        16.0 * self.area / (self.perimeter * self.perimeter)
    }
}

/// Signed polygon area; positive for clockwise order in y-down images.
#[must_use]
pub fn shoelace_area(corners: &[Point; 4]) -> f64 {
    let twice: f64 = (0..SIDES)
        .map(|k| {
            let a = corners[k];
            let b = corners[(k + 1) % SIDES];
            a.x.mul_add(b.y, -(b.x * a.y))
        })
        .sum();
    0.5 * twice
}

fn perimeter(corners: &[Point; 4]) -> f64 {
    (0..SIDES)
        .map(|k| corners[k].distance(corners[(k + 1) % SIDES]))
        .sum()
}

/// Every consecutive edge pair turns strictly clockwise.
fn is_convex_clockwise(corners: &[Point; 4]) -> bool {
    (0..SIDES).all(|k| {
        let a = corners[k];
        let b = corners[(k + 1) % SIDES];
        let c = corners[(k + 2) % SIDES];
        (b.x - a.x).mul_add(c.y - b.y, -((b.y - a.y) * (c.x - b.x))) > 0.0
    })
}

/// Thresholds used by [`search_quads`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadParams {
    /// Minimum enclosed area.
    pub min_area: f64,
    /// Minimum [`Quad::compactness`].
    pub min_compactness: f64,
}

impl From<&DetectorConfig> for QuadParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            min_area: config.min_quad_area,
            min_compactness: config.min_quad_compactness,
        }
    }
}

/// Find every accepted quad, ordered by starting segment then path.
#[must_use]
pub fn search_quads(
    segments: &[Segment],
    graph: &SuccessorGraph,
    params: &QuadParams,
) -> Vec<Quad> {
    let mut quads = Vec::new();
    let mut rejected = 0_usize;
    let mut stack: Vec<([usize; SIDES], usize)> = Vec::new();

    for s0 in 0..segments.len() {
        stack.push(([s0, 0, 0, 0], 1));
        while let Some((path, depth)) = stack.pop() {
            if depth == SIDES {
                if !graph.links(path[SIDES - 1], s0) {
                    continue;
                }
                match Quad::from_path(path, segments) {
                    Some(q)
                        if q.area >= params.min_area
                            && q.compactness() >= params.min_compactness =>
                    {
                        quads.push(q);
                    }
                    _ => rejected += 1,
                }
                continue;
            }
            let last = path[depth - 1];
            // Reverse so the smallest successor is explored first.
            for next in graph.successors(last).into_iter().rev() {
                if next <= s0 || path[..depth].contains(&next) {
                    continue;
                }
                let mut extended = path;
                extended[depth] = next;
                stack.push((extended, depth + 1));
            }
        }
    }

    log::debug!(
        "quad search: {} quads accepted, {rejected} closed loops rejected",
        quads.len()
    );
    quads
}
