//! Edge graph: link neighboring pixels into consistently oriented edges.
//!
//! Every interior pixel above the magnitude floor proposes a link to its
//! right and its down neighbor when their orientations agree within
//! `max_edge_angle`. Links are collected row-major, stably sorted by
//! orientation difference, and merged in that order. A merge is accepted
//! only if the merged component stays nearly as tight in orientation and
//! magnitude as the tighter of the two parts, plus an allowance that
//! shrinks as the component grows. Without that last rule a blurred
//! corner bridges two sides of a square into one component.

use crate::gradient::{GradientField, half_circle_difference, half_circle_distance};
use crate::types::DetectorConfig;
use crate::union_find::DisjointSets;

/// A candidate union between two neighboring pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeLink {
    /// First pixel (row-major index).
    pub a: usize,
    /// Right or down neighbor of `a`.
    pub b: usize,
    /// Orientation difference in radians.
    pub cost: f64,
}

/// Thresholds used by [`build_edge_graph`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeParams {
    /// Magnitude noise floor.
    pub min_magnitude: f64,
    /// Pairwise orientation tolerance.
    pub max_edge_angle: f64,
    /// Orientation spread allowance (divided by merged size).
    pub theta_merge_k: f64,
    /// Magnitude spread allowance (divided by merged size).
    pub magnitude_merge_k: f64,
}

impl From<&DetectorConfig> for EdgeParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            min_magnitude: config.min_magnitude,
            max_edge_angle: config.max_edge_angle,
            theta_merge_k: config.theta_merge_k,
            magnitude_merge_k: config.magnitude_merge_k,
        }
    }
}

/// Orientation and magnitude range of one component, valid at its root.
///
/// The orientation range is stored unwrapped: it may leave `[0, PI)`
/// when a merge shifts one side by a half turn to line up the means.
#[derive(Debug, Clone, Copy)]
struct ComponentStats {
    theta_min: f64,
    theta_max: f64,
    mag_min: f64,
    mag_max: f64,
}

impl ComponentStats {
    const fn pixel(theta: f64, magnitude: f64) -> Self {
        Self {
            theta_min: theta,
            theta_max: theta,
            mag_min: magnitude,
            mag_max: magnitude,
        }
    }

    fn theta_spread(&self) -> f64 {
        self.theta_max - self.theta_min
    }

    fn mag_spread(&self) -> f64 {
        self.mag_max - self.mag_min
    }

    /// Merged stats if the union passes both spread tests.
    #[allow(clippy::cast_precision_loss)]
    fn merge(&self, other: &Self, merged_size: usize, params: &EdgeParams) -> Option<Self> {
        let mean0 = f64::midpoint(self.theta_min, self.theta_max);
        let mean1 = f64::midpoint(other.theta_min, other.theta_max);
        let raw = mean1 - mean0;
        let shift = half_circle_difference(mean1, mean0) - raw;
        let (t1_min, t1_max) = (other.theta_min + shift, other.theta_max + shift);

        let size = merged_size as f64;
        let theta_min = self.theta_min.min(t1_min);
        let theta_max = self.theta_max.max(t1_max);
        if theta_max - theta_min
            > self.theta_spread().min(other.theta_spread()) + params.theta_merge_k / size
        {
            return None;
        }

        let mag_min = self.mag_min.min(other.mag_min);
        let mag_max = self.mag_max.max(other.mag_max);
        if mag_max - mag_min
            > self.mag_spread().min(other.mag_spread()) + params.magnitude_merge_k / size
        {
            return None;
        }

        Some(Self {
            theta_min,
            theta_max,
            mag_min,
            mag_max,
        })
    }
}

/// Collect candidate links in row-major order, sorted by cost.
///
/// The sort is stable, so equal-cost links keep their scan order.
#[must_use]
pub fn candidate_links(field: &GradientField, params: &EdgeParams) -> Vec<EdgeLink> {
    let (w, h) = (field.width() as usize, field.height() as usize);
    let mut links = Vec::new();
    if w < 3 || h < 3 {
        return links;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let a = y * w + x;
            if field.magnitude(a) < params.min_magnitude {
                continue;
            }
            let right = (x + 2 < w).then_some(a + 1);
            let down = (y + 2 < h).then_some(a + w);
            for b in [right, down].into_iter().flatten() {
                if field.magnitude(b) < params.min_magnitude {
                    continue;
                }
                let cost = half_circle_distance(field.orientation(a), field.orientation(b));
                if cost > params.max_edge_angle {
                    continue;
                }
                links.push(EdgeLink { a, b, cost });
            }
        }
    }

    links.sort_by(|l, r| l.cost.total_cmp(&r.cost));
    links
}

/// Build the union-find forest of edge components.
///
/// Deterministic: identical fields and parameters yield identical
/// forests.
#[must_use]
pub fn build_edge_graph(field: &GradientField, params: &EdgeParams) -> (DisjointSets, usize) {
    let links = candidate_links(field, params);
    let mut forest = DisjointSets::new(field.len());
    let mut stats: Vec<ComponentStats> = (0..field.len())
        .map(|i| ComponentStats::pixel(field.orientation(i), field.magnitude(i)))
        .collect();

    let mut merges = 0;
    for link in &links {
        let ra = forest.find(link.a);
        let rb = forest.find(link.b);
        if ra == rb {
            continue;
        }
        let merged_size = forest.set_size(ra) + forest.set_size(rb);
        let Some(merged) = stats[ra].merge(&stats[rb], merged_size, params) else {
            continue;
        };
        let root = forest.union_roots(ra, rb);
        stats[root] = merged;
        merges += 1;
    }

    log::debug!(
        "edge graph: {} candidate links, {merges} merges",
        links.len()
    );
    (forest, links.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntensityImage;

    fn params() -> EdgeParams {
        EdgeParams::from(&DetectorConfig::default())
    }

    /// Dark square (inclusive pixel range `lo..=hi`) on a light background.
    fn square_image(size: u32, lo: u32, hi: u32) -> IntensityImage {
        IntensityImage::from_fn(size, size, |x, y| {
            let inside = (lo..=hi).contains(&x) && (lo..=hi).contains(&y);
            image::Luma([if inside { 0.0 } else { 1.0 }])
        })
    }

    #[test]
    fn uniform_image_has_no_links() {
        let img = IntensityImage::from_pixel(12, 12, image::Luma([0.5]));
        let field = GradientField::compute(&img);
        assert!(candidate_links(&field, &params()).is_empty());
    }

    #[test]
    fn links_are_sorted_and_within_tolerance() {
        let img = crate::blur::gaussian_blur(
            &square_image(30, 8, 21),
            &crate::blur::GaussianKernel::new(0.8),
        );
        let field = GradientField::compute(&img);
        let p = params();
        let links = candidate_links(&field, &p);
        assert!(!links.is_empty());
        for pair in links.windows(2) {
            assert!(pair[0].cost <= pair[1].cost);
        }
        for link in &links {
            assert!(link.cost <= p.max_edge_angle);
            assert!(link.b == link.a + 1 || link.b == link.a + 30);
            assert!(field.is_interior(link.a) && field.is_interior(link.b));
        }
    }

    #[test]
    fn straight_edge_forms_one_component() {
        let img =
            IntensityImage::from_fn(20, 20, |x, _| image::Luma([if x < 10 { 0.0 } else { 1.0 }]));
        let field = GradientField::compute(&img);
        let (mut forest, _) = build_edge_graph(&field, &params());
        let root = forest.find(field.index(9, 3));
        for y in 1..19 {
            assert_eq!(forest.find(field.index(9, y)), root, "row {y}");
            assert_eq!(forest.find(field.index(10, y)), root, "row {y}");
        }
        // Pixels off the edge stay singletons.
        let off = field.index(4, 4);
        assert_eq!(forest.find(off), off);
    }

    #[test]
    fn square_sides_are_not_bridged_at_corners() {
        let img = crate::blur::gaussian_blur(
            &square_image(40, 10, 29),
            &crate::blur::GaussianKernel::new(0.8),
        );
        let field = GradientField::compute(&img);
        let (mut forest, _) = build_edge_graph(&field, &params());
        // Midpoints of the top and left sides, on the edge.
        let top = forest.find(field.index(20, 10));
        let left = forest.find(field.index(10, 20));
        assert_ne!(top, left, "top and left sides must stay separate");
        assert!(forest.set_size(top) >= 20);
        assert!(forest.set_size(left) >= 20);
    }

    #[test]
    fn weak_gradients_never_join() {
        let img = IntensityImage::from_fn(20, 20, |x, _| {
            image::Luma([if x < 10 { 0.50 } else { 0.52 }])
        });
        let field = GradientField::compute(&img);
        let (forest, links) = build_edge_graph(&field, &params());
        assert_eq!(links, 0);
        assert!((0..forest.len()).all(|i| !forest.is_joined(i)));
    }

    #[test]
    fn edge_graph_is_deterministic() {
        let img = crate::blur::gaussian_blur(
            &square_image(32, 6, 25),
            &crate::blur::GaussianKernel::new(0.8),
        );
        let field = GradientField::compute(&img);
        let (mut a, _) = build_edge_graph(&field, &params());
        let (mut b, _) = build_edge_graph(&field, &params());
        for i in 0..field.len() {
            assert_eq!(a.find(i), b.find(i));
        }
    }
}
