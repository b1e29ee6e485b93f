//! Turn union-find components into weighted point clusters.

use std::collections::BTreeMap;

use crate::gradient::GradientField;
use crate::union_find::DisjointSets;

/// One pixel of a cluster, weighted by its gradient magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedPoint {
    /// Pixel column.
    pub x: u32,
    /// Pixel row.
    pub y: u32,
    /// Gradient magnitude at the pixel.
    pub weight: f64,
}

/// Clusters keyed by component root, points in row-major order.
///
/// A `BTreeMap` keeps iteration order fixed so downstream stages see
/// segments in the same order on every run.
pub type Clusters = BTreeMap<usize, Vec<WeightedPoint>>;

/// Group every joined pixel under its component root.
///
/// Components with fewer than `min_points` pixels are dropped: they
/// cannot support a stable line direction.
#[must_use]
pub fn extract_clusters(
    forest: &mut DisjointSets,
    field: &GradientField,
    min_points: usize,
) -> Clusters {
    let mut clusters = Clusters::new();
    let width = field.width();
    for y in 0..field.height() {
        for x in 0..width {
            let i = field.index(x, y);
            if !forest.is_joined(i) {
                continue;
            }
            let root = forest.find(i);
            if forest.set_size(root) < min_points {
                continue;
            }
            clusters.entry(root).or_default().push(WeightedPoint {
                x,
                y,
                weight: field.magnitude(i),
            });
        }
    }
    clusters
}
