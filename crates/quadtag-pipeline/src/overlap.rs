//! Overlap resolution: one detection per contested image region.
//!
//! Detections are ranked best first and kept greedily. A candidate is
//! dropped when its polygon intersects an already-kept polygon by more
//! than `threshold` of the smaller of the two areas.

use std::cmp::Ordering;

use geo::{Area, BooleanOps, Coord, LineString, Polygon};

use crate::types::TagDetection;

/// Corner polygon of a detection.
#[must_use]
pub fn detection_polygon(detection: &TagDetection) -> Polygon<f64> {
    let ring: Vec<Coord<f64>> = detection
        .corners
        .iter()
        .map(|p| Coord { x: p.x, y: p.y })
        .collect();
    Polygon::new(LineString::from(ring), vec![])
}

/// Intersection area over the smaller polygon's area, in `[0, 1]`.
#[must_use]
pub fn overlap_fraction(a: &Polygon<f64>, b: &Polygon<f64>) -> f64 {
    let smaller = a.unsigned_area().min(b.unsigned_area());
    if smaller <= 0.0 {
        return 0.0;
    }
    (a.intersection(b).unsigned_area() / smaller).clamp(0.0, 1.0)
}

/// Best-first order: fewer bit errors, then larger area, then the
/// bounding box's top edge, its left edge, and finally the id.
#[must_use]
pub fn rank(a: &TagDetection, b: &TagDetection) -> Ordering {
    let top_left = |d: &TagDetection| {
        d.corners.iter().fold((f64::INFINITY, f64::INFINITY), |(t, l), p| {
            (t.min(p.y), l.min(p.x))
        })
    };
    let (a_top, a_left) = top_left(a);
    let (b_top, b_left) = top_left(b);
    a.hamming
        .cmp(&b.hamming)
        .then_with(|| b.area.total_cmp(&a.area))
        .then_with(|| a_top.total_cmp(&b_top))
        .then_with(|| a_left.total_cmp(&b_left))
        .then_with(|| a.id.cmp(&b.id))
}

/// Keep the best detection of every overlapping group, in rank order.
#[must_use]
pub fn resolve_overlaps(mut detections: Vec<TagDetection>, threshold: f64) -> Vec<TagDetection> {
    detections.sort_by(rank);
    let mut kept: Vec<(TagDetection, Polygon<f64>)> = Vec::with_capacity(detections.len());
    for detection in detections {
        let polygon = detection_polygon(&detection);
        let conflict = kept
            .iter()
            .any(|(_, other)| overlap_fraction(&polygon, other) > threshold);
        if conflict {
            log::trace!(
                "overlap: dropping id {} (hamming {}, area {:.1})",
                detection.id,
                detection.hamming,
                detection.area
            );
            continue;
        }
        kept.push((detection, polygon));
    }
    kept.into_iter().map(|(d, _)| d).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::homography::Homography;
    use crate::types::Point;

    fn detection(id: usize, hamming: u32, x: f64, y: f64, side: f64) -> TagDetection {
        let corners = [
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ];
        TagDetection {
            id,
            hamming,
            rotation: 0,
            corners,
            center: Point::new(x + side / 2.0, y + side / 2.0),
            homography: Homography::from_unit_square(&corners).unwrap(),
            area: side * side,
            goodness: side / (1.0 + f64::from(hamming)),
        }
    }

    #[test]
    fn lower_hamming_wins_overlap() {
        let worse = detection(4, 2, 10.0, 10.0, 40.0);
        let better = detection(7, 0, 12.0, 11.0, 40.0);
        let out = resolve_overlaps(vec![worse, better.clone()], 0.5);
        assert_eq!(out, vec![better]);
    }

    #[test]
    fn larger_area_breaks_hamming_tie() {
        let outer = detection(1, 0, 10.0, 10.0, 40.0);
        let inner = detection(2, 0, 15.0, 15.0, 30.0);
        let out = resolve_overlaps(vec![inner, outer.clone()], 0.5);
        assert_eq!(out, vec![outer]);
    }

    #[test]
    fn disjoint_detections_all_survive_in_rank_order() {
        let a = detection(3, 1, 100.0, 0.0, 20.0);
        let b = detection(5, 0, 0.0, 0.0, 20.0);
        let c = detection(9, 0, 0.0, 50.0, 20.0);
        let out = resolve_overlaps(vec![a.clone(), c.clone(), b.clone()], 0.5);
        assert_eq!(out, vec![b, c, a]);
    }

    #[test]
    fn small_overlap_is_tolerated() {
        let a = detection(1, 0, 0.0, 0.0, 20.0);
        let b = detection(2, 0, 15.0, 0.0, 20.0);
        let fraction = overlap_fraction(&detection_polygon(&a), &detection_polygon(&b));
        assert!((fraction - 0.25).abs() < 1e-9, "{fraction}");
        assert_eq!(resolve_overlaps(vec![a, b], 0.5).len(), 2);
    }

    #[test]
    fn identical_quads_keep_lower_id() {
        let a = detection(8, 0, 5.0, 5.0, 20.0);
        let b = detection(3, 0, 5.0, 5.0, 20.0);
        let out = resolve_overlaps(vec![a, b], 0.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 3);
    }
}
