//! Successor graph: which segment can follow which around a quad.
//!
//! Segment `b` may follow segment `a` when `b` turns clockwise off `a`
//! by a sensible angle and both segments reach the corner where their
//! lines cross. Candidate successors are found with an R-tree over
//! segment start points, so the stage stays near-linear in the number of
//! segments.

use petgraph::graph::{DiGraph, NodeIndex};
use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::line_fit::Segment;
use crate::types::DetectorConfig;

type IndexedStart = GeomWithData<[f64; 2], usize>;

/// Thresholds used by [`SuccessorGraph::build`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainParams {
    /// Allowed corner gap as a fraction of segment length.
    pub length_ratio: f64,
    /// Constant part of the allowed corner gap.
    pub min_gap: f64,
    /// Smallest accepted turn; turns above `PI - min_turn` fail too.
    pub min_turn: f64,
}

impl From<&DetectorConfig> for ChainParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            length_ratio: config.chain_length_ratio,
            min_gap: config.chain_min_gap,
            min_turn: config.min_turn_angle,
        }
    }
}

impl ChainParams {
    fn reach(&self, segment: &Segment) -> f64 {
        self.length_ratio.mul_add(segment.length, self.min_gap)
    }
}

/// Directed graph over segment indices; an edge `a -> b` means `b` may
/// directly follow `a` when walking a quad clockwise.
#[derive(Debug, Clone)]
pub struct SuccessorGraph {
    graph: DiGraph<(), ()>,
}

impl SuccessorGraph {
    /// Link every compatible parent/child pair.
    #[must_use]
    pub fn build(segments: &[Segment], params: &ChainParams) -> Self {
        let mut graph = DiGraph::with_capacity(segments.len(), segments.len() * 2);
        for _ in segments {
            graph.add_node(());
        }

        let starts: Vec<IndexedStart> = segments
            .iter()
            .enumerate()
            .map(|(i, s)| GeomWithData::new([s.start.x, s.start.y], i))
            .collect();
        let tree = RTree::bulk_load(starts);
        let max_child_reach = segments
            .iter()
            .map(|s| params.reach(s))
            .fold(0.0, f64::max);

        for (a, parent) in segments.iter().enumerate() {
            let radius = params.reach(parent) + max_child_reach;
            let mut children: Vec<usize> = tree
                .locate_within_distance([parent.end.x, parent.end.y], radius * radius)
                .map(|c| c.data)
                .filter(|&b| b != a && can_follow(parent, &segments[b], params))
                .collect();
            children.sort_unstable();
            for b in children {
                graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), ());
            }
        }

        log::debug!(
            "successor graph: {} segments, {} links",
            graph.node_count(),
            graph.edge_count()
        );
        Self { graph }
    }

    /// Number of segments (nodes).
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of parent/child links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Children of `segment`, ascending.
    #[must_use]
    pub fn successors(&self, segment: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors(NodeIndex::new(segment))
            .map(NodeIndex::index)
            .collect();
        out.sort_unstable();
        out
    }

    /// Returns `true` if `child` may follow `parent`.
    #[must_use]
    pub fn links(&self, parent: usize, child: usize) -> bool {
        self.graph.contains_edge(NodeIndex::new(parent), NodeIndex::new(child))
    }
}

/// Pairwise test: does `child` turn clockwise off `parent` and do both
/// reach their shared corner?
#[must_use]
pub fn can_follow(parent: &Segment, child: &Segment, params: &ChainParams) -> bool {
    let turn = parent.turn_to(child);
    if turn < params.min_turn || turn > std::f64::consts::PI - params.min_turn {
        return false;
    }
    let Some(corner) = parent.intersect(child) else {
        return false;
    };
    parent.end.distance(corner) <= params.reach(parent)
        && child.start.distance(corner) <= params.reach(child)
}
