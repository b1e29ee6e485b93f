//! Disjoint-set forest over pixel indices.
//!
//! A flat arena: node `i` is pixel `i`, its parent is another index, and
//! the root of each tree carries the component size. `find` compresses
//! paths; `union` hangs the smaller tree under the larger one (ties keep
//! the first argument's root), so identical call sequences always build
//! identical forests.

/// Union-find forest with union by size and path compression.
#[derive(Debug, Clone)]
pub struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
    joined: Vec<bool>,
}

impl DisjointSets {
    /// Create `n` singleton sets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
            joined: vec![false; n],
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Returns `true` if the forest has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Representative of `x`'s set, compressing the path on the way.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Representative of `x`'s set without compressing.
    #[must_use]
    pub fn root_of(&self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        root
    }

    /// Merge the sets containing `a` and `b`; returns the surviving root.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let ra = self.find(a);
        let rb = self.find(b);
        self.union_roots(ra, rb)
    }

    /// Merge two roots (as returned by [`find`](Self::find)).
    ///
    /// Passing the same root twice is a no-op. The smaller tree is
    /// re-parented under the larger; on a tie `ra` survives.
    pub fn union_roots(&mut self, ra: usize, rb: usize) -> usize {
        if ra == rb {
            return ra;
        }
        let (big, small) = if self.size[ra] < self.size[rb] {
            (rb, ra)
        } else {
            (ra, rb)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        self.joined[big] = true;
        self.joined[small] = true;
        big
    }

    /// Size of the set whose root is `root`.
    #[must_use]
    pub fn set_size(&self, root: usize) -> usize {
        self.size[root]
    }

    /// Returns `true` once `x` has taken part in a union, directly or as a
    /// root absorbing another set.
    #[must_use]
    pub fn is_joined(&self, x: usize) -> bool {
        self.joined[x]
    }

    /// Returns `true` if `a` and `b` are in the same set.
    pub fn same_set(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Depth of `x` below its root (0 for a root).
    #[must_use]
    pub fn depth(&self, x: usize) -> usize {
        let mut depth = 0;
        let mut node = x;
        while self.parent[node] != node {
            node = self.parent[node];
            depth += 1;
        }
        depth
    }
}
