//! Effective-area (Visvalingam–Whyatt) simplification under a global vertex budget.
//!
//! Every ring is ranked on its own: interior vertices are removed smallest-triangle first
//! and each removal records a weight. Weights are then pooled across all rings and a single
//! threshold keeps the `points_to_keep` most significant vertices of the whole geometry.

use std::cmp::Ordering;

use crate::mvt::{Point, Ring};

/// Keeps at most the `points_to_keep` globally most significant vertices of `rings`.
///
/// Rings left with fewer than three vertices are dropped. When the budget already covers
/// every vertex the input is returned as is.
#[must_use]
pub fn simplify(rings: &[Ring], points_to_keep: usize) -> Vec<Ring> {
    let rankings: Vec<RingRanking> = rings.iter().map(|ring| rank_ring(ring)).collect();
    let total: usize = rankings.iter().map(|r| r.weights.len()).sum();
    if points_to_keep >= total {
        return rings.to_vec();
    }

    let mut pooled: Vec<f64> = rankings
        .iter()
        .flat_map(|r| r.weights.iter().copied())
        .collect();
    pooled.sort_unstable_by(|a, b| b.total_cmp(a));
    let threshold = pooled[points_to_keep];

    rings
        .iter()
        .zip(&rankings)
        .filter_map(|(ring, ranking)| {
            let kept: Ring = ring
                .iter()
                .zip(&ranking.weights)
                .filter(|&(_, &weight)| weight > threshold)
                .map(|(point, _)| *point)
                .collect();
            (kept.len() >= 3).then_some(kept)
        })
        .collect()
}

/// Per-vertex weights of one ring plus the order interior vertices were removed in.
pub(crate) struct RingRanking {
    pub(crate) weights: Vec<f64>,
    pub(crate) removal_order: Vec<usize>,
}

/// Ranks the vertices of one ring by effective area.
///
/// A removed vertex weighs the larger of its own area and the largest area removed before
/// it, so weights never decrease in removal order. Endpoints are never removed and take
/// the weight of the last vertex removed next to them.
pub(crate) fn rank_ring(ring: &[Point]) -> RingRanking {
    let n = ring.len();
    let mut weights = vec![0.; n];
    let mut removal_order = Vec::with_capacity(n.saturating_sub(2));
    if n < 3 {
        return RingRanking {
            weights,
            removal_order,
        };
    }

    let last = n - 1;
    let mut prev: Vec<usize> = (0..n).map(|i| i.saturating_sub(1)).collect();
    let mut next: Vec<usize> = (0..n).map(|i| (i + 1).min(last)).collect();

    let mut heap = AreaHeap::new(n);
    for i in 1..last {
        heap.push(i, triangle_area(ring[i - 1], ring[i], ring[i + 1]));
    }

    let mut max_area = 0_f64;
    while let Some((vertex, area)) = heap.pop() {
        max_area = max_area.max(area);
        weights[vertex] = max_area;
        removal_order.push(vertex);

        let (p, nx) = (prev[vertex], next[vertex]);
        next[p] = nx;
        prev[nx] = p;

        if p == 0 {
            weights[0] = max_area;
        } else {
            heap.update(p, triangle_area(ring[prev[p]], ring[p], ring[nx]));
        }

        if nx == last {
            weights[last] = max_area;
        } else {
            heap.update(nx, triangle_area(ring[p], ring[nx], ring[next[nx]]));
        }
    }

    RingRanking {
        weights,
        removal_order,
    }
}

fn triangle_area(a: Point, b: Point, c: Point) -> f64 {
    ((a.x - c.x) * (b.y - a.y) - (a.x - b.x) * (c.y - a.y)).abs() / 2.
}

/// Binary min-heap of ring vertices keyed by area, with a position map for re-keying.
///
/// Equal areas are ordered by vertex index so the result is deterministic.
struct AreaHeap {
    heap: Vec<usize>,
    position: Vec<Option<usize>>,
    area: Vec<f64>,
}

impl AreaHeap {
    fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            position: vec![None; capacity],
            area: vec![0.; capacity],
        }
    }

    fn push(&mut self, vertex: usize, area: f64) {
        self.area[vertex] = area;
        self.position[vertex] = Some(self.heap.len());
        self.heap.push(vertex);
        self.sift_up(self.heap.len() - 1);
    }

    fn pop(&mut self) -> Option<(usize, f64)> {
        let top = *self.heap.first()?;
        let last = self.heap.len() - 1;
        self.swap(0, last);
        self.heap.pop();
        self.position[top] = None;
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((top, self.area[top]))
    }

    fn update(&mut self, vertex: usize, area: f64) {
        let Some(idx) = self.position[vertex] else {
            return;
        };
        self.area[vertex] = area;
        let idx = self.sift_up(idx);
        self.sift_down(idx);
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (va, vb) = (self.heap[a], self.heap[b]);
        self.area[va]
            .total_cmp(&self.area[vb])
            .then(va.cmp(&vb))
            == Ordering::Less
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.position[self.heap[a]] = Some(a);
        self.position[self.heap[b]] = Some(b);
    }

    fn sift_up(&mut self, mut idx: usize) -> usize {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
        idx
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;
            if left < self.heap.len() && self.less(left, smallest) {
                smallest = left;
            }
            if right < self.heap.len() && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }
}
