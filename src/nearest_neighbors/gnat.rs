//! Geometric Near-neighbor Access Tree
//!
//! A dynamic metric tree for exact nearest-neighbor queries. Elements
//! accumulate in leaf buckets; when a bucket overflows, its contents are
//! split around pivots chosen by greedy k-centers, and each child records
//! the min/max distance from every sibling pivot to the elements it holds.
//! Those ranges, combined with the triangle inequality, let queries discard
//! whole subtrees without computing a single element distance inside them.
//!
//! Removal takes elements straight out of their bucket; the sibling ranges
//! are left untouched (they only ever loosen, so pruning stays sound) and
//! the tree is rebuilt after enough removals to re-tighten them.
//!
//! Reference: Brin, S. (1995). "Near Neighbor Search in Large Metric
//! Spaces", VLDB.

use ordered_float::OrderedFloat;

use crate::common::{PlanningError, PlanningResult};
use crate::nearest_neighbors::{DistanceFn, NearestNeighbors};

const DEFAULT_DEGREE: usize = 8;
const DEFAULT_MAX_LEAF_SIZE: usize = 50;
const DEFAULT_REBUILD_THRESHOLD: usize = 500;

struct Node<T> {
    pivot: T,
    // Indexed by this node's position among its siblings: min/max distance
    // from sibling pivot i to any element stored in this subtree. The
    // sentinels mark an empty subtree, which every query prunes.
    min_range: Vec<f64>,
    max_range: Vec<f64>,
    points: Vec<T>,
    children: Vec<Node<T>>,
}

impl<T: Clone + PartialEq> Node<T> {
    fn new_leaf(pivot: T, sibling_count: usize) -> Self {
        Node {
            pivot,
            min_range: vec![f64::INFINITY; sibling_count],
            max_range: vec![f64::NEG_INFINITY; sibling_count],
            points: Vec::new(),
            children: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Lower bound on the distance from a query to any element stored in
    /// `child`, given the query's distances to all sibling pivots.
    fn lower_bound(child: &Node<T>, pivot_dists: &[f64]) -> f64 {
        let mut bound = 0.0_f64;
        for (i, &d) in pivot_dists.iter().enumerate() {
            bound = bound.max(d - child.max_range[i]);
            bound = bound.max(child.min_range[i] - d);
        }
        bound
    }

    /// Split an overflowing leaf bucket around greedy k-center pivots.
    /// A bucket of indistinguishable elements stays a leaf.
    fn split(node: &mut Node<T>, degree: usize, dist: &DistanceFn<T>) {
        let target = degree.min(node.points.len());
        let mut pivot_idx: Vec<usize> = vec![0];
        let mut min_d: Vec<f64> = node
            .points
            .iter()
            .map(|p| dist(p, &node.points[0]))
            .collect();
        while pivot_idx.len() < target {
            let (farthest, &spread) = min_d
                .iter()
                .enumerate()
                .max_by_key(|&(_, &d)| OrderedFloat(d))
                .expect("bucket is non-empty");
            if spread <= 0.0 {
                break;
            }
            pivot_idx.push(farthest);
            for (i, p) in node.points.iter().enumerate() {
                let d = dist(p, &node.points[farthest]);
                if d < min_d[i] {
                    min_d[i] = d;
                }
            }
        }
        if pivot_idx.len() < 2 {
            return;
        }

        let fanout = pivot_idx.len();
        let mut children: Vec<Node<T>> = pivot_idx
            .iter()
            .map(|&i| Node::new_leaf(node.points[i].clone(), fanout))
            .collect();
        for p in std::mem::take(&mut node.points) {
            let dists: Vec<f64> = children.iter().map(|c| dist(&p, &c.pivot)).collect();
            let nearest = argmin(&dists);
            let child = &mut children[nearest];
            for (i, &d) in dists.iter().enumerate() {
                child.min_range[i] = child.min_range[i].min(d);
                child.max_range[i] = child.max_range[i].max(d);
            }
            child.points.push(p);
        }
        node.children = children;
    }

    fn add(node: &mut Node<T>, item: T, degree: usize, max_leaf_size: usize, dist: &DistanceFn<T>) {
        let mut node = node;
        loop {
            if node.is_leaf() {
                node.points.push(item);
                if node.points.len() > max_leaf_size {
                    Node::split(node, degree, dist);
                }
                return;
            }
            let dists: Vec<f64> = node.children.iter().map(|c| dist(&c.pivot, &item)).collect();
            let nearest = argmin(&dists);
            let child = &mut node.children[nearest];
            for (i, &d) in dists.iter().enumerate() {
                child.min_range[i] = child.min_range[i].min(d);
                child.max_range[i] = child.max_range[i].max(d);
            }
            node = &mut node.children[nearest];
        }
    }

    fn remove(node: &mut Node<T>, item: &T, dist: &DistanceFn<T>) -> bool {
        if node.is_leaf() {
            if let Some(pos) = node.points.iter().position(|p| p == item) {
                node.points.remove(pos);
                return true;
            }
            return false;
        }
        let dists: Vec<f64> = node.children.iter().map(|c| dist(&c.pivot, item)).collect();
        for j in 0..node.children.len() {
            let bound = Node::lower_bound(&node.children[j], &dists);
            if bound <= 0.0 && Node::remove(&mut node.children[j], item, dist) {
                return true;
            }
        }
        false
    }

    fn query_k(node: &Node<T>, query: &T, dist: &DistanceFn<T>, best: &mut KBest<T>) {
        if node.is_leaf() {
            for p in &node.points {
                best.offer(dist(p, query), p);
            }
            return;
        }
        let dists: Vec<f64> = node.children.iter().map(|c| dist(&c.pivot, query)).collect();
        let mut order: Vec<usize> = (0..node.children.len()).collect();
        order.sort_by_key(|&j| OrderedFloat(Node::lower_bound(&node.children[j], &dists)));
        for &j in &order {
            if Node::lower_bound(&node.children[j], &dists) < best.threshold() {
                Node::query_k(&node.children[j], query, dist, best);
            }
        }
    }

    fn query_radius(
        node: &Node<T>,
        query: &T,
        dist: &DistanceFn<T>,
        radius: f64,
        acc: &mut Vec<(OrderedFloat<f64>, T)>,
    ) {
        if node.is_leaf() {
            for p in &node.points {
                let d = dist(p, query);
                if d <= radius {
                    acc.push((OrderedFloat(d), p.clone()));
                }
            }
            return;
        }
        let dists: Vec<f64> = node.children.iter().map(|c| dist(&c.pivot, query)).collect();
        for child in &node.children {
            // <= keeps boundary subtrees: the ball is closed
            if Node::lower_bound(child, &dists) <= radius {
                Node::query_radius(child, query, dist, radius, acc);
            }
        }
    }

    fn collect(node: &Node<T>, out: &mut Vec<T>) {
        out.extend(node.points.iter().cloned());
        for child in &node.children {
            Node::collect(child, out);
        }
    }
}

fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < values[best] {
            best = i;
        }
    }
    best
}

/// Running set of the k closest elements seen so far, sorted ascending.
struct KBest<T> {
    k: usize,
    items: Vec<(f64, T)>,
}

impl<T: Clone> KBest<T> {
    fn new(k: usize) -> Self {
        KBest {
            k,
            items: Vec::new(),
        }
    }

    fn threshold(&self) -> f64 {
        if self.items.len() < self.k {
            f64::INFINITY
        } else {
            self.items[self.items.len() - 1].0
        }
    }

    fn offer(&mut self, d: f64, item: &T) {
        if self.items.len() == self.k && d >= self.threshold() {
            return;
        }
        let pos = self.items.partition_point(|(dd, _)| *dd <= d);
        self.items.insert(pos, (d, item.clone()));
        self.items.truncate(self.k);
    }
}

/// Exact hierarchical nearest-neighbor index over an arbitrary metric.
pub struct GnatNearestNeighbors<T> {
    dist: DistanceFn<T>,
    root: Option<Node<T>>,
    size: usize,
    degree: usize,
    max_leaf_size: usize,
    rebuild_threshold: usize,
    removals: usize,
}

impl<T: Clone + PartialEq> GnatNearestNeighbors<T> {
    pub fn new(dist: DistanceFn<T>) -> Self {
        Self::with_parameters(dist, DEFAULT_DEGREE, DEFAULT_MAX_LEAF_SIZE)
    }

    /// `degree` is the split fan-out, `max_leaf_size` the bucket bound.
    pub fn with_parameters(dist: DistanceFn<T>, degree: usize, max_leaf_size: usize) -> Self {
        GnatNearestNeighbors {
            dist,
            root: None,
            size: 0,
            degree: degree.max(2),
            max_leaf_size: max_leaf_size.max(1),
            rebuild_threshold: DEFAULT_REBUILD_THRESHOLD,
            removals: 0,
        }
    }

    fn rebuild(&mut self) {
        let mut all = Vec::with_capacity(self.size);
        if let Some(root) = &self.root {
            Node::collect(root, &mut all);
        }
        self.root = None;
        self.size = 0;
        self.removals = 0;
        for item in all {
            self.add(item);
        }
    }
}

impl<T: Clone + PartialEq> NearestNeighbors<T> for GnatNearestNeighbors<T> {
    fn add(&mut self, item: T) {
        self.size += 1;
        let degree = self.degree;
        let max_leaf_size = self.max_leaf_size;
        let dist = &self.dist;
        match self.root.as_mut() {
            None => {
                let mut root = Node::new_leaf(item.clone(), 0);
                root.points.push(item);
                self.root = Some(root);
            }
            Some(root) => Node::add(root, item, degree, max_leaf_size, dist),
        }
    }

    fn remove(&mut self, item: &T) -> bool {
        let dist = &self.dist;
        let removed = match self.root.as_mut() {
            None => false,
            Some(root) => Node::remove(root, item, dist),
        };
        if removed {
            self.size -= 1;
            self.removals += 1;
            if self.size == 0 {
                self.root = None;
                self.removals = 0;
            } else if self.removals >= self.rebuild_threshold {
                self.rebuild();
            }
        }
        removed
    }

    fn clear(&mut self) {
        self.root = None;
        self.size = 0;
        self.removals = 0;
    }

    fn size(&self) -> usize {
        self.size
    }

    fn nearest(&self, query: &T) -> PlanningResult<T> {
        let mut out = Vec::new();
        self.nearest_k(query, 1, &mut out);
        out.into_iter().next().ok_or(PlanningError::NoElements)
    }

    fn nearest_k(&self, query: &T, k: usize, out: &mut Vec<T>) {
        out.clear();
        if k == 0 {
            return;
        }
        if let Some(root) = &self.root {
            let mut best = KBest::new(k);
            Node::query_k(root, query, &self.dist, &mut best);
            out.extend(best.items.into_iter().map(|(_, item)| item));
        }
    }

    fn nearest_r(&self, query: &T, radius: f64, out: &mut Vec<T>) {
        out.clear();
        if let Some(root) = &self.root {
            let mut acc = Vec::new();
            Node::query_radius(root, query, &self.dist, radius, &mut acc);
            acc.sort_by_key(|(d, _)| *d);
            out.extend(acc.into_iter().map(|(_, item)| item));
        }
    }

    fn list(&self, out: &mut Vec<T>) {
        out.clear();
        if let Some(root) = &self.root {
            Node::collect(root, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nearest_neighbors::LinearNearestNeighbors;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    type Point = (OrderedFloat<f64>, OrderedFloat<f64>);

    fn point_dist() -> DistanceFn<Point> {
        Box::new(|a: &Point, b: &Point| {
            let dx = a.0 .0 - b.0 .0;
            let dy = a.1 .0 - b.1 .0;
            (dx * dx + dy * dy).sqrt()
        })
    }

    fn random_points(n: usize, seed: u64) -> Vec<Point> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                (
                    OrderedFloat(rng.gen_range(0.0..=1.0)),
                    OrderedFloat(rng.gen_range(0.0..=1.0)),
                )
            })
            .collect()
    }

    #[test]
    fn test_matches_linear_reference() {
        let points = random_points(400, 11);
        let mut gnat = GnatNearestNeighbors::with_parameters(point_dist(), 4, 8);
        let mut linear = LinearNearestNeighbors::new(point_dist());
        for p in &points {
            gnat.add(*p);
            linear.add(*p);
        }
        assert_eq!(gnat.size(), 400);

        let queries = random_points(50, 12);
        let d = point_dist();
        for q in &queries {
            assert_eq!(gnat.nearest(q).unwrap(), linear.nearest(q).unwrap());

            let (mut got, mut want) = (Vec::new(), Vec::new());
            gnat.nearest_k(q, 7, &mut got);
            linear.nearest_k(q, 7, &mut want);
            let got_d: Vec<f64> = got.iter().map(|p| d(p, q)).collect();
            let want_d: Vec<f64> = want.iter().map(|p| d(p, q)).collect();
            assert_eq!(got_d, want_d);

            gnat.nearest_r(q, 0.25, &mut got);
            linear.nearest_r(q, 0.25, &mut want);
            let got_d: Vec<f64> = got.iter().map(|p| d(p, q)).collect();
            let want_d: Vec<f64> = want.iter().map(|p| d(p, q)).collect();
            assert_eq!(got_d, want_d);
        }
    }

    #[test]
    fn test_remove_then_query() {
        let points = random_points(120, 21);
        let mut gnat = GnatNearestNeighbors::with_parameters(point_dist(), 4, 8);
        for p in &points {
            gnat.add(*p);
        }
        for p in points.iter().take(60) {
            assert!(gnat.remove(p));
        }
        assert_eq!(gnat.size(), 60);

        let mut linear = LinearNearestNeighbors::new(point_dist());
        for p in points.iter().skip(60) {
            linear.add(*p);
        }
        for q in &random_points(20, 22) {
            assert_eq!(gnat.nearest(q).unwrap(), linear.nearest(q).unwrap());
        }
        assert!(!gnat.remove(&(OrderedFloat(5.0), OrderedFloat(5.0))));
    }

    #[test]
    fn test_duplicate_bucket_never_splits_forever() {
        let mut gnat: GnatNearestNeighbors<i32> =
            GnatNearestNeighbors::with_parameters(Box::new(|a, b| (a - b).abs() as f64), 4, 4);
        for _ in 0..40 {
            gnat.add(7);
        }
        assert_eq!(gnat.size(), 40);
        assert_eq!(gnat.nearest(&9).unwrap(), 7);
        let mut out = Vec::new();
        gnat.nearest_k(&7, 100, &mut out);
        assert_eq!(out.len(), 40);
    }

    #[test]
    fn test_empty_nearest_fails() {
        let gnat: GnatNearestNeighbors<i32> =
            GnatNearestNeighbors::new(Box::new(|a, b| (a - b).abs() as f64));
        assert!(matches!(gnat.nearest(&1), Err(PlanningError::NoElements)));
    }
}
