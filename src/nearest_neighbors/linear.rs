//! Brute-force nearest-neighbor reference implementation

use ordered_float::OrderedFloat;

use crate::common::{PlanningError, PlanningResult};
use crate::nearest_neighbors::{DistanceFn, NearestNeighbors};

/// Exact linear-scan index. Every query is O(n); this is the reference
/// implementation the others are tested against.
pub struct LinearNearestNeighbors<T> {
    items: Vec<T>,
    dist: DistanceFn<T>,
}

impl<T: Clone + PartialEq> LinearNearestNeighbors<T> {
    pub fn new(dist: DistanceFn<T>) -> Self {
        LinearNearestNeighbors {
            items: Vec::new(),
            dist,
        }
    }

    pub(crate) fn items(&self) -> &[T] {
        &self.items
    }

    pub(crate) fn distance(&self, a: &T, b: &T) -> f64 {
        (self.dist)(a, b)
    }
}

impl<T: Clone + PartialEq> NearestNeighbors<T> for LinearNearestNeighbors<T> {
    fn add(&mut self, item: T) {
        self.items.push(item);
    }

    fn remove(&mut self, item: &T) -> bool {
        match self.items.iter().position(|x| x == item) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn size(&self) -> usize {
        self.items.len()
    }

    fn nearest(&self, query: &T) -> PlanningResult<T> {
        self.items
            .iter()
            .min_by_key(|x| OrderedFloat((self.dist)(x, query)))
            .cloned()
            .ok_or(PlanningError::NoElements)
    }

    fn nearest_k(&self, query: &T, k: usize, out: &mut Vec<T>) {
        out.clear();
        if k == 0 {
            return;
        }
        let mut scored: Vec<(OrderedFloat<f64>, usize)> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, x)| (OrderedFloat((self.dist)(x, query)), i))
            .collect();
        scored.sort();
        out.extend(
            scored
                .into_iter()
                .take(k)
                .map(|(_, i)| self.items[i].clone()),
        );
    }

    fn nearest_r(&self, query: &T, radius: f64, out: &mut Vec<T>) {
        out.clear();
        let mut scored: Vec<(OrderedFloat<f64>, usize)> = self
            .items
            .iter()
            .enumerate()
            .filter_map(|(i, x)| {
                let d = (self.dist)(x, query);
                (d <= radius).then_some((OrderedFloat(d), i))
            })
            .collect();
        scored.sort();
        out.extend(scored.into_iter().map(|(_, i)| self.items[i].clone()));
    }

    fn list(&self, out: &mut Vec<T>) {
        out.clear();
        out.extend(self.items.iter().cloned());
    }
}
