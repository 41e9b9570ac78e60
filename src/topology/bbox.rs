//! Floating-point axis-aligned bounding boxes.

use super::range::MAX_DIMS;
use serde::{Deserialize, Serialize};

/// Axis-aligned box with inclusive bounds. Empty when `min > max` in any used dimension.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    num_dims: usize,
    min: [f64; MAX_DIMS],
    max: [f64; MAX_DIMS],
}

impl BBox {
    pub fn new(num_dims: usize, min: [f64; MAX_DIMS], max: [f64; MAX_DIMS]) -> Self {
        debug_assert!((1..=MAX_DIMS).contains(&num_dims));
        let mut b = Self { num_dims, min, max };
        for d in num_dims..MAX_DIMS {
            b.min[d] = 0.0;
            b.max[d] = 0.0;
        }
        b
    }

    pub fn empty(num_dims: usize) -> Self {
        Self::new(num_dims, [0.0; MAX_DIMS], [-1.0; MAX_DIMS])
    }

    #[inline]
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    #[inline]
    pub fn min(&self) -> [f64; MAX_DIMS] {
        self.min
    }

    #[inline]
    pub fn max(&self) -> [f64; MAX_DIMS] {
        self.max
    }

    pub fn is_empty(&self) -> bool {
        (0..self.num_dims).any(|d| self.min[d] > self.max[d])
    }

    pub fn size(&self, dim: usize) -> f64 {
        (self.max[dim] - self.min[dim]).max(0.0)
    }

    pub fn contains(&self, point: [f64; MAX_DIMS]) -> bool {
        (0..self.num_dims).all(|d| point[d] >= self.min[d] && point[d] <= self.max[d])
    }

    pub fn union(&self, other: &BBox) -> BBox {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut out = *self;
        for d in 0..self.num_dims {
            out.min[d] = self.min[d].min(other.min[d]);
            out.max[d] = self.max[d].max(other.max[d]);
        }
        out
    }

    pub fn intersect(&self, other: &BBox) -> BBox {
        let mut out = *self;
        for d in 0..self.num_dims {
            out.min[d] = self.min[d].max(other.min[d]);
            out.max[d] = self.max[d].min(other.max[d]);
        }
        out
    }

    pub fn overlaps(&self, other: &BBox) -> bool {
        !self.intersect(other).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_is_identity_for_union() {
        let b = BBox::new(2, [0.0, 1.0, 0.0], [2.0, 3.0, 0.0]);
        assert!(BBox::empty(2).is_empty());
        assert_eq!(BBox::empty(2).union(&b), b);
    }

    #[test]
    fn closed_bounds_overlap_at_shared_face() {
        let a = BBox::new(2, [0.0, 0.0, 0.0], [1.0, 1.0, 0.0]);
        let b = BBox::new(2, [1.0, 0.5, 0.0], [2.0, 2.0, 0.0]);
        assert!(a.overlaps(&b));
        assert!(a.contains([1.0, 1.0, 0.0]));
        assert!(!a.contains([1.0, 1.5, 0.0]));
    }
}
