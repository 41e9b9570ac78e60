//! Axis-aligned integer index ranges in up to three dimensions.
//!
//! A [`Range`] stores an inclusive begin and exclusive end per dimension. Dimensions
//! beyond `num_dims` are pinned to `[0, 1)` so that loops over all three dimensions
//! visit each point of a lower-dimensional range exactly once.

use crate::debug_invariants::DebugInvariants;
use crate::halo_error::HaloError;
use serde::{Deserialize, Serialize};

/// Maximum number of dimensions supported by ranges, carts and bin grids.
pub const MAX_DIMS: usize = 3;

/// A point in index space. Unused trailing components are zero.
pub type Point = [i32; MAX_DIMS];

/// Axis-aligned integer index box, `begin` inclusive and `end` exclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    num_dims: usize,
    begin: Point,
    end: Point,
}

impl Range {
    /// Builds a range from per-dimension bounds, validating dimension count and order.
    pub fn new(begin: &[i32], end: &[i32]) -> Result<Self, HaloError> {
        let num_dims = begin.len();
        if num_dims == 0 || num_dims > MAX_DIMS || end.len() != num_dims {
            return Err(HaloError::InvalidDimension(num_dims.max(end.len())));
        }
        let mut b = [0; MAX_DIMS];
        let mut e = [1; MAX_DIMS];
        b[..num_dims].copy_from_slice(begin);
        e[..num_dims].copy_from_slice(end);
        if (0..num_dims).any(|d| b[d] > e[d]) {
            return Err(HaloError::InvertedRange { begin: b, end: e });
        }
        Ok(Self {
            num_dims,
            begin: b,
            end: e,
        })
    }

    /// Builds a range from full-width arrays; trailing dimensions are reset to `[0, 1)`.
    pub fn from_bounds(num_dims: usize, begin: Point, end: Point) -> Self {
        debug_assert!((1..=MAX_DIMS).contains(&num_dims));
        let mut r = Self {
            num_dims,
            begin,
            end,
        };
        for d in num_dims..MAX_DIMS {
            r.begin[d] = 0;
            r.end[d] = 1;
        }
        r
    }

    /// `[0, size)` in each of the first `num_dims` dimensions.
    pub fn from_size(num_dims: usize, size: &[i32]) -> Self {
        let mut end = [1; MAX_DIMS];
        end[..num_dims].copy_from_slice(&size[..num_dims]);
        Self::from_bounds(num_dims, [0; MAX_DIMS], end)
    }

    /// An empty range (`begin == end == 0` in every used dimension).
    pub fn empty(num_dims: usize) -> Self {
        Self::from_bounds(num_dims, [0; MAX_DIMS], [0; MAX_DIMS])
    }

    #[inline]
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    #[inline]
    pub fn begin(&self) -> Point {
        self.begin
    }

    #[inline]
    pub fn end(&self) -> Point {
        self.end
    }

    #[inline]
    pub fn begin_at(&self, dim: usize) -> i32 {
        self.begin[dim]
    }

    #[inline]
    pub fn end_at(&self, dim: usize) -> i32 {
        self.end[dim]
    }

    pub fn set_begin(&mut self, dim: usize, value: i32) {
        debug_assert!(dim < self.num_dims);
        self.begin[dim] = value;
    }

    pub fn set_end(&mut self, dim: usize, value: i32) {
        debug_assert!(dim < self.num_dims);
        self.end[dim] = value;
    }

    /// Extent along `dim`.
    #[inline]
    pub fn size(&self, dim: usize) -> i32 {
        self.end[dim] - self.begin[dim]
    }

    /// Number of points in the range.
    pub fn count(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (0..MAX_DIMS).map(|d| self.size(d) as usize).product()
    }

    pub fn is_empty(&self) -> bool {
        (0..self.num_dims).any(|d| self.end[d] <= self.begin[d])
    }

    /// True if `point` lies inside the range in every used dimension.
    pub fn contains(&self, point: Point) -> bool {
        (0..self.num_dims).all(|d| point[d] >= self.begin[d] && point[d] < self.end[d])
    }

    /// True if `other` is a subset of `self`. Empty ranges are included everywhere.
    pub fn includes(&self, other: &Range) -> bool {
        other.is_empty()
            || (0..self.num_dims)
                .all(|d| other.begin[d] >= self.begin[d] && other.end[d] <= self.end[d])
    }

    /// Smallest range containing both operands.
    pub fn union(&self, other: &Range) -> Range {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut out = *self;
        for d in 0..self.num_dims {
            out.begin[d] = self.begin[d].min(other.begin[d]);
            out.end[d] = self.end[d].max(other.end[d]);
        }
        out
    }

    /// Overlap of both operands, or an empty range.
    pub fn intersect(&self, other: &Range) -> Range {
        let mut out = *self;
        for d in 0..self.num_dims {
            out.begin[d] = self.begin[d].max(other.begin[d]);
            out.end[d] = self.end[d].min(other.end[d]);
        }
        if out.is_empty() {
            Range::empty(self.num_dims)
        } else {
            out
        }
    }

    /// Clamps `point` into the range (each component into `[begin, end-1]`).
    pub fn clamp(&self, point: Point) -> Point {
        let mut out = point;
        for d in 0..self.num_dims {
            out[d] = point[d].clamp(self.begin[d], (self.end[d] - 1).max(self.begin[d]));
        }
        out
    }

    /// Iterates all points with dimension 0 varying fastest.
    pub fn points(&self) -> RangePoints {
        RangePoints {
            range: *self,
            next: if self.is_empty() {
                None
            } else {
                Some(self.begin)
            },
        }
    }
}

impl DebugInvariants for Range {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Range");
    }

    fn validate_invariants(&self) -> Result<(), HaloError> {
        if self.num_dims == 0 || self.num_dims > MAX_DIMS {
            return Err(HaloError::InvalidDimension(self.num_dims));
        }
        if (0..self.num_dims).any(|d| self.begin[d] > self.end[d]) {
            return Err(HaloError::InvertedRange {
                begin: self.begin,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Iterator over the points of a [`Range`].
#[derive(Clone, Debug)]
pub struct RangePoints {
    range: Range,
    next: Option<Point>,
}

impl Iterator for RangePoints {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        let current = self.next?;
        let mut p = current;
        let mut d = 0;
        loop {
            if d == MAX_DIMS {
                self.next = None;
                break;
            }
            p[d] += 1;
            if p[d] < self.range.end[d] {
                self.next = Some(p);
                break;
            }
            p[d] = self.range.begin[d];
            d += 1;
        }
        Some(current)
    }
}
