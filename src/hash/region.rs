//! Hashable regions, coordinate types and the uniform bin grid they are bucketed into.

use crate::topology::{BBox, MAX_DIMS, Point, Range, RangeIndexer};
use bytemuck::Pod;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Scalar coordinate of a hashable region (`i32` index space or `f64` physical space).
pub trait HashCoord:
    Copy + Debug + PartialOrd + num_traits::NumCast + ToPrimitive + Send + Sync + 'static
{
    /// Width of one bin when `extent` is split into `num_bins` bins.
    fn bin_size(extent: Self, num_bins: i32) -> Self;

    /// Bin coordinate of `offset` from the grid origin (rounds toward negative infinity).
    fn to_cell(offset: Self, bin_size: Self) -> i32;

    fn sub(self, other: Self) -> Self;

    /// Order-preserving bijection onto `i64`, used to all-reduce extents.
    fn to_ordered(self) -> i64;
    fn from_ordered(v: i64) -> Self;
}

impl HashCoord for i32 {
    fn bin_size(extent: i32, num_bins: i32) -> i32 {
        ((extent + num_bins - 1) / num_bins.max(1)).max(1)
    }

    fn to_cell(offset: i32, bin_size: i32) -> i32 {
        offset.div_euclid(bin_size.max(1))
    }

    fn sub(self, other: i32) -> i32 {
        self - other
    }

    fn to_ordered(self) -> i64 {
        i64::from(self)
    }

    fn from_ordered(v: i64) -> i32 {
        v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

impl HashCoord for f64 {
    fn bin_size(extent: f64, num_bins: i32) -> f64 {
        extent / f64::from(num_bins.max(1))
    }

    fn to_cell(offset: f64, bin_size: f64) -> i32 {
        if bin_size > 0.0 {
            (offset / bin_size).floor() as i32
        } else {
            0
        }
    }

    fn sub(self, other: f64) -> f64 {
        self - other
    }

    fn to_ordered(self) -> i64 {
        let bits = self.to_bits() as i64;
        if bits < 0 { bits ^ i64::MAX } else { bits }
    }

    fn from_ordered(v: i64) -> f64 {
        let bits = if v < 0 { v ^ i64::MAX } else { v };
        f64::from_bits(bits as u64)
    }
}

/// An axis-aligned region that can be bucketed into a bin grid.
pub trait HashableRegion: Copy + Debug + PartialEq + Send + Sync + 'static {
    type Coord: HashCoord;
    /// Fixed-size wire form.
    type Wire: Pod;

    fn num_dims(&self) -> usize;
    fn empty_region(num_dims: usize) -> Self;
    fn is_empty_region(&self) -> bool;
    fn union_region(&self, other: &Self) -> Self;

    /// Raw bounds (`begin`/`end` for ranges, `min`/`max` for boxes).
    fn lower_bound(&self) -> [Self::Coord; MAX_DIMS];
    fn upper_bound(&self) -> [Self::Coord; MAX_DIMS];
    fn from_bounds(
        num_dims: usize,
        lower: [Self::Coord; MAX_DIMS],
        upper: [Self::Coord; MAX_DIMS],
    ) -> Self;

    /// Last point covered by the region (inclusive), used for bin mapping.
    fn upper_corner(&self) -> [Self::Coord; MAX_DIMS];

    fn contains_point(&self, point: [Self::Coord; MAX_DIMS]) -> bool;

    fn to_wire(&self) -> Self::Wire;
    fn from_wire(w: &Self::Wire) -> Self;
}

impl HashableRegion for Range {
    type Coord = i32;
    type Wire = crate::algs::wire::WireRange;

    fn num_dims(&self) -> usize {
        Range::num_dims(self)
    }

    fn empty_region(num_dims: usize) -> Self {
        Range::empty(num_dims)
    }

    fn is_empty_region(&self) -> bool {
        self.is_empty()
    }

    fn union_region(&self, other: &Self) -> Self {
        self.union(other)
    }

    fn lower_bound(&self) -> Point {
        self.begin()
    }

    fn upper_bound(&self) -> Point {
        self.end()
    }

    fn from_bounds(num_dims: usize, lower: Point, upper: Point) -> Self {
        Range::from_bounds(num_dims, lower, upper)
    }

    fn upper_corner(&self) -> Point {
        let mut p = self.end();
        for d in 0..MAX_DIMS {
            p[d] = (p[d] - 1).max(self.begin_at(d));
        }
        p
    }

    fn contains_point(&self, point: Point) -> bool {
        self.contains(point)
    }

    fn to_wire(&self) -> Self::Wire {
        crate::algs::wire::WireRange::new(self)
    }

    fn from_wire(w: &Self::Wire) -> Self {
        w.get()
    }
}

impl HashableRegion for BBox {
    type Coord = f64;
    type Wire = crate::algs::wire::WireBBox;

    fn num_dims(&self) -> usize {
        BBox::num_dims(self)
    }

    fn empty_region(num_dims: usize) -> Self {
        BBox::empty(num_dims)
    }

    fn is_empty_region(&self) -> bool {
        self.is_empty()
    }

    fn union_region(&self, other: &Self) -> Self {
        self.union(other)
    }

    fn lower_bound(&self) -> [f64; MAX_DIMS] {
        self.min()
    }

    fn upper_bound(&self) -> [f64; MAX_DIMS] {
        self.max()
    }

    fn from_bounds(num_dims: usize, lower: [f64; MAX_DIMS], upper: [f64; MAX_DIMS]) -> Self {
        BBox::new(num_dims, lower, upper)
    }

    fn upper_corner(&self) -> [f64; MAX_DIMS] {
        self.max()
    }

    fn contains_point(&self, point: [f64; MAX_DIMS]) -> bool {
        self.contains(point)
    }

    fn to_wire(&self) -> Self::Wire {
        crate::algs::wire::WireBBox::new(self)
    }

    fn from_wire(w: &Self::Wire) -> Self {
        w.get()
    }
}

/// A registered region as seen by hash queries.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionData<R> {
    pub region: R,
    pub rank: usize,
    pub tag: i32,
}

/// Uniform grid of bins laid over an origin with a fixed bin size.
#[derive(Copy, Clone, Debug)]
pub struct BinGrid<C: HashCoord> {
    num_dims: usize,
    bin_range: Range,
    indexer: RangeIndexer,
    origin: [C; MAX_DIMS],
    bin_size: [C; MAX_DIMS],
}

impl<C: HashCoord> BinGrid<C> {
    /// Grid of `num_bins` bins covering the extents `[lower, upper]`.
    pub fn new(
        num_dims: usize,
        num_bins: [i32; MAX_DIMS],
        lower: [C; MAX_DIMS],
        upper: [C; MAX_DIMS],
    ) -> Self {
        let mut nb = [1; MAX_DIMS];
        for d in 0..num_dims {
            nb[d] = num_bins[d].max(1);
        }
        let bin_range = Range::from_size(num_dims, &nb);
        let mut bin_size = lower;
        for d in 0..MAX_DIMS {
            let extent = if upper[d] > lower[d] {
                upper[d].sub(lower[d])
            } else {
                lower[d].sub(lower[d])
            };
            bin_size[d] = C::bin_size(extent, nb[d]);
        }
        Self {
            num_dims,
            bin_range,
            indexer: RangeIndexer::column_major(bin_range),
            origin: lower,
            bin_size,
        }
    }

    #[inline]
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    /// Bin locations `[0, num_bins)` per dimension.
    #[inline]
    pub fn bin_range(&self) -> &Range {
        &self.bin_range
    }

    pub fn num_bins(&self) -> usize {
        self.bin_range.count()
    }

    #[inline]
    pub fn bin_size(&self) -> [C; MAX_DIMS] {
        self.bin_size
    }

    /// Bin location containing `point`, clamped into the bin range.
    pub fn map_to_bin_loc(&self, point: [C; MAX_DIMS]) -> Point {
        let mut cell = [0; MAX_DIMS];
        for d in 0..self.num_dims {
            cell[d] = C::to_cell(point[d].sub(self.origin[d]), self.bin_size[d]);
        }
        self.bin_range.clamp(cell)
    }

    /// Linear bin index containing `point`. Total: points outside the grid are clamped.
    pub fn map_to_bin(&self, point: [C; MAX_DIMS]) -> usize {
        self.indexer.to_index(self.map_to_bin_loc(point))
    }

    pub fn bin_index(&self, loc: Point) -> usize {
        self.indexer.to_index(loc)
    }

    /// Bins overlapped by `region`: the box spanned by its lower and upper corner bins.
    pub fn overlapped_bins<R: HashableRegion<Coord = C>>(&self, region: &R) -> Range {
        if region.is_empty_region() {
            return Range::empty(self.num_dims);
        }
        let lo = self.map_to_bin_loc(region.lower_bound());
        let hi = self.map_to_bin_loc(region.upper_corner());
        let mut end = hi;
        for e in end.iter_mut().take(self.num_dims) {
            *e += 1;
        }
        Range::from_bounds(self.num_dims, lo, end)
    }
}

/// Chooses bin counts per dimension so that roughly `max_bins` bins of similar shape
/// cover a domain with the given side `lengths`. The shortest dimension is split
/// first; the remaining dimensions share what is left.
pub fn bin_decomp(num_dims: usize, lengths: [f64; MAX_DIMS], max_bins: usize) -> [i32; MAX_DIMS] {
    let mut num_bins = [1; MAX_DIMS];
    let max_bins = max_bins.max(1) as f64;
    // degenerate dimensions get a single bin
    let dims: Vec<(usize, f64)> = (0..num_dims)
        .filter(|&d| lengths[d] > 0.0)
        .map(|d| (d, lengths[d]))
        .collect();
    split_bins(&dims, max_bins, &mut num_bins);
    num_bins
}

fn split_bins(dims: &[(usize, f64)], max_bins: f64, num_bins: &mut [i32; MAX_DIMS]) {
    match dims {
        [] => {}
        [(d, _)] => num_bins[*d] = (max_bins as i32).max(1),
        _ => {
            let volume: f64 = dims.iter().map(|&(_, l)| l).product();
            let (imin, &(dmin, lmin)) = dims
                .iter()
                .enumerate()
                .rev()
                .min_by(|a, b| a.1.1.total_cmp(&b.1.1))
                .unwrap_or((0, &dims[0]));
            let base = (max_bins / volume).powf(1.0 / dims.len() as f64);
            // absorb rounding so exact splits like 8 * 0.25 land on 2, not 1
            let n = ((lmin * base + 1e-9).floor() as i32).max(1);
            num_bins[dmin] = n;
            let rest: Vec<(usize, f64)> = dims
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != imin)
                .map(|(_, &p)| p)
                .collect();
            split_bins(&rest, (max_bins / f64::from(n)).floor(), num_bins);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_cells_round_down() {
        assert_eq!(i32::to_cell(-1, 4), -1);
        assert_eq!(i32::to_cell(3, 4), 0);
        assert_eq!(i32::to_cell(4, 4), 1);
        assert_eq!(i32::bin_size(10, 3), 4);
        assert_eq!(i32::bin_size(0, 3), 1);
    }

    #[test]
    fn float_order_encoding_is_monotone() {
        let xs = [-1e9, -2.5, -0.0, 0.0, 1e-12, 3.0, 7e30];
        for w in xs.windows(2) {
            assert!(w[0].to_ordered() <= w[1].to_ordered());
        }
        for x in xs {
            assert_eq!(f64::from_ordered(x.to_ordered()), x);
        }
    }

    #[test]
    fn range_upper_corner_is_last_point() {
        let r = Range::new(&[0, 2], &[4, 2]).unwrap();
        assert_eq!(r.upper_corner(), [3, 2, 0]);
    }

    #[test]
    fn grid_maps_and_clamps() {
        let g = BinGrid::<i32>::new(2, [2, 2, 1], [0, 0, 0], [10, 10, 1]);
        assert_eq!(g.bin_size(), [5, 5, 1]);
        assert_eq!(g.map_to_bin_loc([4, 5, 0]), [0, 1, 0]);
        assert_eq!(g.map_to_bin_loc([-3, 99, 0]), [0, 1, 0]);
        assert_eq!(g.map_to_bin([9, 9, 0]), 3);
        let r = Range::new(&[3, 0], &[6, 5]).unwrap();
        assert_eq!(
            g.overlapped_bins(&r),
            Range::new(&[0, 0], &[2, 1]).unwrap()
        );
    }

    #[test]
    fn bin_decomp_shapes_follow_domain() {
        assert_eq!(bin_decomp(1, [10.0, 0.0, 0.0], 4), [4, 1, 1]);
        assert_eq!(bin_decomp(2, [20.0, 20.0, 0.0], 4), [2, 2, 1]);
        let nb = bin_decomp(2, [10.0, 40.0, 0.0], 4);
        assert_eq!(nb, [1, 4, 1]);
        let nb = bin_decomp(3, [8.0, 8.0, 8.0], 8);
        assert_eq!(nb, [2, 2, 2]);
        assert_eq!(bin_decomp(2, [0.0, 12.0, 0.0], 6), [1, 6, 1]);
        assert_eq!(bin_decomp(2, [5.0, 5.0, 0.0], 0), [1, 1, 1]);
    }
}
