//! Linearization of points inside a [`Range`].

use super::range::{MAX_DIMS, Point, Range};

/// Memory layout used to linearize a range.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Layout {
    /// Dimension 0 varies fastest (field storage, halo index lists).
    #[default]
    ColumnMajor,
    /// The last used dimension varies fastest (process grids).
    RowMajor,
}

/// Maps points of a range to linear indices and back.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RangeIndexer {
    range: Range,
    layout: Layout,
    strides: [usize; MAX_DIMS],
}

impl RangeIndexer {
    pub fn new(range: Range, layout: Layout) -> Self {
        let mut strides = [0usize; MAX_DIMS];
        let sizes: Vec<usize> = (0..MAX_DIMS).map(|d| range.size(d).max(0) as usize).collect();
        let n = range.num_dims();
        match layout {
            Layout::ColumnMajor => {
                let mut s = 1;
                for d in 0..MAX_DIMS {
                    strides[d] = s;
                    s *= sizes[d];
                }
            }
            Layout::RowMajor => {
                let mut s = 1;
                for d in (0..n).rev() {
                    strides[d] = s;
                    s *= sizes[d];
                }
                for d in n..MAX_DIMS {
                    strides[d] = s;
                }
            }
        }
        Self {
            range,
            layout,
            strides,
        }
    }

    /// Column-major indexer, the layout of field storage.
    pub fn column_major(range: Range) -> Self {
        Self::new(range, Layout::ColumnMajor)
    }

    #[inline]
    pub fn range(&self) -> &Range {
        &self.range
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Linear index of `point`. The point must lie inside the range.
    #[inline]
    pub fn to_index(&self, point: Point) -> usize {
        debug_assert!(self.range.contains(point), "{point:?} outside {:?}", self.range);
        let b = self.range.begin();
        (0..MAX_DIMS)
            .map(|d| (point[d] - b[d]) as usize * self.strides[d])
            .sum()
    }

    /// Point at linear index `index`.
    pub fn to_point(&self, index: usize) -> Point {
        let b = self.range.begin();
        let mut p = b;
        let mut rem = index;
        let mut order: [usize; MAX_DIMS] = [0, 1, 2];
        order.sort_by(|&a, &c| self.strides[c].cmp(&self.strides[a]));
        for d in order {
            if self.strides[d] == 0 || self.range.size(d) <= 1 {
                continue;
            }
            p[d] = b[d] + (rem / self.strides[d]) as i32;
            rem %= self.strides[d];
        }
        p
    }
}
