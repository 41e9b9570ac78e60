//! Field: values stored over a [`Range`].
//!
//! Storage is contiguous and column-major (dimension 0 fastest), the same linearization
//! the halo map uses, so a field's backing slice can be handed straight to an exchange.

use crate::halo_error::HaloError;
use crate::topology::{Point, Range, RangeIndexer};
use std::ops::{Index, IndexMut};

#[derive(Clone, Debug, PartialEq)]
pub struct Field<T> {
    indexer: RangeIndexer,
    values: Vec<T>,
}

impl<T: Copy> Field<T> {
    /// Field over `range` with every value set to `value`.
    pub fn new(range: Range, value: T) -> Self {
        Self {
            indexer: RangeIndexer::column_major(range),
            values: vec![value; range.count()],
        }
    }

    /// Wraps existing storage; `values` must hold one entry per point of `range`.
    pub fn from_values(range: Range, values: Vec<T>) -> Result<Self, HaloError> {
        if values.len() != range.count() {
            return Err(HaloError::FieldSizeMismatch {
                expected: range.count(),
                got: values.len(),
            });
        }
        Ok(Self {
            indexer: RangeIndexer::column_major(range),
            values,
        })
    }

    #[inline]
    pub fn range(&self) -> &Range {
        self.indexer.range()
    }

    #[inline]
    pub fn indexer(&self) -> &RangeIndexer {
        &self.indexer
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Value at `point`, or `None` outside the field's range.
    pub fn get(&self, point: Point) -> Option<T> {
        self.range()
            .contains(point)
            .then(|| self.values[self.indexer.to_index(point)])
    }

    pub fn get_mut(&mut self, point: Point) -> Option<&mut T> {
        if self.range().contains(point) {
            let i = self.indexer.to_index(point);
            Some(&mut self.values[i])
        } else {
            None
        }
    }

    pub fn fill(&mut self, value: T) {
        self.values.fill(value);
    }

    /// Sets every point of `range` that lies inside the field.
    pub fn fill_range(&mut self, range: &Range, value: T) {
        let target = self.range().intersect(range);
        for p in target.points() {
            let i = self.indexer.to_index(p);
            self.values[i] = value;
        }
    }

    /// `(point, value)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (Point, T)> + '_ {
        self.range().points().zip(self.values.iter().copied())
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }
}

impl<T: Copy> Index<Point> for Field<T> {
    type Output = T;

    /// # Panics
    /// Panics if `point` lies outside the field's range.
    fn index(&self, point: Point) -> &T {
        assert!(
            self.range().contains(point),
            "point {point:?} outside field range {:?}",
            self.range()
        );
        &self.values[self.indexer.to_index(point)]
    }
}

impl<T: Copy> IndexMut<Point> for Field<T> {
    fn index_mut(&mut self, point: Point) -> &mut T {
        assert!(
            self.range().contains(point),
            "point {point:?} outside field range {:?}",
            self.range()
        );
        let i = self.indexer.to_index(point);
        &mut self.values[i]
    }
}

impl<T: Copy> Index<usize> for Field<T> {
    type Output = T;

    #[inline]
    fn index(&self, i: usize) -> &T {
        &self.values[i]
    }
}

impl<T: Copy> IndexMut<usize> for Field<T> {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.values[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_is_column_major() {
        let r = Range::new(&[1, 10], &[3, 12]).unwrap();
        let f = Field::from_values(r, vec![0, 1, 2, 3]).unwrap();
        assert_eq!(f[[2, 10, 0]], 1);
        assert_eq!(f[[1, 11, 0]], 2);
        assert_eq!(f.get([0, 10, 0]), None);
        assert!(Field::from_values(r, vec![0; 3]).is_err());
    }

    #[test]
    fn fill_range_clips_to_field() {
        let mut f = Field::new(Range::new(&[0], &[5]).unwrap(), false);
        f.fill_range(&Range::new(&[3], &[9]).unwrap(), true);
        assert_eq!(f.values(), &[false, false, false, true, true]);
        *f.get_mut([0, 0, 0]).unwrap() = true;
        f[[1, 0, 0]] = true;
        assert_eq!(f.iter().filter(|&(_, v)| v).count(), 4);
    }
}
