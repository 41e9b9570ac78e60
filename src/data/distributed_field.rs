//! DistributedField: a field over a partition's extended range.
//!
//! Local points are owned by this rank; the remaining extended points are ghosts kept
//! current by [`DistributedField::exchange`].

use super::field::Field;
use super::partition::Partition;
use crate::algs::communicator::Communicator;
use crate::halo::{ExchangeRequest, HaloValue};
use crate::halo_error::HaloError;
use crate::topology::{Cart, Point, Range};
use std::ops::{Index, IndexMut};
use std::sync::Arc;

pub struct DistributedField<'c, T: HaloValue, C: Communicator> {
    partition: Arc<Partition<'c, C>>,
    values: Field<T>,
}

impl<'c, T: HaloValue, C: Communicator> DistributedField<'c, T, C> {
    /// Field with every extended point set to `value`.
    pub fn new(partition: Arc<Partition<'c, C>>, value: T) -> Self {
        let values = Field::new(*partition.extended_range(), value);
        Self { partition, values }
    }

    /// Wraps `values`, laid out column-major over the extended range.
    pub fn from_values(partition: Arc<Partition<'c, C>>, values: Vec<T>) -> Result<Self, HaloError> {
        let values = Field::from_values(*partition.extended_range(), values)?;
        Ok(Self { partition, values })
    }

    #[inline]
    pub fn partition(&self) -> &Arc<Partition<'c, C>> {
        &self.partition
    }

    #[inline]
    pub fn cart(&self) -> &Cart {
        self.partition.cart()
    }

    #[inline]
    pub fn comm(&self) -> &'c C {
        self.partition.comm()
    }

    #[inline]
    pub fn local_range(&self) -> &Range {
        self.partition.local_range()
    }

    #[inline]
    pub fn extended_range(&self) -> &Range {
        self.partition.extended_range()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn values(&self) -> &Field<T> {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut Field<T> {
        &mut self.values
    }

    /// Value at `point` if it lies in the extended range.
    #[inline]
    pub fn get(&self, point: Point) -> Option<T> {
        self.values.get(point)
    }

    /// Starts a ghost update.
    pub fn exchange(&mut self) -> Result<ExchangeRequest<'_, 'c, T, C>, HaloError> {
        self.partition.exchange(self.values.values_mut())
    }

    /// Sets every extended point, ghosts included. No communication.
    pub fn fill(&mut self, value: T) {
        self.values.fill(value);
    }

    /// Collective. Sets every point of `range` this rank owns, including points that
    /// reach this rank only through periodic wrap, then updates the ghosts.
    pub fn fill_range(&mut self, range: &Range, value: T) -> Result<(), HaloError> {
        let cart = *self.partition.cart();
        let local = *self.partition.local_range();
        if cart.range().includes(range) {
            self.values.fill_range(&local.intersect(range), value);
        } else {
            for p in range.points() {
                let q = if local.contains(p) { p } else { cart.periodic_adjust(p) };
                if local.contains(q) {
                    self.values[q] = value;
                }
            }
        }
        self.exchange()?.wait()
    }
}

impl<T: HaloValue, C: Communicator> Clone for DistributedField<'_, T, C> {
    fn clone(&self) -> Self {
        Self {
            partition: self.partition.clone(),
            values: self.values.clone(),
        }
    }
}

impl<T: HaloValue, C: Communicator> Index<Point> for DistributedField<'_, T, C> {
    type Output = T;

    fn index(&self, point: Point) -> &T {
        &self.values[point]
    }
}

impl<T: HaloValue, C: Communicator> IndexMut<Point> for DistributedField<'_, T, C> {
    fn index_mut(&mut self, point: Point) -> &mut T {
        &mut self.values[point]
    }
}

impl<T: HaloValue, C: Communicator> Index<usize> for DistributedField<'_, T, C> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.values[i]
    }
}

impl<T: HaloValue, C: Communicator> IndexMut<usize> for DistributedField<'_, T, C> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.values[i]
    }
}
