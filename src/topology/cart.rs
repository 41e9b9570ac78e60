//! Global structured-grid topology: index range, periodicity and periodic storage.

use super::range::{MAX_DIMS, Point, Range};
use crate::debug_invariants::DebugInvariants;
use crate::halo_error::HaloError;
use serde::{Deserialize, Serialize};

/// How the wrap-around point of a periodic dimension is stored.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodicStorage {
    /// The wrap-around point is stored once.
    #[default]
    Unique,
    /// Both copies are stored; the last point duplicates the first.
    Duplicated,
}

/// Immutable topology descriptor of a structured grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cart {
    range: Range,
    periodic: [bool; MAX_DIMS],
    periodic_storage: PeriodicStorage,
}

impl Cart {
    pub fn new(
        range: Range,
        periodic: [bool; MAX_DIMS],
        periodic_storage: PeriodicStorage,
    ) -> Result<Self, HaloError> {
        let mut cart = Self {
            range,
            periodic,
            periodic_storage,
        };
        for d in range.num_dims()..MAX_DIMS {
            cart.periodic[d] = false;
        }
        cart.validate_invariants()?;
        Ok(cart)
    }

    /// Non-periodic cart over `range`.
    pub fn non_periodic(range: Range) -> Result<Self, HaloError> {
        Self::new(range, [false; MAX_DIMS], PeriodicStorage::Unique)
    }

    #[inline]
    pub fn num_dims(&self) -> usize {
        self.range.num_dims()
    }

    #[inline]
    pub fn range(&self) -> &Range {
        &self.range
    }

    #[inline]
    pub fn periodic(&self, dim: usize) -> bool {
        self.periodic[dim]
    }

    #[inline]
    pub fn periodic_flags(&self) -> [bool; MAX_DIMS] {
        self.periodic
    }

    #[inline]
    pub fn periodic_storage(&self) -> PeriodicStorage {
        self.periodic_storage
    }

    /// Length of one period along `dim`.
    pub fn period(&self, dim: usize) -> i32 {
        match self.periodic_storage {
            PeriodicStorage::Unique => self.range.size(dim),
            PeriodicStorage::Duplicated => self.range.size(dim) - 1,
        }
    }

    /// Wraps every periodic component of `point` into the global range.
    pub fn periodic_adjust(&self, point: Point) -> Point {
        let mut out = point;
        for d in 0..self.num_dims() {
            if self.periodic[d] {
                let period = self.period(d);
                let begin = self.range.begin_at(d);
                let m = (point[d] - begin).rem_euclid(period);
                out[d] = begin + m;
            }
        }
        out
    }

    /// Canonical image of `point`: unchanged inside the global range, wrapped otherwise.
    #[inline]
    pub fn canonical(&self, point: Point) -> Point {
        if self.range.contains(point) {
            point
        } else {
            self.periodic_adjust(point)
        }
    }
}

impl DebugInvariants for Cart {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Cart");
    }

    fn validate_invariants(&self) -> Result<(), HaloError> {
        self.range.validate_invariants()?;
        for d in 0..self.num_dims() {
            if self.periodic[d] && self.period(d) <= 0 {
                return Err(HaloError::Invariant(format!(
                    "periodic dimension {d} has non-positive period {}",
                    self.period(d)
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: i32, storage: PeriodicStorage) -> Cart {
        Cart::new(
            Range::new(&[0], &[n]).unwrap(),
            [true, false, false],
            storage,
        )
        .unwrap()
    }

    #[test]
    fn unique_wrap_uses_full_size() {
        let cart = ring(6, PeriodicStorage::Unique);
        assert_eq!(cart.periodic_adjust([-1, 0, 0]), [5, 0, 0]);
        assert_eq!(cart.periodic_adjust([6, 0, 0]), [0, 0, 0]);
        assert_eq!(cart.periodic_adjust([13, 0, 0]), [1, 0, 0]);
    }

    #[test]
    fn duplicated_wrap_skips_the_copy() {
        let cart = ring(6, PeriodicStorage::Duplicated);
        assert_eq!(cart.periodic_adjust([-1, 0, 0]), [4, 0, 0]);
        assert_eq!(cart.periodic_adjust([6, 0, 0]), [1, 0, 0]);
        assert_eq!(cart.canonical([5, 0, 0]), [5, 0, 0]);
    }

    #[test]
    fn non_periodic_points_pass_through() {
        let cart = Cart::non_periodic(Range::new(&[0, 0], &[4, 4]).unwrap()).unwrap();
        assert_eq!(cart.periodic_adjust([-1, 9, 0]), [-1, 9, 0]);
    }

    #[test]
    fn degenerate_duplicated_period_is_rejected() {
        let err = Cart::new(
            Range::new(&[0], &[1]).unwrap(),
            [true, false, false],
            PeriodicStorage::Duplicated,
        );
        assert!(matches!(err, Err(HaloError::Invariant(_))));
    }
}
