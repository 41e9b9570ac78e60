//! Partition: one rank's share of a structured grid, with its halo.
//!
//! A partition bundles the global [`Cart`], this rank's local and extended ranges, a
//! split of both into subregions for blocked loops, the ranges of each neighbor, and
//! the [`Halo`] that keeps the extended points up to date.

use crate::algs::communicator::Communicator;
use crate::decomp::{
    DecompInfo, create_decomp_hash, detect_neighbors, extend_local_range, retrieve_decomp_info,
};
use crate::halo::{ExchangeRequest, Halo, HaloMap, HaloValue};
use crate::halo_error::HaloError;
use crate::topology::{Cart, Range};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Partition construction knobs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Ghost width added around the local range.
    pub extend_amount: i32,
    /// Number of slabs the local and extended ranges are cut into.
    pub num_subregions: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            extend_amount: 1,
            num_subregions: 1,
        }
    }
}

pub struct Partition<'c, C: Communicator> {
    cart: Cart,
    local_range: Range,
    extended_range: Range,
    local_subregions: Vec<Range>,
    extended_subregions: Vec<Range>,
    neighbor_ranks: BTreeSet<usize>,
    neighbors: BTreeMap<usize, DecompInfo>,
    halo: Halo<'c, C>,
}

impl<'c, C: Communicator> Partition<'c, C> {
    /// Collective. Discovers the neighbors of `local_range` and builds the partition.
    pub fn discover(
        comm: &'c C,
        cart: Cart,
        local_range: Range,
        config: PartitionConfig,
    ) -> Result<Self, HaloError> {
        let hash = create_decomp_hash(comm, cart.num_dims(), &local_range)?;
        let neighbor_ranks =
            detect_neighbors(&cart, comm, &local_range, config.extend_amount, &hash)?;
        let extended_range = extend_local_range(&cart, &local_range, config.extend_amount);
        Self::new(
            comm,
            cart,
            local_range,
            extended_range,
            config.num_subregions,
            neighbor_ranks,
        )
    }

    /// Collective. Builds a partition from known ranges and neighbor ranks.
    pub fn new(
        comm: &'c C,
        cart: Cart,
        local_range: Range,
        extended_range: Range,
        num_subregions: usize,
        neighbor_ranks: BTreeSet<usize>,
    ) -> Result<Self, HaloError> {
        let neighbors = retrieve_decomp_info(comm, &neighbor_ranks, &local_range, &extended_range)?;
        let map = HaloMap::build(&cart, &local_range, &extended_range, &neighbors)?;
        let num_dims = cart.num_dims();
        Ok(Self {
            local_subregions: create_subregions(num_dims, &local_range, num_subregions),
            extended_subregions: create_subregions(num_dims, &extended_range, num_subregions),
            cart,
            local_range,
            extended_range,
            neighbor_ranks,
            neighbors,
            halo: Halo::new(comm, map),
        })
    }

    #[inline]
    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    #[inline]
    pub fn comm(&self) -> &'c C {
        self.halo.comm()
    }

    #[inline]
    pub fn global_range(&self) -> &Range {
        self.cart.range()
    }

    #[inline]
    pub fn local_range(&self) -> &Range {
        &self.local_range
    }

    #[inline]
    pub fn extended_range(&self) -> &Range {
        &self.extended_range
    }

    #[inline]
    pub fn local_subregions(&self) -> &[Range] {
        &self.local_subregions
    }

    #[inline]
    pub fn extended_subregions(&self) -> &[Range] {
        &self.extended_subregions
    }

    #[inline]
    pub fn subregion_count(&self) -> usize {
        self.local_subregions.len()
    }

    /// Ranks this partition was built against (before dropping ranks with no overlap).
    #[inline]
    pub fn neighbor_ranks(&self) -> &BTreeSet<usize> {
        &self.neighbor_ranks
    }

    /// Local and extended ranges of every neighbor.
    #[inline]
    pub fn neighbors(&self) -> &BTreeMap<usize, DecompInfo> {
        &self.neighbors
    }

    #[inline]
    pub fn halo(&self) -> &Halo<'c, C> {
        &self.halo
    }

    /// Starts a ghost update of `values`, stored over the extended range.
    pub fn exchange<'a, T: HaloValue>(
        &'a self,
        values: &'a mut [T],
    ) -> Result<ExchangeRequest<'a, 'c, T, C>, HaloError> {
        self.halo.exchange(values)
    }

    pub(crate) fn matches(&self, local: &Range, extended: &Range, num_subregions: usize) -> bool {
        self.local_range == *local
            && self.extended_range == *extended
            && self.subregion_count() == num_subregions
    }
}

/// Cuts `range` into `count` slabs along its slowest dimension. Slab sizes differ by at
/// most one, larger slabs first.
pub fn create_subregions(num_dims: usize, range: &Range, count: usize) -> Vec<Range> {
    let dim = num_dims - 1;
    let count = count.max(1);
    let size = range.size(dim).max(0) as usize;
    let per = size / count;
    let remainder = size - per * count;
    let begin = range.begin_at(dim);
    (0..count)
        .map(|i| {
            let mut sub = *range;
            sub.set_begin(dim, begin + (per * i + remainder.min(i)) as i32);
            sub.set_end(dim, begin + (per * (i + 1) + remainder.min(i + 1)) as i32);
            sub
        })
        .collect()
}
