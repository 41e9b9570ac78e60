//! PartitionPool: share partitions between fields that live on the same decomposition.
//!
//! Partitions are grouped by [`Cart`]. Within a group a candidate matches only if it
//! matches on *every* rank, which is decided with one logical-AND reduction per
//! candidate. All pool operations are therefore collective and must be called in the
//! same order on every rank.

use super::partition::Partition;
use crate::algs::communicator::{Communicator, ReduceOp};
use crate::halo_error::HaloError;
use crate::topology::{Cart, Range};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub struct PartitionPool<'c, C: Communicator> {
    comm: &'c C,
    neighbor_ranks: BTreeSet<usize>,
    partitions: HashMap<Cart, Vec<Arc<Partition<'c, C>>>>,
}

impl<'c, C: Communicator> PartitionPool<'c, C> {
    /// Pool whose partitions are built against `neighbor_ranks`.
    pub fn new(comm: &'c C, neighbor_ranks: BTreeSet<usize>) -> Self {
        Self {
            comm,
            neighbor_ranks,
            partitions: HashMap::new(),
        }
    }

    #[inline]
    pub fn neighbor_ranks(&self) -> &BTreeSet<usize> {
        &self.neighbor_ranks
    }

    /// Number of pooled partitions on this rank.
    pub fn len(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Collective. Adds `partition`, replacing a globally matching one.
    pub fn insert(
        &mut self,
        partition: Arc<Partition<'c, C>>,
    ) -> Result<Arc<Partition<'c, C>>, HaloError> {
        let key = *partition.cart();
        let comm = self.comm;
        let group = self.partitions.entry(key).or_default();
        let found = find_global(
            comm,
            group,
            partition.local_range(),
            partition.extended_range(),
            partition.subregion_count(),
        )?;
        match found {
            Some(i) => group[i] = partition.clone(),
            None => group.push(partition.clone()),
        }
        Ok(partition)
    }

    /// Collective. The globally matching partition, or `PartitionNotFound`.
    pub fn get(
        &self,
        cart: &Cart,
        local_range: &Range,
        extended_range: &Range,
        num_subregions: usize,
    ) -> Result<Arc<Partition<'c, C>>, HaloError> {
        let group = self.partitions.get(cart).map(Vec::as_slice).unwrap_or(&[]);
        match find_global(self.comm, group, local_range, extended_range, num_subregions)? {
            Some(i) => Ok(group[i].clone()),
            None => Err(HaloError::PartitionNotFound),
        }
    }

    /// Collective. The globally matching partition, built and pooled on a miss.
    pub fn fetch(
        &mut self,
        cart: &Cart,
        local_range: &Range,
        extended_range: &Range,
        num_subregions: usize,
    ) -> Result<Arc<Partition<'c, C>>, HaloError> {
        let comm = self.comm;
        let group = self.partitions.entry(*cart).or_default();
        if let Some(i) = find_global(comm, group, local_range, extended_range, num_subregions)? {
            return Ok(group[i].clone());
        }
        log::debug!(
            "[partition_pool] rank {} building partition for {:?}",
            comm.rank(),
            local_range
        );
        let partition = Arc::new(Partition::new(
            comm,
            *cart,
            *local_range,
            *extended_range,
            num_subregions,
            self.neighbor_ranks.clone(),
        )?);
        group.push(partition.clone());
        Ok(partition)
    }

    /// Collective. Removes the globally matching partition; returns whether one existed.
    /// Fields still holding it keep it alive.
    pub fn erase(
        &mut self,
        cart: &Cart,
        local_range: &Range,
        extended_range: &Range,
        num_subregions: usize,
    ) -> Result<bool, HaloError> {
        let Some(group) = self.partitions.get_mut(cart) else {
            return Ok(false);
        };
        let found = find_global(self.comm, group, local_range, extended_range, num_subregions)?;
        if let Some(i) = found {
            group.remove(i);
        }
        if group.is_empty() {
            self.partitions.remove(cart);
        }
        Ok(found.is_some())
    }
}

fn find_global<C: Communicator>(
    comm: &C,
    group: &[Arc<Partition<'_, C>>],
    local_range: &Range,
    extended_range: &Range,
    num_subregions: usize,
) -> Result<Option<usize>, HaloError> {
    for (i, candidate) in group.iter().enumerate() {
        let here = candidate.matches(local_range, extended_range, num_subregions);
        let everywhere = comm.all_reduce_i64(&[i64::from(here)], ReduceOp::LogicalAnd)?;
        if everywhere[0] != 0 {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};
    use crate::decomp::{cartesian_decomp, extend_local_range};

    #[test]
    fn fetch_reuses_matching_partition() {
        let cart = Cart::non_periodic(Range::new(&[0, 0], &[8, 8]).unwrap()).unwrap();
        let local = *cart.range();
        let ext = extend_local_range(&cart, &local, 1);
        let mut pool = PartitionPool::new(&NoComm, BTreeSet::new());

        let a = pool.fetch(&cart, &local, &ext, 1).unwrap();
        let b = pool.fetch(&cart, &local, &ext, 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = pool.fetch(&cart, &local, &ext, 2).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.len(), 2);

        assert!(pool.erase(&cart, &local, &ext, 1).unwrap());
        assert!(!pool.erase(&cart, &local, &ext, 1).unwrap());
        assert!(matches!(
            pool.get(&cart, &local, &ext, 1),
            Err(HaloError::PartitionNotFound)
        ));
        assert_eq!(a.subregion_count(), 1);
    }

    #[test]
    fn match_requires_every_rank() {
        let cart = Cart::non_periodic(Range::new(&[0], &[8]).unwrap()).unwrap();
        let counts = ThreadComm::run(2, |comm| {
            let neighbors = BTreeSet::from([1 - comm.rank()]);
            let mut pool = PartitionPool::new(&comm, neighbors);
            let local = cartesian_decomp(&cart, comm.rank(), [2, 1, 1]).unwrap();
            let ext = extend_local_range(&cart, &local, 1);
            let first = pool.fetch(&cart, &local, &ext, 1).unwrap();
            // only rank 0 asks for a wider halo; nobody may reuse the first partition
            let width = if comm.rank() == 0 { 2 } else { 1 };
            let ext2 = extend_local_range(&cart, &local, width);
            let second = pool.fetch(&cart, &local, &ext2, 1).unwrap();
            assert!(!Arc::ptr_eq(&first, &second));
            pool.len()
        });
        assert_eq!(counts, vec![2, 2]);
    }
}
